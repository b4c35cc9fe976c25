mod config;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use config::{build_state, tls_material, Args, Command};
use dav_server::Server;

fn tracer(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("{}", panic_info);
        eprintln!("{:?}", backtrace::Backtrace::new());
        std::process::abort();
    }));

    let args = Args::parse();

    match &args.command {
        Command::Serve(serve_args) => {
            tracer(&serve_args.log_level);
            let state = build_state(&serve_args)?;
            let tls = tls_material(&serve_args)?;

            let server = match tls {
                Some(material) => Server::new_tls(serve_args.http_addr, state, material)?,
                None => Server::new_unsecured(serve_args.http_addr, state),
            };

            let (tx, rx) = watch::channel(false);
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("received shutdown signal");
                let _ = tx.send(true);
            });

            server.run(rx).await?;
        }
        Command::CheckConfig(serve_args) => {
            tracer(&serve_args.log_level);
            build_state(&serve_args)?;
            tls_material(&serve_args)?;
            println!("configuration OK");
        }
        Command::HashPassword => {
            let password = rpassword::prompt_password("password: ")?;
            let confirm = rpassword::prompt_password("confirm: ")?;
            if password != confirm {
                anyhow::bail!("passwords did not match");
            }
            println!("{}", directory::password::hash_password(&password)?);
        }
        Command::PrintRoutes => {
            println!("OPTIONS                         *");
            println!("PROPFIND  REPORT                 <base>/");
            println!("PROPFIND  REPORT                 <base>/principals/users/{{uid}}");
            println!("PROPFIND  REPORT  MKCALENDAR      <base>/calendars/{{uid}}/");
            println!("PROPFIND  REPORT  MKCALENDAR      <base>/calendars/{{uid}}/{{caluri}}/");
            println!("GET HEAD PUT DELETE               <base>/calendars/{{uid}}/{{caluri}}/{{uid}}.ics");
            println!("PROPFIND  REPORT                 <base>/calendars/{{uid}}/calendar-inbox/");
            println!("PROPFIND  REPORT                 <base>/calendars/{{uid}}/calendar-outbox/");
            println!("PROPFIND  REPORT  MKCOL           <base>/addressbooks/{{uid}}/");
            println!("PROPFIND  REPORT  MKCOL           <base>/addressbooks/{{uid}}/{{aburi}}/");
            println!("GET HEAD PUT DELETE               <base>/addressbooks/{{uid}}/{{aburi}}/{{uid}}.vcf");
        }
    }

    Ok(())
}
