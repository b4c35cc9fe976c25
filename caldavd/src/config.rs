//! Environment-backed CLI surface. Every flag is also readable from the
//! environment variable named alongside it, so deployments can be driven
//! entirely by env vars without a generated config file.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use directory::{AclResolver, AuthChain, Directory, JwtValidator, LdapDirectory, StaticDirectory};
use store::memory::InMemoryStore;

use dav_server::{AppState, ServerConfig, TlsMaterial};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Runs the DAV server daemon
    Serve(ServeArgs),
    /// Validates the configuration and exits without binding a socket
    CheckConfig(ServeArgs),
    /// Prints the resolved HTTP route tree and exits
    PrintRoutes,
    /// Prompts for a password and prints its Argon2 hash, for seeding the
    /// static directory backend's user table out of band
    HashPassword,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    #[clap(long, env = "HTTP_ADDR", default_value = "0.0.0.0:8080")]
    pub http_addr: SocketAddr,
    #[clap(long, env = "HTTP_BASE_PATH", default_value = "/dav")]
    pub http_base_path: String,
    #[clap(long, env = "HTTP_MAX_ICS_BYTES", default_value = "1048576")]
    pub http_max_ics_bytes: usize,
    #[clap(long, env = "HTTP_MAX_VCF_BYTES", default_value = "1048576")]
    pub http_max_vcf_bytes: usize,

    /// TLS certificate chain (PEM). Omit both this and `tls_key` to serve
    /// plaintext HTTP, intended for local development only.
    #[clap(long, env = "TLS_CERT")]
    pub tls_cert: Option<PathBuf>,
    #[clap(long, env = "TLS_KEY")]
    pub tls_key: Option<PathBuf>,

    /// `static` (in-process demo table) or `ldap`.
    #[clap(long, env = "DIRECTORY_BACKEND", default_value = "static")]
    pub directory_backend: String,

    #[clap(flatten)]
    pub ldap: LdapArgs,
    #[clap(flatten)]
    pub auth: AuthArgs,

    #[clap(long, env = "ICS_COMPANY_NAME", default_value = "Example Corp")]
    pub ics_company_name: String,
    #[clap(long, env = "ICS_PRODUCT_NAME", default_value = "caldavd")]
    pub ics_product_name: String,
    #[clap(long, env = "ICS_VERSION", default_value = "1.0")]
    pub ics_version: String,
    #[clap(long, env = "ICS_LANGUAGE", default_value = "EN")]
    pub ics_language: String,

    #[clap(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct LdapArgs {
    #[clap(long, env = "LDAP_URL", default_value = "")]
    pub ldap_url: String,
    #[clap(long, env = "LDAP_BIND_DN", default_value = "")]
    pub ldap_bind_dn: String,
    #[clap(long, env = "LDAP_BIND_PASSWORD", default_value = "")]
    pub ldap_bind_password: String,
    #[clap(long, env = "LDAP_USER_BASE_DN", default_value = "")]
    pub ldap_user_base_dn: String,
    #[clap(long, env = "LDAP_GROUP_BASE_DN", default_value = "")]
    pub ldap_group_base_dn: String,
    #[clap(long, env = "LDAP_USER_FILTER", default_value = "(uid=%u)")]
    pub ldap_user_filter: String,
    #[clap(long, env = "LDAP_GROUP_FILTER", default_value = "(%m=%u)")]
    pub ldap_group_filter: String,
    #[clap(long, env = "LDAP_MEMBER_ATTR", default_value = "member")]
    pub ldap_member_attr: String,
    #[clap(long, env = "LDAP_CAL_IDS_ATTR", default_value = "homeCalendarId")]
    pub ldap_cal_ids_attr: String,
    /// Multi-valued attribute of `"<owner>/<uri>:<privilege-bits>"` entries
    /// carried on a user's or group's own LDAP entry.
    #[clap(long, env = "LDAP_PRIVS_ATTR", default_value = "davPrivilege")]
    pub ldap_privs_attr: String,
    /// Multi-valued attribute of `"<owner>/<uri>"` entries naming calendars
    /// shared with a user or group, independent of privilege level.
    #[clap(long, env = "LDAP_BINDINGS_ATTR", default_value = "davBinding")]
    pub ldap_bindings_attr: String,
    #[clap(long, env = "LDAP_TOKEN_USER_ATTR", default_value = "mail")]
    pub ldap_token_user_attr: String,
    /// Expand group membership transitively (a group that is itself a
    /// member of another group) rather than one hop only.
    #[clap(long, env = "LDAP_NESTED")]
    pub ldap_nested: bool,
    #[clap(long, env = "LDAP_MAX_GROUP_DEPTH", default_value = "8")]
    pub ldap_max_group_depth: usize,
    #[clap(long, env = "LDAP_REQUIRE_TLS")]
    pub ldap_require_tls: bool,
    #[clap(long, env = "LDAP_SKIP_VERIFY")]
    pub ldap_skip_verify: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct AuthArgs {
    #[clap(long, env = "AUTH_JWKS_URL")]
    pub auth_jwks_url: Option<String>,
    #[clap(long, env = "AUTH_ISSUER")]
    pub auth_issuer: Option<String>,
    #[clap(long, env = "AUTH_AUDIENCE")]
    pub auth_audience: Option<String>,
    /// Accept bearer tokens that aren't a JWT by resolving them through
    /// `AUTH_INTROSPECT_URL` (RFC 7662) instead of rejecting them outright.
    #[clap(long, env = "AUTH_ALLOW_OPAQUE")]
    pub auth_allow_opaque: bool,
    #[clap(long, env = "AUTH_INTROSPECT_URL")]
    pub auth_introspect_url: Option<String>,
    /// `Authorization` header value sent to the introspection endpoint
    /// itself, e.g. `"Basic <base64>"` for a client-credential-protected
    /// introspection server.
    #[clap(long, env = "AUTH_INTROSPECT_AUTH")]
    pub auth_introspect_auth: Option<String>,
}

/// Assembles the long-lived collaborators (directory, ACL resolver, store,
/// auth chain) from a resolved [`ServeArgs`] into the `AppState` the DAV
/// server needs to run.
pub fn build_state(args: &ServeArgs) -> Result<AppState> {
    let directory: Arc<dyn Directory> = match args.directory_backend.as_str() {
        "ldap" => Arc::new(build_ldap_directory(&args.ldap)?),
        "static" => Arc::new(build_demo_directory()),
        other => anyhow::bail!("unknown DIRECTORY_BACKEND '{}', expected 'static' or 'ldap'", other),
    };

    let jwt = if args.auth.auth_jwks_url.is_some() || args.auth.auth_allow_opaque {
        let mut validator =
            JwtValidator::new(args.auth.auth_jwks_url.clone(), args.auth.auth_audience.clone(), args.auth.auth_issuer.clone());
        if args.auth.auth_allow_opaque {
            let introspect_url = args
                .auth
                .auth_introspect_url
                .clone()
                .context("AUTH_INTROSPECT_URL must be set when AUTH_ALLOW_OPAQUE is enabled")?;
            validator = validator.with_opaque_introspection(introspect_url, args.auth.auth_introspect_auth.clone());
        }
        Some(validator)
    } else {
        None
    };

    let auth = AuthChain::new(directory.clone(), jwt, args.ldap.ldap_token_user_attr.clone());
    let acl = AclResolver::new(directory.clone());
    let store = InMemoryStore::new();

    let prodid = format!(
        "-//{}//{} {}//{}",
        args.ics_company_name, args.ics_product_name, args.ics_version, args.ics_language
    );
    let config = ServerConfig {
        base_path: args.http_base_path.trim_end_matches('/').to_string(),
        max_ics_bytes: args.http_max_ics_bytes,
        max_vcf_bytes: args.http_max_vcf_bytes,
        prodid,
    };

    Ok(AppState {
        store: Arc::new(store),
        directory,
        acl: Arc::new(acl),
        auth: Arc::new(auth),
        config: Arc::new(config),
    })
}

fn build_ldap_directory(args: &LdapArgs) -> Result<LdapDirectory> {
    if args.ldap_url.is_empty() {
        anyhow::bail!("LDAP_URL must be set when DIRECTORY_BACKEND=ldap");
    }
    Ok(LdapDirectory {
        ldap_server: args.ldap_url.clone(),
        ldap_starttls: args.ldap_require_tls,
        ldap_insecure: args.ldap_skip_verify,
        bind_dn: args.ldap_bind_dn.clone(),
        bind_password: args.ldap_bind_password.clone(),
        base_dn: args.ldap_user_base_dn.clone(),
        group_base_dn: args.ldap_group_base_dn.clone(),
        user_filter: args.ldap_user_filter.clone(),
        username_attr: "uid".to_string(),
        mail_attr: "mail".to_string(),
        group_filter: args.ldap_group_filter.clone(),
        group_member_attr: args.ldap_member_attr.clone(),
        calendar_attr: args.ldap_cal_ids_attr.clone(),
        privs_attr: args.ldap_privs_attr.clone(),
        bindings_attr: args.ldap_bindings_attr.clone(),
        nested_groups: args.ldap_nested,
        max_group_depth: args.ldap_max_group_depth,
    })
}

/// Empty in-process user table; deployments on this backend provision
/// users out of band (see `directory::backend::static_backend`).
fn build_demo_directory() -> StaticDirectory {
    StaticDirectory::new()
}

pub fn tls_material(args: &ServeArgs) -> Result<Option<TlsMaterial>> {
    match (&args.tls_cert, &args.tls_key) {
        (Some(cert), Some(key)) => Ok(Some(TlsMaterial {
            cert_path: cert
                .to_str()
                .context("TLS_CERT path must be valid UTF-8")?
                .to_string(),
            key_path: key
                .to_str()
                .context("TLS_KEY path must be valid UTF-8")?
                .to_string(),
        })),
        (None, None) => Ok(None),
        _ => anyhow::bail!("TLS_CERT and TLS_KEY must both be set to enable TLS"),
    }
}
