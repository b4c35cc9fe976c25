use std::net::SocketAddr;
use std::sync::Arc;

use directory::backend::static_backend::{StaticDirectory, StaticUser};
use directory::password::hash_password;
use directory::{AclResolver, AuthChain, Directory, Principal};
use dav_server::{AppState, Server, ServerConfig};
use store::memory::InMemoryStore;
use store::Store;
use tokio::net::TcpListener;
use tokio::sync::watch;

pub const ALICE: &str = "alice";
pub const ALICE_PASSWORD: &str = "correct horse battery staple";

/// Boots a real `dav_server::Server` on an ephemeral loopback port, seeded
/// with a single user ("alice"), and hands back its base URL plus a
/// shutdown handle, exercising the full stack rather than calling handlers
/// directly.
pub struct TestServer {
    pub base_url: String,
    /// Same store instance the running server reads and writes, kept around
    /// so tests can assert on side effects (e.g. delivered scheduling
    /// messages) that have no HTTP-exposed read path.
    pub store: Arc<dyn Store>,
    shutdown: watch::Sender<bool>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let dir = StaticDirectory::new();
        dir.add_user(StaticUser {
            principal: Principal::new(ALICE, "uid=alice,dc=example"),
            password_hash: hash_password(ALICE_PASSWORD).unwrap(),
            groups: vec![],
            calendar_ids: vec!["default".into()],
        })
        .await;
        Self::spawn_with_directory(dir).await
    }

    pub async fn spawn_with_directory(dir: StaticDirectory) -> Self {
        let directory: Arc<dyn Directory> = Arc::new(dir);

        let auth = AuthChain::new(directory.clone(), None, "mail".to_string());
        let acl = AclResolver::new(directory.clone());
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());

        let state = AppState {
            store: store.clone(),
            directory,
            acl: Arc::new(acl),
            auth: Arc::new(auth),
            config: Arc::new(ServerConfig::default()),
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        drop(listener);

        let server = Server::new_unsecured(addr, state);
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            let _ = server.run(rx).await;
        });
        // give the accept loop a moment to bind before the first request
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        Self { base_url: format!("http://{}{}", addr, ServerConfig::default().base_path), store, shutdown: tx }
    }

    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::new()
    }

    pub fn shutdown(self) {
        let _ = self.shutdown.send(true);
    }
}
