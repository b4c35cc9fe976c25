use std::sync::Arc;

use directory::{AclResolver, AuthChain, Directory};
use store::Store;

/// Long-lived collaborators shared across every connection and request.
/// Cloning is cheap: everything inside is already `Arc`-wrapped or a
/// plain value.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub directory: Arc<dyn Directory>,
    pub acl: Arc<AclResolver>,
    pub auth: Arc<AuthChain>,
    pub config: Arc<ServerConfig>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub base_path: String,
    pub max_ics_bytes: usize,
    pub max_vcf_bytes: usize,
    pub prodid: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_path: "/dav".to_string(),
            max_ics_bytes: 1 << 20,
            max_vcf_bytes: 1 << 20,
            prodid: "-//caldavd//caldavd 1.0//EN".to_string(),
        }
    }
}
