pub mod acl;
pub mod auth;
pub mod backend;
pub mod error;
pub mod jwt;
pub mod password;
pub mod principal;

pub use acl::AclResolver;
pub use auth::AuthChain;
pub use backend::{ldap::LdapDirectory, static_backend::StaticDirectory, Directory};
pub use error::{DirectoryError, Result};
pub use jwt::JwtValidator;
pub use principal::Principal;
