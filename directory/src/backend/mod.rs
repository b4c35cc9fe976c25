pub mod ldap;
pub mod static_backend;

use async_trait::async_trait;

use crate::error::Result;
use crate::principal::Principal;

/// Abstract capability set the auth chain and ACL resolver consume. Two
/// concrete implementations ship: [`ldap::LdapDirectory`] against a real
/// LDAP server, and [`static_backend::StaticDirectory`] for local
/// development and tests.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Verifies a username/password pair (HTTP Basic).
    async fn bind_user(&self, username: &str, password: &str) -> Result<Principal>;

    /// Resolves a principal by an arbitrary attribute, used to map a
    /// validated bearer token's subject claim back to a local user.
    async fn lookup_user_by_attr(&self, attr: &str, value: &str) -> Result<Principal>;

    /// Calendar IDs (collection URIs) the directory directly associates
    /// with this user, independent of ownership.
    async fn user_calendar_ids(&self, user: &str) -> Result<Vec<String>>;

    /// Groups this user directly belongs to (one hop; the ACL resolver
    /// performs transitive expansion).
    async fn user_groups(&self, user: &str) -> Result<Vec<String>>;

    /// Privileges the directory grants a group on a calendar URI, as a
    /// bitmask over {read, write-props, write-content, bind, unbind}.
    async fn group_privileges(&self, group: &str, calendar_uri: &str) -> Result<u8>;

    /// Privileges the directory grants this user directly (not via a
    /// group) on a calendar URI.
    async fn user_privileges(&self, user: &str, calendar_uri: &str) -> Result<u8>;

    /// Every `(owner, uri)` calendar this user can reach through a direct or
    /// group grant, for populating their `shared/` namespace. Does not
    /// include calendars they own outright.
    async fn shared_calendars(&self, user: &str) -> Result<Vec<(String, String)>>;
}
