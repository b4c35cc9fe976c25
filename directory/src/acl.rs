//! Resolves effective privileges for a (user, calendar) pair: the owner
//! always has full access, direct grants and group grants are unioned, and
//! group membership is expanded transitively with a cycle guard. Results
//! are cached briefly since privilege checks happen on every request.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::backend::Directory;
use crate::error::Result;

pub const PRIV_READ: u8 = 0b0000_0001;
pub const PRIV_WRITE_PROPS: u8 = 0b0000_0010;
pub const PRIV_WRITE_CONTENT: u8 = 0b0000_0100;
pub const PRIV_BIND: u8 = 0b0000_1000;
pub const PRIV_UNBIND: u8 = 0b0001_0000;
pub const PRIV_ALL: u8 = PRIV_READ | PRIV_WRITE_PROPS | PRIV_WRITE_CONTENT | PRIV_BIND | PRIV_UNBIND;

const MAX_GROUP_DEPTH: usize = 8;

pub struct AclResolver {
    directory: Arc<dyn Directory>,
    cache: Cache<(String, String), u8>,
}

impl AclResolver {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self {
            directory,
            cache: Cache::builder()
                .time_to_live(Duration::from_secs(30))
                .max_capacity(10_000)
                .build(),
        }
    }

    /// `owner` is the calendar home's principal user_id; an owner always
    /// has `PRIV_ALL` on their own collections regardless of any grant.
    pub async fn effective_privileges(&self, user: &str, owner: &str, calendar_uri: &str) -> Result<u8> {
        if user == owner {
            return Ok(PRIV_ALL);
        }
        let key = (user.to_string(), calendar_uri.to_string());
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let direct = self.directory.user_privileges(user, calendar_uri).await?;
        let groups = self.expand_groups(user).await?;
        let mut via_groups = 0u8;
        for group in &groups {
            via_groups |= self.directory.group_privileges(group, calendar_uri).await?;
        }
        let privileges = direct | via_groups;
        self.cache.insert(key, privileges).await;
        Ok(privileges)
    }

    pub async fn can(&self, user: &str, owner: &str, calendar_uri: &str, required: u8) -> Result<bool> {
        let granted = self.effective_privileges(user, owner, calendar_uri).await?;
        Ok(granted & required == required)
    }

    /// Transitive group membership, visited-set guarded against cycles and
    /// capped at [`MAX_GROUP_DEPTH`] hops in case the directory's group
    /// graph is pathologically deep.
    async fn expand_groups(&self, user: &str) -> Result<HashSet<String>> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: Vec<String> = self.directory.user_groups(user).await?;
        let mut depth = 0;

        while !frontier.is_empty() && depth < MAX_GROUP_DEPTH {
            let mut next = Vec::new();
            for group in frontier {
                if visited.insert(group.clone()) {
                    let nested = self.directory.user_groups(&group).await?;
                    next.extend(nested);
                }
            }
            frontier = next;
            depth += 1;
        }
        Ok(visited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::static_backend::{StaticDirectory, StaticUser};
    use crate::password::hash_password;
    use crate::principal::Principal;

    async fn fixture() -> AclResolver {
        let dir = StaticDirectory::new();
        dir.add_user(StaticUser {
            principal: Principal::new("alice", "uid=alice"),
            password_hash: hash_password("x").unwrap(),
            groups: vec!["staff".into()],
            calendar_ids: vec![],
        })
        .await;
        dir.grant_group("staff", "bob/default", PRIV_READ).await;
        AclResolver::new(Arc::new(dir))
    }

    #[tokio::test]
    async fn owner_always_has_all_privileges() {
        let resolver = fixture().await;
        let privs = resolver.effective_privileges("bob", "bob", "bob/default").await.unwrap();
        assert_eq!(privs, PRIV_ALL);
    }

    #[tokio::test]
    async fn group_membership_grants_privileges() {
        let resolver = fixture().await;
        assert!(resolver.can("alice", "bob", "bob/default", PRIV_READ).await.unwrap());
        assert!(!resolver.can("alice", "bob", "bob/default", PRIV_WRITE_CONTENT).await.unwrap());
    }

    #[tokio::test]
    async fn stranger_has_no_privileges() {
        let resolver = fixture().await;
        assert!(!resolver.can("mallory", "bob", "bob/default", PRIV_READ).await.unwrap());
    }
}
