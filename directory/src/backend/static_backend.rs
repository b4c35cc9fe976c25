use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Directory;
use crate::error::{DirectoryError, Result};
use crate::password::verify_password;
use crate::principal::Principal;

#[derive(Debug, Clone)]
pub struct StaticUser {
    pub principal: Principal,
    pub password_hash: String,
    pub groups: Vec<String>,
    pub calendar_ids: Vec<String>,
}

/// In-process directory backend for local development, demos, and tests.
/// Holds its whole user table in memory; there is no reload mechanism —
/// operators who need that run the LDAP backend instead.
pub struct StaticDirectory {
    users: RwLock<HashMap<String, StaticUser>>,
    group_acl: RwLock<HashMap<(String, String), u8>>,
    user_acl: RwLock<HashMap<(String, String), u8>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            group_acl: RwLock::new(HashMap::new()),
            user_acl: RwLock::new(HashMap::new()),
        }
    }

    pub async fn add_user(&self, user: StaticUser) {
        self.users.write().await.insert(user.principal.user_id.clone(), user);
    }

    pub async fn grant_group(&self, group: &str, calendar_uri: &str, privileges: u8) {
        self.group_acl
            .write()
            .await
            .insert((group.to_string(), calendar_uri.to_string()), privileges);
    }

    pub async fn grant_user(&self, user: &str, calendar_uri: &str, privileges: u8) {
        self.user_acl
            .write()
            .await
            .insert((user.to_string(), calendar_uri.to_string()), privileges);
    }
}

impl Default for StaticDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn bind_user(&self, username: &str, password: &str) -> Result<Principal> {
        let users = self.users.read().await;
        let user = users.get(username).ok_or(DirectoryError::UserNotFound)?;
        if verify_password(password, &user.password_hash)? {
            Ok(user.principal.clone())
        } else {
            Err(DirectoryError::InvalidCredentials)
        }
    }

    async fn lookup_user_by_attr(&self, attr: &str, value: &str) -> Result<Principal> {
        let users = self.users.read().await;
        users
            .values()
            .find(|u| match attr {
                "uid" => u.principal.user_id == value,
                "mail" => u.principal.email.as_deref() == Some(value),
                _ => false,
            })
            .map(|u| u.principal.clone())
            .ok_or(DirectoryError::UserNotFound)
    }

    async fn user_calendar_ids(&self, user: &str) -> Result<Vec<String>> {
        let users = self.users.read().await;
        Ok(users
            .get(user)
            .map(|u| u.calendar_ids.clone())
            .unwrap_or_default())
    }

    async fn user_groups(&self, user: &str) -> Result<Vec<String>> {
        let users = self.users.read().await;
        Ok(users.get(user).map(|u| u.groups.clone()).unwrap_or_default())
    }

    async fn group_privileges(&self, group: &str, calendar_uri: &str) -> Result<u8> {
        let acl = self.group_acl.read().await;
        Ok(acl
            .get(&(group.to_string(), calendar_uri.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn user_privileges(&self, user: &str, calendar_uri: &str) -> Result<u8> {
        let acl = self.user_acl.read().await;
        Ok(acl
            .get(&(user.to_string(), calendar_uri.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn shared_calendars(&self, user: &str) -> Result<Vec<(String, String)>> {
        let groups = self.user_groups(user).await?;
        let user_acl = self.user_acl.read().await;
        let group_acl = self.group_acl.read().await;

        let mut found: Vec<(String, String)> = user_acl
            .keys()
            .filter(|(grantee, _)| grantee == user)
            .chain(group_acl.keys().filter(|(grantee, _)| groups.contains(grantee)))
            .filter_map(|(_, calendar_uri)| calendar_uri.split_once('/'))
            .map(|(owner, uri)| (owner.to_string(), uri.to_string()))
            .collect();
        found.sort();
        found.dedup();
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::hash_password;

    #[tokio::test]
    async fn binds_known_user_and_rejects_wrong_password() {
        let dir = StaticDirectory::new();
        dir.add_user(StaticUser {
            principal: Principal::new("alice", "uid=alice,dc=example"),
            password_hash: hash_password("hunter2").unwrap(),
            groups: vec!["staff".into()],
            calendar_ids: vec!["alice/default".into()],
        })
        .await;

        assert!(dir.bind_user("alice", "hunter2").await.is_ok());
        assert!(dir.bind_user("alice", "wrong").await.is_err());
        assert!(dir.bind_user("bob", "whatever").await.is_err());
    }

    #[tokio::test]
    async fn resolves_group_privileges() {
        let dir = StaticDirectory::new();
        dir.grant_group("staff", "alice/default", 0b0000_0011).await;
        assert_eq!(dir.group_privileges("staff", "alice/default").await.unwrap(), 0b0000_0011);
        assert_eq!(dir.group_privileges("staff", "other").await.unwrap(), 0);
    }
}
