use std::collections::HashSet;

use async_trait::async_trait;
use ldap3::{LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use tracing::debug;

use super::Directory;
use crate::error::{DirectoryError, Result};
use crate::principal::Principal;

/// Directory backend against a real LDAP/AD server. Credentials are
/// verified by binding as the resolved user's DN, never by reading or
/// comparing password hashes locally.
///
/// Privilege grants and shared-calendar bindings are modeled as
/// multi-valued attributes on the user's or group's own LDAP entry
/// (`privs_attr`/`bindings_attr`), not as a separate ACL tree: each value
/// of `privs_attr` is `"<owner>/<uri>:<bits>"` and each value of
/// `bindings_attr` is `"<owner>/<uri>"`. A deployment with no such
/// attributes populated reports no privileges and no shared calendars,
/// same as the static backend with an empty ACL map.
pub struct LdapDirectory {
    pub ldap_server: String,
    pub ldap_starttls: bool,
    pub ldap_insecure: bool,
    pub bind_dn: String,
    pub bind_password: String,
    pub base_dn: String,
    pub group_base_dn: String,
    pub user_filter: String,
    pub username_attr: String,
    pub mail_attr: String,
    pub group_filter: String,
    pub group_member_attr: String,
    pub calendar_attr: String,
    pub privs_attr: String,
    pub bindings_attr: String,
    pub nested_groups: bool,
    pub max_group_depth: usize,
}

impl LdapDirectory {
    fn group_search_base(&self) -> &str {
        if self.group_base_dn.is_empty() {
            &self.base_dn
        } else {
            &self.group_base_dn
        }
    }

    async fn connect(&self) -> Result<ldap3::Ldap> {
        let settings = LdapConnSettings::new()
            .set_starttls(self.ldap_starttls)
            .set_no_tls_verify(self.ldap_insecure);
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.ldap_server)
            .await
            .map_err(|e| DirectoryError::Unreachable(e.to_string()))?;
        ldap3::drive!(conn);
        ldap.simple_bind(&self.bind_dn, &self.bind_password)
            .await
            .and_then(|r| r.success())
            .map_err(|e| DirectoryError::Unreachable(format!("service bind failed: {}", e)))?;
        Ok(ldap)
    }

    fn check_identifier(value: &str) -> Result<()> {
        // LDAP filters are not a place for attacker-controlled metacharacters.
        if value
            .chars()
            .any(|c| matches!(c, '(' | ')' | '*' | '\\' | '\0'))
        {
            return Err(DirectoryError::Invalid(format!(
                "identifier contains forbidden characters: {}",
                value
            )));
        }
        Ok(())
    }

    async fn search_one(&self, ldap: &mut ldap3::Ldap, filter: &str, attrs: &[&str]) -> Result<SearchEntry> {
        let (entries, _res) = ldap
            .search(&self.base_dn, Scope::Subtree, filter, attrs)
            .await
            .map_err(|e| DirectoryError::Unreachable(e.to_string()))?
            .success()
            .map_err(|e| DirectoryError::Unreachable(e.to_string()))?;
        let entry = entries.into_iter().next().ok_or(DirectoryError::UserNotFound)?;
        Ok(SearchEntry::construct(entry))
    }

    /// Looks up a single entry by `cn` under the group search base,
    /// returning `None` rather than erroring when no such group exists —
    /// callers treat an absent group entry as carrying no privileges.
    async fn find_group_entry(&self, ldap: &mut ldap3::Ldap, group: &str, attrs: &[&str]) -> Result<Option<SearchEntry>> {
        let filter = format!("(cn={})", group);
        let (entries, _res) = ldap
            .search(self.group_search_base(), Scope::Subtree, &filter, attrs)
            .await
            .map_err(|e| DirectoryError::Unreachable(e.to_string()))?
            .success()
            .map_err(|e| DirectoryError::Unreachable(e.to_string()))?;
        Ok(entries.into_iter().next().map(SearchEntry::construct))
    }

    fn entry_to_principal(&self, entry: &SearchEntry) -> Principal {
        let user_id = get_attr(entry, &self.username_attr).unwrap_or_else(|| entry.dn.clone());
        let mut principal = Principal::new(user_id, entry.dn.clone());
        principal.email = get_attr(entry, &self.mail_attr);
        principal
    }

    async fn direct_groups(&self, ldap: &mut ldap3::Ldap, member: &str) -> Result<Vec<String>> {
        let filter = self.group_filter.replace("%m", &self.group_member_attr).replace("%u", member);
        let (entries, _res) = ldap
            .search(self.group_search_base(), Scope::Subtree, &filter, &["cn"])
            .await
            .map_err(|e| DirectoryError::Unreachable(e.to_string()))?
            .success()
            .map_err(|e| DirectoryError::Unreachable(e.to_string()))?;
        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .filter_map(|e| get_attr(&e, "cn"))
            .collect())
    }
}

fn get_attr(entry: &SearchEntry, name: &str) -> Option<String> {
    entry.attrs.get(name).and_then(|v| v.first()).cloned()
}

fn get_attrs<'a>(entry: &'a SearchEntry, name: &str) -> &'a [String] {
    entry.attrs.get(name).map(|v| v.as_slice()).unwrap_or(&[])
}

/// Parses one `privs_attr` value: `"<owner>/<uri>:<bits>"`.
fn parse_priv_binding(raw: &str) -> Option<(&str, u8)> {
    let (uri, bits) = raw.rsplit_once(':')?;
    let bits: u8 = bits.trim().parse().ok()?;
    Some((uri, bits))
}

/// Parses one `bindings_attr` value: `"<owner>/<uri>"`.
fn parse_binding(raw: &str) -> Option<(String, String)> {
    let (owner, uri) = raw.split_once('/')?;
    Some((owner.to_string(), uri.to_string()))
}

#[async_trait]
impl Directory for LdapDirectory {
    async fn bind_user(&self, username: &str, password: &str) -> Result<Principal> {
        Self::check_identifier(username)?;
        if password.is_empty() {
            return Err(DirectoryError::InvalidCredentials);
        }
        let mut ldap = self.connect().await?;
        let filter = self.user_filter.replace("%u", username);
        let entry = self
            .search_one(&mut ldap, &filter, &[self.username_attr.as_str(), self.mail_attr.as_str()])
            .await?;

        let (conn, mut user_ldap) = LdapConnAsync::new(&self.ldap_server)
            .await
            .map_err(|e| DirectoryError::Unreachable(e.to_string()))?;
        ldap3::drive!(conn);
        user_ldap
            .simple_bind(&entry.dn, password)
            .await
            .and_then(|r| r.success())
            .map_err(|_| DirectoryError::InvalidCredentials)?;
        debug!(user = %username, "ldap bind succeeded");
        Ok(self.entry_to_principal(&entry))
    }

    async fn lookup_user_by_attr(&self, attr: &str, value: &str) -> Result<Principal> {
        Self::check_identifier(value)?;
        let mut ldap = self.connect().await?;
        let filter = format!("({}={})", attr, value);
        let entry = self
            .search_one(&mut ldap, &filter, &[self.username_attr.as_str(), self.mail_attr.as_str()])
            .await?;
        Ok(self.entry_to_principal(&entry))
    }

    async fn user_calendar_ids(&self, user: &str) -> Result<Vec<String>> {
        Self::check_identifier(user)?;
        let mut ldap = self.connect().await?;
        let filter = self.user_filter.replace("%u", user);
        let entry = self
            .search_one(&mut ldap, &filter, &[self.calendar_attr.as_str()])
            .await?;
        Ok(entry.attrs.get(&self.calendar_attr).cloned().unwrap_or_default())
    }

    /// Direct group membership, expanded transitively when `nested_groups`
    /// is set: a group that is itself a member of another group (resolved
    /// by re-running the member filter with the group's own `cn` in place
    /// of a user) contributes its parent groups too, up to
    /// `max_group_depth` hops.
    async fn user_groups(&self, user: &str) -> Result<Vec<String>> {
        Self::check_identifier(user)?;
        let mut ldap = self.connect().await?;
        let direct = self.direct_groups(&mut ldap, user).await?;
        if !self.nested_groups {
            return Ok(direct);
        }

        let mut visited: HashSet<String> = direct.iter().cloned().collect();
        let mut frontier = direct;
        let mut depth = 0;
        while !frontier.is_empty() && depth < self.max_group_depth {
            let mut next = Vec::new();
            for group in &frontier {
                for parent in self.direct_groups(&mut ldap, group).await? {
                    if visited.insert(parent.clone()) {
                        next.push(parent);
                    }
                }
            }
            frontier = next;
            depth += 1;
        }
        Ok(visited.into_iter().collect())
    }

    async fn group_privileges(&self, group: &str, calendar_uri: &str) -> Result<u8> {
        Self::check_identifier(group)?;
        let mut ldap = self.connect().await?;
        let entry = match self.find_group_entry(&mut ldap, group, &[self.privs_attr.as_str()]).await? {
            Some(e) => e,
            None => return Ok(0),
        };
        let bits = get_attrs(&entry, &self.privs_attr)
            .iter()
            .filter_map(|raw| parse_priv_binding(raw))
            .find(|(uri, _)| *uri == calendar_uri)
            .map(|(_, bits)| bits)
            .unwrap_or(0);
        Ok(bits)
    }

    async fn user_privileges(&self, user: &str, calendar_uri: &str) -> Result<u8> {
        Self::check_identifier(user)?;
        let mut ldap = self.connect().await?;
        let filter = self.user_filter.replace("%u", user);
        let entry = match ldap
            .search(&self.base_dn, Scope::Subtree, &filter, &[self.privs_attr.as_str()])
            .await
            .map_err(|e| DirectoryError::Unreachable(e.to_string()))?
            .success()
            .map_err(|e| DirectoryError::Unreachable(e.to_string()))?
            .0
            .into_iter()
            .next()
        {
            Some(e) => SearchEntry::construct(e),
            None => return Ok(0),
        };
        let bits = get_attrs(&entry, &self.privs_attr)
            .iter()
            .filter_map(|raw| parse_priv_binding(raw))
            .find(|(uri, _)| *uri == calendar_uri)
            .map(|(_, bits)| bits)
            .unwrap_or(0);
        Ok(bits)
    }

    async fn shared_calendars(&self, user: &str) -> Result<Vec<(String, String)>> {
        Self::check_identifier(user)?;
        let mut ldap = self.connect().await?;

        let filter = self.user_filter.replace("%u", user);
        let own_bindings: Vec<String> = ldap
            .search(&self.base_dn, Scope::Subtree, &filter, &[self.bindings_attr.as_str()])
            .await
            .map_err(|e| DirectoryError::Unreachable(e.to_string()))?
            .success()
            .map_err(|e| DirectoryError::Unreachable(e.to_string()))?
            .0
            .into_iter()
            .next()
            .map(SearchEntry::construct)
            .map(|e| e.attrs.get(&self.bindings_attr).cloned().unwrap_or_default())
            .unwrap_or_default();

        let groups = self.user_groups(user).await?;
        let mut group_bindings = Vec::new();
        for group in &groups {
            if let Some(entry) = self.find_group_entry(&mut ldap, group, &[self.bindings_attr.as_str()]).await? {
                group_bindings.extend(get_attrs(&entry, &self.bindings_attr).iter().cloned());
            }
        }

        let mut found: Vec<(String, String)> =
            own_bindings.iter().chain(group_bindings.iter()).filter_map(|raw| parse_binding(raw)).collect();
        found.sort();
        found.dedup();
        Ok(found)
    }
}
