/// An authenticated identity, attached to the request context by the auth
/// chain and consumed by the ACL resolver, the router, and the scheduling
/// engine. Never persisted: it is recomputed on every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Stable identifier used in store and ACL lookups; for the LDAP
    /// backend this is the configured username attribute's value, not the
    /// full DN.
    pub user_id: String,
    pub display_name: String,
    pub dn: String,
    pub email: Option<String>,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, dn: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            display_name: user_id.clone(),
            user_id,
            dn: dn.into(),
            email: None,
        }
    }
}
