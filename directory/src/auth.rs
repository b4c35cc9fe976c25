//! Parses the `Authorization` header and dispatches to the configured
//! directory backend (Basic) or JWT validator (Bearer), producing a single
//! [`Principal`] the router can attach to the request.

use base64::Engine;
use std::sync::Arc;

use crate::backend::Directory;
use crate::error::{DirectoryError, Result};
use crate::jwt::JwtValidator;
use crate::principal::Principal;

pub enum Credentials {
    Basic { username: String, password: String },
    Bearer { token: String },
}

pub fn parse_authorization_header(value: &str) -> Result<Credentials> {
    if let Some(b64) = value.strip_prefix("Basic ") {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(b64.trim())
            .map_err(|_| DirectoryError::InvalidCredentials)?;
        let text = String::from_utf8(decoded).map_err(|_| DirectoryError::InvalidCredentials)?;
        let (username, password) = text.split_once(':').ok_or(DirectoryError::InvalidCredentials)?;
        return Ok(Credentials::Basic {
            username: username.to_string(),
            password: password.to_string(),
        });
    }
    if let Some(token) = value.strip_prefix("Bearer ") {
        return Ok(Credentials::Bearer {
            token: token.trim().to_string(),
        });
    }
    Err(DirectoryError::InvalidCredentials)
}

/// Authenticates a request given its raw `Authorization` header value.
/// The JWT validator is optional: deployments that only expose Basic auth
/// against the directory pass `None`.
pub struct AuthChain {
    directory: Arc<dyn Directory>,
    jwt: Option<JwtValidator>,
    token_attr: String,
}

impl AuthChain {
    pub fn new(directory: Arc<dyn Directory>, jwt: Option<JwtValidator>, token_attr: impl Into<String>) -> Self {
        Self {
            directory,
            jwt,
            token_attr: token_attr.into(),
        }
    }

    pub async fn authenticate(&self, authorization_header: &str) -> Result<Principal> {
        match parse_authorization_header(authorization_header)? {
            Credentials::Basic { username, password } => {
                self.directory.bind_user(&username, &password).await
            }
            Credentials::Bearer { token } => {
                let validator = self.jwt.as_ref().ok_or(DirectoryError::InvalidCredentials)?;
                let claims = validator.validate(&token).await?;
                let subject = claims.preferred_username.as_deref().unwrap_or(&claims.sub);
                self.directory.lookup_user_by_attr(&self.token_attr, subject).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_header() {
        let header = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode("alice:hunter2")
        );
        match parse_authorization_header(&header).unwrap() {
            Credentials::Basic { username, password } => {
                assert_eq!(username, "alice");
                assert_eq!(password, "hunter2");
            }
            _ => panic!("expected basic"),
        }
    }

    #[test]
    fn parses_bearer_header() {
        match parse_authorization_header("Bearer abc.def.ghi").unwrap() {
            Credentials::Bearer { token } => assert_eq!(token, "abc.def.ghi"),
            _ => panic!("expected bearer"),
        }
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(parse_authorization_header("Digest foo").is_err());
    }
}
