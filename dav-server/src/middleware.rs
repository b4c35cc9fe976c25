use hyper::{body::Incoming, Request};

use directory::Principal;

use crate::error::DavError;
use crate::state::AppState;

/// Extracts and validates the `Authorization` header, producing the
/// request's [`Principal`]. Absence of the header and any validation
/// failure both fail closed as `AuthRequired`.
pub async fn authenticate(state: &AppState, req: &Request<Incoming>) -> Result<Principal, DavError> {
    let header = req
        .headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(DavError::AuthRequired)?;

    state
        .auth
        .authenticate(header)
        .await
        .map_err(|_| DavError::AuthRequired)
}
