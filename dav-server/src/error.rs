use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use thiserror::Error;

use directory::DirectoryError;
use store::StoreError;

pub type HttpResponse = Response<Full<Bytes>>;

/// A single taxonomy spanning every collaborator's failure modes, mapped
/// to one HTTP status each by [`into_response`]. Handlers propagate this
/// with `?` instead of matching on collaborator-specific error types.
#[derive(Debug, Error)]
pub enum DavError {
    #[error("authentication required")]
    AuthRequired,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("sync-token is invalid or precedes the collection's retained history")]
    InvalidSyncToken,
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("unsupported media type")]
    UnsupportedMediaType,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("upstream collaborator unavailable: {0}")]
    Upstream(String),
    #[error("internal error: {0}")]
    Fatal(String),
}

impl From<DirectoryError> for DavError {
    fn from(e: DirectoryError) -> Self {
        match e {
            DirectoryError::InvalidCredentials => DavError::AuthRequired,
            DirectoryError::UserNotFound => DavError::AuthRequired,
            DirectoryError::Unreachable(msg) => DavError::Upstream(msg),
            DirectoryError::Invalid(msg) => DavError::Fatal(msg),
        }
    }
}

impl From<StoreError> for DavError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => DavError::NotFound,
            StoreError::Conflict(msg) => DavError::Conflict(msg),
            StoreError::PreconditionFailed(msg) => DavError::PreconditionFailed(msg),
            StoreError::InvalidSyncToken => DavError::InvalidSyncToken,
            StoreError::Internal(msg) => DavError::Fatal(msg),
        }
    }
}

impl From<dav_proto::CodecError> for DavError {
    fn from(e: dav_proto::CodecError) -> Self {
        DavError::Malformed(e.to_string())
    }
}

impl From<ical::model::ParseError> for DavError {
    fn from(e: ical::model::ParseError) -> Self {
        DavError::Malformed(e.to_string())
    }
}

impl DavError {
    fn status(&self) -> StatusCode {
        match self {
            Self::AuthRequired => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            // RFC 6578: an unrecognized or compacted-past sync-token is a
            // `DAV:valid-sync-token` precondition failure reported as 403,
            // not 412 — every other precondition in this taxonomy is 412.
            Self::InvalidSyncToken => StatusCode::FORBIDDEN,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Malformed(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub fn into_response(err: DavError) -> HttpResponse {
    let status = err.status();
    if matches!(err, DavError::Fatal(_) | DavError::Upstream(_)) {
        tracing::error!(err = %err, "request failed");
    } else {
        tracing::debug!(err = %err, "request rejected");
    }

    let mut builder = Response::builder().status(status);
    if matches!(err, DavError::AuthRequired) {
        builder = builder.header("WWW-Authenticate", "Basic realm=\"DAV\"");
    }
    if let DavError::Upstream(_) = err {
        builder = builder.header("Retry-After", "5");
    }

    let body = match &err {
        DavError::InvalidSyncToken => "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
            <D:error xmlns:D=\"DAV:\"><D:valid-sync-token/></D:error>"
            .to_string(),
        _ => err.to_string(),
    };

    builder
        .header("content-type", "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}
