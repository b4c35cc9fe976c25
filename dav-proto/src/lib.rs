//! WebDAV/CalDAV/CardDAV wire protocol codec.
//!
//! Parses PROPFIND and REPORT request bodies and encodes `multistatus`
//! response bodies for the fixed property and report vocabulary this
//! server speaks (RFC 4918, RFC 4791, RFC 6352, RFC 6578).

pub mod decode;
pub mod encode;
pub mod error;
pub mod types;
pub mod xml;

pub use error::{CodecError, Result};
