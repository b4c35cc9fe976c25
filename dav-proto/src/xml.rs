//! Namespace constants and small helpers shared by the decoder and encoder.
//!
//! The wire format mixes four XML namespaces. We always declare them on the
//! document root (`D:`, `C:`, `A:`, `CS:`) rather than re-declaring per
//! element, which keeps encoded documents small and matches what real
//! CalDAV clients emit.

pub const NS_DAV: &str = "DAV:";
pub const NS_CALDAV: &str = "urn:ietf:params:xml:ns:caldav";
pub const NS_CARDDAV: &str = "urn:ietf:params:xml:ns:carddav";
pub const NS_CS: &str = "http://calendarserver.org/ns/";

pub const PFX_DAV: &str = "D";
pub const PFX_CALDAV: &str = "C";
pub const PFX_CARDDAV: &str = "A";
pub const PFX_CS: &str = "CS";

/// A qualified element name: namespace prefix + local name, e.g. `D:href`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QName(pub &'static str, pub &'static str);

impl QName {
    pub fn qualified(&self) -> String {
        format!("{}:{}", self.0, self.1)
    }
}

/// Strip a namespace prefix off a local-name comparison, e.g.
/// `b"D:propfind"` and local name `propfind` both match `propfind`.
pub fn local_name(tag: &[u8]) -> &[u8] {
    match tag.iter().position(|&b| b == b':') {
        Some(idx) => &tag[idx + 1..],
        None => tag,
    }
}
