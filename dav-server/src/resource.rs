use crate::error::DavError;

/// What a request path resolves to, independent of HTTP method. The
/// PROPFIND/REPORT/CRUD engines each match on this instead of re-parsing
/// the path themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Root,
    Principal { user: String },
    CalendarHome { owner: String },
    Calendar { owner: String, uri: String },
    CalendarObject { owner: String, uri: String, object_uid: String },
    SharedCalendar { real_owner: String, uri: String },
    AddressbookHome { owner: String },
    Addressbook { owner: String, uri: String },
    AddressbookObject { owner: String, uri: String, object_uid: String },
    ScheduleInbox { owner: String },
    ScheduleOutbox { owner: String },
}

/// Splits `path` into the base-path-relative segment list, rejecting
/// anything outside the configured DAV tree. Absolute URLs in request
/// bodies are normalized to their path component by the caller before
/// this function ever sees them.
pub fn parse_path(base_path: &str, path: &str) -> Result<Resource, DavError> {
    let base = base_path.trim_end_matches('/');
    let rest = path
        .strip_prefix(base)
        .ok_or_else(|| DavError::NotFound)?;
    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        [] => Ok(Resource::Root),
        ["principals", "users", user] => Ok(Resource::Principal { user: user.to_string() }),
        ["calendars", owner] => Ok(Resource::CalendarHome { owner: owner.to_string() }),
        ["calendars", owner, "calendar-inbox"] => Ok(Resource::ScheduleInbox { owner: owner.to_string() }),
        ["calendars", owner, "calendar-outbox"] => Ok(Resource::ScheduleOutbox { owner: owner.to_string() }),
        ["calendars", _owner, "shared", real_owner, uri] => Ok(Resource::SharedCalendar {
            real_owner: real_owner.to_string(),
            uri: uri.to_string(),
        }),
        ["calendars", _owner, "shared", real_owner, uri, object] => {
            let object_uid = object
                .strip_suffix(".ics")
                .ok_or_else(|| DavError::UnsupportedMediaType)?
                .to_string();
            Ok(Resource::CalendarObject {
                owner: real_owner.to_string(),
                uri: uri.to_string(),
                object_uid,
            })
        }
        ["calendars", owner, uri] => Ok(Resource::Calendar {
            owner: owner.to_string(),
            uri: uri.to_string(),
        }),
        ["calendars", owner, uri, object] => {
            let object_uid = object
                .strip_suffix(".ics")
                .ok_or_else(|| DavError::UnsupportedMediaType)?
                .to_string();
            Ok(Resource::CalendarObject {
                owner: owner.to_string(),
                uri: uri.to_string(),
                object_uid,
            })
        }
        ["addressbooks", owner] => Ok(Resource::AddressbookHome { owner: owner.to_string() }),
        ["addressbooks", owner, uri] => Ok(Resource::Addressbook {
            owner: owner.to_string(),
            uri: uri.to_string(),
        }),
        ["addressbooks", owner, uri, object] => {
            let object_uid = object
                .strip_suffix(".vcf")
                .ok_or_else(|| DavError::UnsupportedMediaType)?
                .to_string();
            Ok(Resource::AddressbookObject {
                owner: owner.to_string(),
                uri: uri.to_string(),
                object_uid,
            })
        }
        _ => Err(DavError::NotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_calendar_object_path() {
        let r = parse_path("/dav", "/dav/calendars/alice/default/evt-1.ics").unwrap();
        assert_eq!(
            r,
            Resource::CalendarObject {
                owner: "alice".into(),
                uri: "default".into(),
                object_uid: "evt-1".into(),
            }
        );
    }

    #[test]
    fn parses_root_and_home() {
        assert_eq!(parse_path("/dav", "/dav").unwrap(), Resource::Root);
        assert_eq!(
            parse_path("/dav", "/dav/calendars/alice").unwrap(),
            Resource::CalendarHome { owner: "alice".into() }
        );
    }

    #[test]
    fn rejects_path_outside_base() {
        assert!(parse_path("/dav", "/other/x").is_err());
    }
}
