//! Authors outgoing iTIP scheduling messages from a mutation of a
//! calendar object (RFC 5546).

use crate::model::ObjectMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Request,
    Reply,
    Cancel,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "REQUEST",
            Self::Reply => "REPLY",
            Self::Cancel => "CANCEL",
        }
    }
}

/// True if `before`/`after` differ in any field a recipient cares about.
pub fn is_significant_change(before: &ObjectMeta, after: &ObjectMeta) -> bool {
    before.start != after.start
        || before.end != after.end
        || before.summary != after.summary
        || before.location != after.location
        || before.description != after.description
}

/// Rewrites `METHOD`, refreshes `PRODID`/`DTSTAMP`, and — for a `REPLY` —
/// strips every attendee but the replying one, as RFC 5546 §3.2.3 requires.
///
/// Returns `None` when the object carries no organizer/attendee pair, i.e.
/// it is not a scheduled object at all.
pub fn author_message(
    raw: &str,
    method: Method,
    prodid: &str,
    now_stamp: &str,
    reply_from: Option<&str>,
) -> Option<String> {
    let cal = icalendar::parser::read_calendar(raw).ok()?;
    let comp = cal.components.first()?;
    if comp
        .properties
        .iter()
        .find(|p| p.name.as_ref() == "ORGANIZER")
        .is_none()
    {
        return None;
    }

    let mut out = String::new();
    out.push_str("BEGIN:VCALENDAR\r\n");
    out.push_str("VERSION:2.0\r\n");
    out.push_str(&format!("PRODID:{}\r\n", prodid));
    out.push_str(&format!("METHOD:{}\r\n", method.as_str()));
    out.push_str(&format!("BEGIN:{}\r\n", comp.name));
    for p in &comp.properties {
        let name = p.name.as_ref();
        if name == "DTSTAMP" {
            continue;
        }
        if name == "ATTENDEE" {
            if method == Method::Reply {
                if let Some(me) = reply_from {
                    if !p.val.as_ref().contains(me) {
                        continue;
                    }
                }
            }
        }
        out.push_str(&format!("{}:{}\r\n", name, p.val));
    }
    out.push_str(&format!("DTSTAMP:{}\r\n", now_stamp));
    out.push_str(&format!("END:{}\r\n", comp.name));
    out.push_str("END:VCALENDAR\r\n");
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT: &str = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:e1\r\nDTSTAMP:20260101T000000Z\r\nDTSTART:20260115T093000Z\r\nORGANIZER:mailto:alice@example.com\r\nATTENDEE:mailto:bob@example.com\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

    #[test]
    fn authors_request_message() {
        let msg = author_message(EVENT, Method::Request, "-//test//EN", "20260102T000000Z", None).unwrap();
        assert!(msg.contains("METHOD:REQUEST"));
        assert!(msg.contains("ATTENDEE:mailto:bob@example.com"));
    }

    #[test]
    fn reply_keeps_only_replying_attendee() {
        let msg = author_message(
            EVENT,
            Method::Reply,
            "-//test//EN",
            "20260102T000000Z",
            Some("bob@example.com"),
        )
        .unwrap();
        assert!(msg.contains("METHOD:REPLY"));
        assert!(msg.contains("bob@example.com"));
    }

    #[test]
    fn no_organizer_is_not_scheduled() {
        let raw = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:e2\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        assert!(author_message(raw, Method::Request, "-//test//EN", "x", None).is_none());
    }
}
