//! Extracts the handful of iCalendar fields the DAV engine actually needs
//! to index and filter an object, without modelling the full RFC 5545
//! grammar.

use icalendar::parser::{Component, Property};

use crate::duration::date_time;

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum ComponentKind {
    VEvent,
    VTodo,
    VJournal,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VEvent => "VEVENT",
            Self::VTodo => "VTODO",
            Self::VJournal => "VJOURNAL",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "VEVENT" => Some(Self::VEvent),
            "VTODO" => Some(Self::VTodo),
            "VJOURNAL" => Some(Self::VJournal),
            _ => None,
        }
    }
}

/// The subset of an iCalendar object's fields the store indexes.
#[derive(Debug, Clone, Default)]
pub struct ObjectMeta {
    pub uid: Option<String>,
    pub kind: Option<ComponentKind>,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub summary: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub organizer: Option<String>,
    pub attendees: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("not a valid iCalendar document")]
    Malformed,
    #[error("no VEVENT, VTODO, or VJOURNAL component found")]
    NoComponent,
}

/// Parses a raw `.ics` payload and extracts the fields needed for indexing.
/// Only the first matching component is considered: this server does not
/// support multiple top-level events sharing one UID (RFC 5545 recurrence
/// overrides aside, which are out of scope).
pub fn extract(raw: &str) -> Result<ObjectMeta, ParseError> {
    let cal = icalendar::parser::read_calendar(raw).map_err(|_| ParseError::Malformed)?;
    let comp = cal
        .components
        .iter()
        .find(|c| ComponentKind::from_str(c.name.as_ref()).is_some())
        .ok_or(ParseError::NoComponent)?;
    let kind = ComponentKind::from_str(comp.name.as_ref());

    let uid = find_prop(&comp.properties, "UID").map(|p| p.val.to_string());
    let start = find_prop(&comp.properties, "DTSTART")
        .and_then(|p| date_time(p.val.as_ref()))
        .map(|d| d.timestamp());
    let end = resolve_end(comp, start);
    let summary = find_prop(&comp.properties, "SUMMARY").map(|p| p.val.to_string());
    let location = find_prop(&comp.properties, "LOCATION").map(|p| p.val.to_string());
    let description = find_prop(&comp.properties, "DESCRIPTION").map(|p| p.val.to_string());
    let organizer = find_prop(&comp.properties, "ORGANIZER").map(|p| p.val.to_string());
    let attendees = comp
        .properties
        .iter()
        .filter(|p| p.name.as_ref() == "ATTENDEE")
        .map(|p| p.val.to_string())
        .collect();

    Ok(ObjectMeta {
        uid,
        kind,
        start,
        end,
        summary,
        location,
        description,
        organizer,
        attendees,
    })
}

fn resolve_end(comp: &Component, start: Option<i64>) -> Option<i64> {
    if let Some(dtend) = find_prop(&comp.properties, "DTEND").or_else(|| find_prop(&comp.properties, "DUE")) {
        return date_time(dtend.val.as_ref()).map(|d| d.timestamp());
    }
    let duration = find_prop(&comp.properties, "DURATION")
        .and_then(|p| crate::duration::dur_value(p.val.as_ref()).ok())
        .map(|(_, d)| d);
    match (start, duration) {
        (Some(s), Some(d)) => Some(s + d.num_seconds()),
        _ => None,
    }
}

fn find_prop<'a>(props: &'a [Property<'a>], name: &str) -> Option<&'a Property<'a>> {
    props.iter().find(|p| p.name.as_ref() == name)
}

/// Extracts the `UID:` line from a vCard payload. vCard is not modeled
/// beyond this: the server stores and returns the payload verbatim.
pub fn extract_vcard_uid(raw: &str) -> Option<String> {
    raw.lines()
        .find(|l| l.to_ascii_uppercase().starts_with("UID:"))
        .map(|l| l.splitn(2, ':').nth(1).unwrap_or("").trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:abc-123\r\nDTSTART:20260115T093000Z\r\nDTEND:20260115T100000Z\r\nSUMMARY:Standup\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

    #[test]
    fn extracts_event_fields() {
        let meta = extract(EVENT).unwrap();
        assert_eq!(meta.uid.as_deref(), Some("abc-123"));
        assert_eq!(meta.kind, Some(ComponentKind::VEvent));
        assert!(meta.start.unwrap() < meta.end.unwrap());
    }

    #[test]
    fn resolves_end_from_duration() {
        let raw = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:d1\r\nDTSTART:20260115T093000Z\r\nDURATION:PT1H\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let meta = extract(raw).unwrap();
        assert_eq!(meta.end.unwrap() - meta.start.unwrap(), 3600);
    }

    #[test]
    fn vcard_uid_extraction() {
        let vcf = "BEGIN:VCARD\r\nVERSION:3.0\r\nUID:contact-1\r\nFN:Jane Doe\r\nEND:VCARD\r\n";
        assert_eq!(extract_vcard_uid(vcf).as_deref(), Some("contact-1"));
    }
}
