//! Encodes `multistatus` response bodies.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;

use crate::error::Result;
use crate::types::*;
use crate::xml::{NS_CALDAV, NS_CARDDAV, NS_CS, NS_DAV};

fn status_line(code: u16) -> String {
    let reason = match code {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        207 => "Multi-Status",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        423 => "Locked",
        507 => "Insufficient Storage",
        _ => "Error",
    };
    format!("HTTP/1.1 {} {}", code, reason)
}

/// Encodes the full `DAV:multistatus` document, optionally carrying a
/// trailing `DAV:sync-token` (only present for sync-collection reports).
pub fn encode_multistatus(
    responses: &[MultistatusResponse],
    sync_token: Option<&str>,
) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut w = Writer::new(&mut buf);
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut root = BytesStart::new("D:multistatus");
    root.push_attribute(("xmlns:D", NS_DAV));
    root.push_attribute(("xmlns:C", NS_CALDAV));
    root.push_attribute(("xmlns:A", NS_CARDDAV));
    root.push_attribute(("xmlns:CS", NS_CS));
    w.write_event(Event::Start(root))?;

    for r in responses {
        write_response(&mut w, r)?;
    }

    if let Some(token) = sync_token {
        w.write_event(Event::Start(BytesStart::new("D:sync-token")))?;
        w.write_event(Event::Text(BytesText::new(token)))?;
        w.write_event(Event::End(BytesEnd::new("D:sync-token")))?;
    }

    w.write_event(Event::End(BytesEnd::new("D:multistatus")))?;
    Ok(buf)
}

fn write_response(w: &mut Writer<&mut Vec<u8>>, r: &MultistatusResponse) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new("D:response")))?;
    w.write_event(Event::Start(BytesStart::new("D:href")))?;
    w.write_event(Event::Text(BytesText::new(&r.href.0)))?;
    w.write_event(Event::End(BytesEnd::new("D:href")))?;

    if let Some(status) = r.status {
        w.write_event(Event::Start(BytesStart::new("D:status")))?;
        w.write_event(Event::Text(BytesText::new(&status_line(status))))?;
        w.write_event(Event::End(BytesEnd::new("D:status")))?;
    }

    for ps in &r.propstats {
        write_propstat(w, ps)?;
    }

    w.write_event(Event::End(BytesEnd::new("D:response")))?;
    Ok(())
}

fn write_propstat(w: &mut Writer<&mut Vec<u8>>, ps: &Propstat) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new("D:propstat")))?;
    w.write_event(Event::Start(BytesStart::new("D:prop")))?;
    for p in &ps.properties {
        write_property(w, p)?;
    }
    for name in &ps.missing {
        w.write_event(Event::Empty(BytesStart::new(qualified(*name))))?;
    }
    w.write_event(Event::End(BytesEnd::new("D:prop")))?;

    w.write_event(Event::Start(BytesStart::new("D:status")))?;
    w.write_event(Event::Text(BytesText::new(&status_line(ps.status))))?;
    w.write_event(Event::End(BytesEnd::new("D:status")))?;
    w.write_event(Event::End(BytesEnd::new("D:propstat")))?;
    Ok(())
}

fn qualified(name: PropertyName) -> String {
    let (ns, local) = name.qname();
    let prefix = match ns {
        NS_DAV => "D",
        NS_CALDAV => "C",
        NS_CARDDAV => "A",
        NS_CS => "CS",
        _ => "D",
    };
    format!("{}:{}", prefix, local)
}

fn write_text_element(w: &mut Writer<&mut Vec<u8>>, tag: &str, text: &str) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new(tag)))?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    w.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn write_href_element(w: &mut Writer<&mut Vec<u8>>, tag: &str, href: &Href) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new(tag)))?;
    write_text_element(w, "D:href", &href.0)?;
    w.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn write_property(w: &mut Writer<&mut Vec<u8>>, p: &PropertyValue) -> Result<()> {
    let tag = qualified(p.name());
    match p {
        PropertyValue::ResourceType(types) => {
            w.write_event(Event::Start(BytesStart::new(&tag)))?;
            for t in types {
                let el = match t {
                    ResourceType::Collection => "D:collection",
                    ResourceType::Calendar => "C:calendar",
                    ResourceType::Addressbook => "A:addressbook",
                    ResourceType::Principal => "D:principal",
                    ResourceType::ScheduleInbox => "C:schedule-inbox",
                    ResourceType::ScheduleOutbox => "C:schedule-outbox",
                };
                w.write_event(Event::Empty(BytesStart::new(el)))?;
            }
            w.write_event(Event::End(BytesEnd::new(&tag)))?;
        }
        PropertyValue::DisplayName(s) => write_text_element(w, &tag, s)?,
        PropertyValue::CurrentUserPrincipal(h) => write_href_element(w, &tag, h)?,
        PropertyValue::PrincipalUrl(h) => write_href_element(w, &tag, h)?,
        PropertyValue::PrincipalCollectionSet(hrefs) => {
            w.write_event(Event::Start(BytesStart::new(&tag)))?;
            for h in hrefs {
                write_text_element(w, "D:href", &h.0)?;
            }
            w.write_event(Event::End(BytesEnd::new(&tag)))?;
        }
        PropertyValue::CalendarHomeSet(h) => write_href_element(w, &tag, h)?,
        PropertyValue::AddressbookHomeSet(h) => write_href_element(w, &tag, h)?,
        PropertyValue::SupportedCalendarComponentSet(comps) => {
            w.write_event(Event::Start(BytesStart::new(&tag)))?;
            for c in comps {
                let mut el = BytesStart::new("C:comp");
                el.push_attribute(("name", c.as_str()));
                w.write_event(Event::Empty(el))?;
            }
            w.write_event(Event::End(BytesEnd::new(&tag)))?;
        }
        PropertyValue::SupportedCalendarData => {
            w.write_event(Event::Start(BytesStart::new(&tag)))?;
            let mut el = BytesStart::new("C:calendar-data");
            el.push_attribute(("content-type", "text/calendar"));
            el.push_attribute(("version", "2.0"));
            w.write_event(Event::Empty(el))?;
            w.write_event(Event::End(BytesEnd::new(&tag)))?;
        }
        PropertyValue::Owner(h) => write_href_element(w, &tag, h)?,
        PropertyValue::GetCTag(s) => write_text_element(w, &tag, s)?,
        PropertyValue::SyncToken(s) => write_text_element(w, &tag, s)?,
        PropertyValue::GetContentType(s) => write_text_element(w, &tag, s)?,
        PropertyValue::CalendarData(s) => write_text_element(w, &tag, s)?,
        PropertyValue::AddressData(s) => write_text_element(w, &tag, s)?,
        PropertyValue::GetETag(s) => write_text_element(w, &tag, &format!("\"{}\"", s))?,
        PropertyValue::GetLastModified(s) => write_text_element(w, &tag, s)?,
        PropertyValue::GetContentLength(n) => write_text_element(w, &tag, &n.to_string())?,
        PropertyValue::Acl(aces) => {
            w.write_event(Event::Start(BytesStart::new(&tag)))?;
            for ace in aces {
                w.write_event(Event::Start(BytesStart::new("D:ace")))?;
                write_href_element(w, "D:principal", &ace.principal)?;
                w.write_event(Event::Start(BytesStart::new("D:grant")))?;
                for (flag, name) in [
                    (Privileges::READ, "D:read"),
                    (Privileges::WRITE_PROPS, "D:write-properties"),
                    (Privileges::WRITE_CONTENT, "D:write-content"),
                    (Privileges::BIND, "D:bind"),
                    (Privileges::UNBIND, "D:unbind"),
                ] {
                    if ace.grant.contains(flag) {
                        w.write_event(Event::Start(BytesStart::new("D:privilege")))?;
                        w.write_event(Event::Empty(BytesStart::new(name)))?;
                        w.write_event(Event::End(BytesEnd::new("D:privilege")))?;
                    }
                }
                w.write_event(Event::End(BytesEnd::new("D:grant")))?;
                w.write_event(Event::End(BytesEnd::new("D:ace")))?;
            }
            w.write_event(Event::End(BytesEnd::new(&tag)))?;
        }
        PropertyValue::ScheduleInboxUrl(h) => write_href_element(w, &tag, h)?,
        PropertyValue::ScheduleOutboxUrl(h) => write_href_element(w, &tag, h)?,
        PropertyValue::CalendarColor(s) => write_text_element(w, &tag, s)?,
        PropertyValue::CalendarDescription(s) => write_text_element(w, &tag, s)?,
        PropertyValue::ScheduleTag(s) => write_text_element(w, &tag, &format!("\"{}\"", s))?,
    }
    Ok(())
}

/// Encodes a `DAV:error` precondition-failure body.
pub fn encode_error(namespace_prefix: &str, element: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut w = Writer::new(&mut buf);
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    let mut root = BytesStart::new("D:error");
    root.push_attribute(("xmlns:D", NS_DAV));
    root.push_attribute(("xmlns:C", NS_CALDAV));
    w.write_event(Event::Start(root))?;
    w.write_event(Event::Empty(BytesStart::new(format!(
        "{}:{}",
        namespace_prefix, element
    ))))?;
    w.write_event(Event::End(BytesEnd::new("D:error")))?;
    Ok(buf)
}

/// Assembles a minimal VFREEBUSY document for the free-busy-query REPORT.
pub fn encode_free_busy(busy: &[(i64, i64)], range: TimeRange, now_stamp: &str, prodid: &str) -> String {
    let mut out = String::new();
    out.push_str("BEGIN:VCALENDAR\r\n");
    out.push_str("VERSION:2.0\r\n");
    out.push_str(&format!("PRODID:{}\r\n", prodid));
    out.push_str("METHOD:REPLY\r\n");
    out.push_str("BEGIN:VFREEBUSY\r\n");
    out.push_str(&format!("DTSTAMP:{}\r\n", now_stamp));
    out.push_str(&format!("DTSTART:{}\r\n", fmt_epoch(range.start)));
    out.push_str(&format!("DTEND:{}\r\n", fmt_epoch(range.end)));
    for (start, end) in busy {
        out.push_str(&format!(
            "FREEBUSY;FBTYPE=BUSY:{}/{}\r\n",
            fmt_epoch(*start),
            fmt_epoch(*end)
        ));
    }
    out.push_str("END:VFREEBUSY\r\n");
    out.push_str("END:VCALENDAR\r\n");
    out
}

fn fmt_epoch(ts: i64) -> String {
    use chrono::DateTime;
    DateTime::from_timestamp(ts.clamp(0, 253_402_300_799), 0)
        .map(|dt| dt.format("%Y%m%dT%H%M%SZ").to_string())
        .unwrap_or_else(|| "19700101T000000Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_simple_multistatus() {
        let resp = MultistatusResponse {
            href: Href("/dav/calendars/alice/home/".into()),
            status: None,
            propstats: vec![Propstat::found(vec![PropertyValue::GetCTag("abc123".into())])],
        };
        let xml = encode_multistatus(&[resp], None).unwrap();
        let s = String::from_utf8(xml).unwrap();
        assert!(s.contains("CS:getctag"));
        assert!(s.contains("abc123"));
        assert!(s.contains("207") == false); // status is carried in the HTTP layer, not the body
    }

    #[test]
    fn encodes_sync_token_trailer() {
        let xml = encode_multistatus(&[], Some("seq:9")).unwrap();
        let s = String::from_utf8(xml).unwrap();
        assert!(s.contains("seq:9"));
    }
}
