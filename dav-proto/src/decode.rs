//! Parses PROPFIND and REPORT request bodies.
//!
//! This server's vocabulary is fixed (no open extension surface), so a
//! buffered `quick_xml::Reader` walking a flat event loop is enough and
//! avoids generic-trait-dispatch machinery a more extensible codec would
//! need.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::NsReader;

use crate::error::{CodecError, Result};
use crate::types::*;
use crate::xml::local_name;

/// Parse a `DAV:propfind` request body. An empty body means "return the
/// server's default property set", mirrored by returning `PropertyRequest::AllProp`.
pub fn decode_propfind(body: &[u8]) -> Result<PropertyRequest> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(PropertyRequest::AllProp);
    }
    let mut reader = NsReader::from_reader(body);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => {
                let local = local_name(e.name().as_ref()).to_vec();
                match &local[..] {
                    b"allprop" => return Ok(PropertyRequest::AllProp),
                    b"propname" => return Ok(PropertyRequest::PropName),
                    b"prop" => return Ok(PropertyRequest::Prop(read_prop_names(&mut reader)?)),
                    _ => {}
                }
            }
            Event::Eof => return Ok(PropertyRequest::AllProp),
            _ => {}
        }
        buf.clear();
    }
}

/// Reads the children of a `<prop>` element as bare property names (no
/// values are expected in a request body).
fn read_prop_names(reader: &mut NsReader<&[u8]>) -> Result<Vec<PropertyName>> {
    let mut names = Vec::new();
    let mut buf = Vec::new();
    let mut depth = 0u32;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                depth += 1;
                names.push(qname_of(reader, &e));
            }
            Event::Empty(e) => {
                names.push(qname_of(reader, &e));
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"prop" => break,
            Event::End(_) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            Event::Eof => return Err(CodecError::Eof),
            _ => {}
        }
        buf.clear();
    }
    Ok(names)
}

fn qname_of(reader: &NsReader<&[u8]>, e: &BytesStart) -> PropertyName {
    let resolved = reader.resolve_element(e.name());
    let ns = match resolved.0 {
        quick_xml::name::ResolveResult::Bound(ns) => {
            std::str::from_utf8(ns.as_ref()).unwrap_or("").to_string()
        }
        _ => String::new(),
    };
    let local = std::str::from_utf8(resolved.1.as_ref()).unwrap_or("").to_string();
    // PropertyName::from_qname expects &'static str namespaces; match by value instead.
    from_qname_owned(&ns, &local)
}

fn from_qname_owned(ns: &str, local: &str) -> PropertyName {
    use crate::xml::{NS_CALDAV, NS_CARDDAV, NS_CS, NS_DAV};
    match (ns, local) {
        (NS_DAV, "resourcetype") => PropertyName::ResourceType,
        (NS_DAV, "displayname") => PropertyName::DisplayName,
        (NS_DAV, "current-user-principal") => PropertyName::CurrentUserPrincipal,
        (NS_DAV, "principal-URL") => PropertyName::PrincipalUrl,
        (NS_DAV, "principal-collection-set") => PropertyName::PrincipalCollectionSet,
        (NS_CALDAV, "calendar-home-set") => PropertyName::CalendarHomeSet,
        (NS_CARDDAV, "addressbook-home-set") => PropertyName::AddressbookHomeSet,
        (NS_CALDAV, "supported-calendar-component-set") => {
            PropertyName::SupportedCalendarComponentSet
        }
        (NS_CALDAV, "supported-calendar-data") => PropertyName::SupportedCalendarData,
        (NS_DAV, "owner") => PropertyName::Owner,
        (NS_CS, "getctag") => PropertyName::GetCTag,
        (NS_DAV, "sync-token") => PropertyName::SyncToken,
        (NS_DAV, "getcontenttype") => PropertyName::GetContentType,
        (NS_CALDAV, "calendar-data") => PropertyName::CalendarData,
        (NS_CARDDAV, "address-data") => PropertyName::AddressData,
        (NS_DAV, "getetag") => PropertyName::GetETag,
        (NS_DAV, "getlastmodified") => PropertyName::GetLastModified,
        (NS_DAV, "getcontentlength") => PropertyName::GetContentLength,
        (NS_DAV, "acl") => PropertyName::Acl,
        (NS_CALDAV, "schedule-inbox-URL") => PropertyName::ScheduleInboxUrl,
        (NS_CALDAV, "schedule-outbox-URL") => PropertyName::ScheduleOutboxUrl,
        (NS_CS, "calendar-color") => PropertyName::CalendarColor,
        (NS_CALDAV, "calendar-description") => PropertyName::CalendarDescription,
        (NS_CALDAV, "schedule-tag") => PropertyName::ScheduleTag,
        _ => PropertyName::Other("unknown"),
    }
}

/// Parse a REPORT request body; `root_hint` lets the caller disambiguate
/// `addressbook-multiget` from `calendar-multiget` when both share shape.
pub fn decode_report(body: &[u8]) -> Result<ReportRequest> {
    let mut reader = NsReader::from_reader(body);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let root = loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => break e.to_owned(),
            Event::Eof => return Err(CodecError::Eof),
            _ => {}
        }
        buf.clear();
    };
    buf.clear();
    let local = local_name(root.name().as_ref()).to_vec();
    match &local[..] {
        b"calendar-query" => Ok(ReportRequest::CalendarQuery(decode_calendar_query(&mut reader)?)),
        b"calendar-multiget" => {
            Ok(ReportRequest::CalendarMultiget(decode_multiget(&mut reader)?))
        }
        b"addressbook-multiget" => {
            Ok(ReportRequest::AddressbookMultiget(decode_multiget(&mut reader)?))
        }
        b"sync-collection" => Ok(ReportRequest::SyncCollection(decode_sync_collection(
            &mut reader,
        )?)),
        b"free-busy-query" => Ok(ReportRequest::FreeBusyQuery(decode_time_range_only(
            &mut reader,
        )?)),
        other => Err(CodecError::UnexpectedElement(
            String::from_utf8_lossy(other).into_owned(),
        )),
    }
}

fn decode_calendar_query(reader: &mut NsReader<&[u8]>) -> Result<CalendarQuery> {
    let mut props = PropertyRequest::AllProp;
    let mut filter = CompFilter {
        name: "VCALENDAR".into(),
        time_range: None,
        prop_filters: vec![],
        comp_filters: vec![],
    };
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => {
                let local = local_name(e.name().as_ref()).to_vec();
                match &local[..] {
                    b"allprop" => props = PropertyRequest::AllProp,
                    b"propname" => props = PropertyRequest::PropName,
                    b"prop" => props = PropertyRequest::Prop(read_prop_names(reader)?),
                    b"filter" => filter = decode_filter_root(reader)?,
                    _ => {}
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"calendar-query" => break,
            Event::Eof => return Err(CodecError::Eof),
            _ => {}
        }
        buf.clear();
    }
    Ok(CalendarQuery { props, filter })
}

fn decode_filter_root(reader: &mut NsReader<&[u8]>) -> Result<CompFilter> {
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let local = local_name(e.name().as_ref()).to_vec();
                if local == b"comp-filter" {
                    let name = attr_value(&e, b"name")?.unwrap_or_default();
                    return decode_comp_filter(reader, name);
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"filter" => {
                break;
            }
            Event::Eof => return Err(CodecError::Eof),
            _ => {}
        }
        buf.clear();
    }
    Ok(CompFilter {
        name: "VCALENDAR".into(),
        time_range: None,
        prop_filters: vec![],
        comp_filters: vec![],
    })
}

fn decode_comp_filter(reader: &mut NsReader<&[u8]>, name: String) -> Result<CompFilter> {
    let mut time_range = None;
    let mut prop_filters = Vec::new();
    let mut comp_filters = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => {
                let local = local_name(e.name().as_ref()).to_vec();
                match &local[..] {
                    b"time-range" => {
                        let start = attr_value(&e, b"start")?
                            .map(|v| parse_ical_time(&v))
                            .transpose()?
                            .unwrap_or(i64::MIN);
                        let end = attr_value(&e, b"end")?
                            .map(|v| parse_ical_time(&v))
                            .transpose()?
                            .unwrap_or(i64::MAX);
                        time_range = Some(TimeRange { start, end });
                    }
                    b"prop-filter" => {
                        let pname = attr_value(&e, b"name")?.unwrap_or_default();
                        prop_filters.push(PropFilter {
                            name: pname,
                            text_match: None,
                        });
                    }
                    b"comp-filter" => {
                        let cname = attr_value(&e, b"name")?.unwrap_or_default();
                        if matches!(reader.read_event_into(&mut Vec::new())?, Event::Eof) {
                            return Err(CodecError::Eof);
                        }
                        comp_filters.push(decode_comp_filter(reader, cname)?);
                    }
                    _ => {}
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"comp-filter" => break,
            Event::Eof => return Err(CodecError::Eof),
            _ => {}
        }
        buf.clear();
    }
    Ok(CompFilter {
        name,
        time_range,
        prop_filters,
        comp_filters,
    })
}

fn decode_multiget(reader: &mut NsReader<&[u8]>) -> Result<MultigetRequest> {
    let mut props = PropertyRequest::AllProp;
    let mut hrefs = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let local = local_name(e.name().as_ref()).to_vec();
                match &local[..] {
                    b"prop" => props = PropertyRequest::Prop(read_prop_names(reader)?),
                    b"href" => hrefs.push(Href(read_text(reader)?)),
                    _ => {}
                }
            }
            Event::End(e)
                if local_name(e.name().as_ref()) == b"calendar-multiget"
                    || local_name(e.name().as_ref()) == b"addressbook-multiget" =>
            {
                break
            }
            Event::Eof => return Err(CodecError::Eof),
            _ => {}
        }
        buf.clear();
    }
    Ok(MultigetRequest { props, hrefs })
}

fn decode_sync_collection(reader: &mut NsReader<&[u8]>) -> Result<SyncCollectionRequest> {
    let mut sync_token = None;
    let mut limit = None;
    let mut props = PropertyRequest::AllProp;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let local = local_name(e.name().as_ref()).to_vec();
                match &local[..] {
                    b"sync-token" => {
                        let t = read_text(reader)?;
                        if !t.is_empty() {
                            sync_token = Some(t);
                        }
                    }
                    b"limit" => {
                        // <limit><nresults>N</nresults></limit>
                        let mut inner = Vec::new();
                        loop {
                            match reader.read_event_into(&mut inner)? {
                                Event::Start(ie) if local_name(ie.name().as_ref()) == b"nresults" => {
                                    let t = read_text(reader)?;
                                    limit = t.parse().ok();
                                }
                                Event::End(ie) if local_name(ie.name().as_ref()) == b"limit" => break,
                                Event::Eof => return Err(CodecError::Eof),
                                _ => {}
                            }
                            inner.clear();
                        }
                    }
                    b"prop" => props = PropertyRequest::Prop(read_prop_names(reader)?),
                    _ => {}
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"sync-collection" => break,
            Event::Eof => return Err(CodecError::Eof),
            _ => {}
        }
        buf.clear();
    }
    Ok(SyncCollectionRequest {
        sync_token,
        limit,
        props,
    })
}

fn decode_time_range_only(reader: &mut NsReader<&[u8]>) -> Result<TimeRange> {
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => {
                if local_name(e.name().as_ref()) == b"time-range" {
                    let start = attr_value(&e, b"start")?
                        .map(|v| parse_ical_time(&v))
                        .transpose()?
                        .unwrap_or(i64::MIN);
                    let end = attr_value(&e, b"end")?
                        .map(|v| parse_ical_time(&v))
                        .transpose()?
                        .unwrap_or(i64::MAX);
                    return Ok(TimeRange { start, end });
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"free-busy-query" => break,
            Event::Eof => return Err(CodecError::Eof),
            _ => {}
        }
        buf.clear();
    }
    Ok(TimeRange {
        start: i64::MIN,
        end: i64::MAX,
    })
}

/// Parses the `DAV:set` clauses of a `PROPPATCH`, `MKCALENDAR`, or extended
/// `MKCOL` body. `DAV:remove` clauses clear the matching field to `None`
/// only when explicitly recognized; everything else is ignored.
pub fn decode_property_update(body: &[u8]) -> Result<PropertyUpdate> {
    let mut update = PropertyUpdate::default();
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(update);
    }
    let mut reader = NsReader::from_reader(body);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let local = local_name(e.name().as_ref()).to_vec();
                if local == b"prop" {
                    read_property_values(&mut reader, &mut update)?;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(update)
}

fn read_property_values(reader: &mut NsReader<&[u8]>, update: &mut PropertyUpdate) -> Result<()> {
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let local = local_name(e.name().as_ref()).to_vec();
                if local == b"schedule-calendar-transp" {
                    update.schedule_transp_opaque = read_transp_child(reader)?;
                    continue;
                }
                let text = read_text(reader)?;
                match &local[..] {
                    b"displayname" => update.display_name = Some(text),
                    b"calendar-color" => update.calendar_color = Some(text),
                    b"calendar-description" => update.calendar_description = Some(text),
                    _ => {}
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"prop" => break,
            Event::Eof => return Err(CodecError::Eof),
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

/// Reads the single `C:opaque`/`C:transparent` child of a
/// `schedule-calendar-transp` element.
fn read_transp_child(reader: &mut NsReader<&[u8]>) -> Result<Option<bool>> {
    let mut buf = Vec::new();
    let mut result = None;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => {
                match &local_name(e.name().as_ref())[..] {
                    b"opaque" => result = Some(true),
                    b"transparent" => result = Some(false),
                    _ => {}
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"schedule-calendar-transp" => break,
            Event::Eof => return Err(CodecError::Eof),
            _ => {}
        }
        buf.clear();
    }
    Ok(result)
}

fn attr_value(e: &BytesStart, name: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn read_text(reader: &mut NsReader<&[u8]>) -> Result<String> {
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut depth = 0i32;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(t) => out.push_str(&t.unescape()?),
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            Event::Eof => return Err(CodecError::Eof),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// CalDAV time-range attribute values are iCalendar `DATE-TIME` in UTC
/// (`YYYYMMDDTHHMMSSZ`). No other format appears in practice.
fn parse_ical_time(s: &str) -> Result<i64> {
    chrono::NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%SZ")
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|_| CodecError::BadDate(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_propfind_is_allprop() {
        assert_eq!(decode_propfind(b"").unwrap(), PropertyRequest::AllProp);
    }

    #[test]
    fn propfind_named_props() {
        let body = br#"<?xml version="1.0"?>
            <D:propfind xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
              <D:prop><D:displayname/><C:calendar-home-set/></D:prop>
            </D:propfind>"#;
        let req = decode_propfind(body).unwrap();
        match req {
            PropertyRequest::Prop(names) => {
                assert_eq!(names, vec![PropertyName::DisplayName, PropertyName::CalendarHomeSet]);
            }
            _ => panic!("expected Prop"),
        }
    }

    #[test]
    fn calendar_query_time_range() {
        let body = br#"<?xml version="1.0"?>
            <C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
              <D:prop><C:calendar-data/></D:prop>
              <C:filter>
                <C:comp-filter name="VCALENDAR">
                  <C:comp-filter name="VEVENT">
                    <C:time-range start="20260101T000000Z" end="20260201T000000Z"/>
                  </C:comp-filter>
                </C:comp-filter>
              </C:filter>
            </C:calendar-query>"#;
        let req = decode_report(body).unwrap();
        match req {
            ReportRequest::CalendarQuery(q) => {
                assert_eq!(q.filter.name, "VCALENDAR");
                let vevent = &q.filter.comp_filters[0];
                assert_eq!(vevent.name, "VEVENT");
                assert!(vevent.time_range.is_some());
            }
            _ => panic!("expected CalendarQuery"),
        }
    }

    #[test]
    fn sync_collection_round_trip_token() {
        let body = br#"<?xml version="1.0"?>
            <D:sync-collection xmlns:D="DAV:">
              <D:sync-token>seq:4</D:sync-token>
              <D:sync-level>1</D:sync-level>
              <D:prop><D:getetag/></D:prop>
            </D:sync-collection>"#;
        let req = decode_report(body).unwrap();
        match req {
            ReportRequest::SyncCollection(s) => {
                assert_eq!(s.sync_token.as_deref(), Some("seq:4"));
            }
            _ => panic!("expected SyncCollection"),
        }
    }
}
