//! RFC 4791 §9.9 time-range matching, evaluated against the pre-extracted
//! [`ObjectMeta`] rather than re-walking the raw component tree on every
//! query: the store keeps `start`/`end` indexed precisely so this match can
//! stay cheap.

use dav_proto::types::CompFilter;

use crate::model::{ComponentKind, ObjectMeta};

/// Matches a stored object against a `calendar-query` filter tree. The
/// root `comp-filter` always names `VCALENDAR`; the server only supports
/// one level of nesting below it (a single VEVENT/VTODO/VJOURNAL filter),
/// which is what every real CalDAV client sends.
pub fn matches(meta: &ObjectMeta, filter: &CompFilter) -> bool {
    if filter.name != "VCALENDAR" {
        return false;
    }
    if filter.comp_filters.is_empty() {
        return true;
    }
    filter.comp_filters.iter().any(|inner| matches_component(meta, inner))
}

fn matches_component(meta: &ObjectMeta, filter: &CompFilter) -> bool {
    let kind = match meta.kind {
        Some(k) => k,
        None => return false,
    };
    if kind.as_str() != filter.name {
        return false;
    }
    if let Some(range) = &filter.time_range {
        if !is_in_time_range(kind, meta, range) {
            return false;
        }
    }
    for pf in &filter.prop_filters {
        let value = match pf.name.as_str() {
            "SUMMARY" => meta.summary.as_deref(),
            "LOCATION" => meta.location.as_deref(),
            "DESCRIPTION" => meta.description.as_deref(),
            _ => None,
        };
        match (&pf.text_match, value) {
            (Some(needle), Some(hay)) if hay.contains(needle.as_str()) => {}
            (None, Some(_)) => {}
            _ => return false,
        }
    }
    filter
        .comp_filters
        .iter()
        .all(|inner| matches_component(meta, inner))
}

/// RFC 4791 §9.9's decision table, specialized to VEVENT/VTODO/VJOURNAL
/// (VALARM/VFREEBUSY time-range filtering is not evaluated server-side:
/// clients filter those locally after fetching calendar-data).
fn is_in_time_range(kind: ComponentKind, meta: &ObjectMeta, range: &dav_proto::types::TimeRange) -> bool {
    match kind {
        ComponentKind::VEvent => match (meta.start, meta.end) {
            (Some(start), Some(end)) => range.start < end && range.end > start,
            (Some(start), None) => range.start <= start && range.end > start,
            (None, _) => false,
        },
        ComponentKind::VTodo => match (meta.start, meta.end) {
            (Some(start), Some(end)) => range.start <= end && range.end > start,
            (Some(start), None) => range.start <= start && range.end > start,
            (None, Some(due)) => range.start < due && range.end >= due,
            (None, None) => true,
        },
        ComponentKind::VJournal => match meta.start {
            Some(start) => range.start <= start && range.end > start,
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dav_proto::types::TimeRange;

    fn meta_with(start: i64, end: i64) -> ObjectMeta {
        ObjectMeta {
            uid: Some("x".into()),
            kind: Some(ComponentKind::VEvent),
            start: Some(start),
            end: Some(end),
            ..Default::default()
        }
    }

    #[test]
    fn event_overlapping_range_matches() {
        let meta = meta_with(1000, 2000);
        let filter = CompFilter {
            name: "VCALENDAR".into(),
            time_range: None,
            prop_filters: vec![],
            comp_filters: vec![CompFilter {
                name: "VEVENT".into(),
                time_range: Some(TimeRange { start: 1500, end: 2500 }),
                prop_filters: vec![],
                comp_filters: vec![],
            }],
        };
        assert!(matches(&meta, &filter));
    }

    #[test]
    fn event_outside_range_does_not_match() {
        let meta = meta_with(1000, 2000);
        let filter = CompFilter {
            name: "VCALENDAR".into(),
            time_range: None,
            prop_filters: vec![],
            comp_filters: vec![CompFilter {
                name: "VEVENT".into(),
                time_range: Some(TimeRange { start: 3000, end: 4000 }),
                prop_filters: vec![],
                comp_filters: vec![],
            }],
        };
        assert!(!matches(&meta, &filter));
    }
}
