use dav_proto::types::{
    Href, MultistatusResponse, PropertyName, PropertyRequest, Propstat, PropertyValue, ReportRequest,
    TimeRange,
};
use directory::{AclResolver, Principal};
use store::{Collection, CollectionKind, ObjectQuery, Store, Transparency};

use crate::error::DavError;
use crate::resource::Resource;
use crate::state::AppState;

fn href_of(state: &AppState, kind: CollectionKind, owner: &str, uri: &str, object_uid: &str) -> Href {
    let (collection_segment, ext) = match kind {
        CollectionKind::Addressbook => ("addressbooks", "vcf"),
        _ => ("calendars", "ics"),
    };
    Href(format!("{}/{}/{}/{}/{}.{}", state.config.base_path, collection_segment, owner, uri, object_uid, ext))
}

fn object_props(
    object: &store::Object,
    kind: CollectionKind,
    names: &[PropertyName],
) -> (Vec<PropertyValue>, Vec<PropertyName>) {
    let mut found = Vec::new();
    let mut missing = Vec::new();
    for name in names {
        match name {
            PropertyName::GetETag => found.push(PropertyValue::GetETag(object.etag.clone())),
            PropertyName::CalendarData if kind == CollectionKind::Calendar => {
                found.push(PropertyValue::CalendarData(object.raw.clone()))
            }
            PropertyName::AddressData if kind == CollectionKind::Addressbook => {
                found.push(PropertyValue::AddressData(object.raw.clone()))
            }
            PropertyName::ScheduleTag => {
                if let Some(tag) = &object.schedule_tag {
                    found.push(PropertyValue::ScheduleTag(tag.clone()));
                } else {
                    missing.push(*name);
                }
            }
            other => missing.push(*other),
        }
    }
    (found, missing)
}

fn requested_object_props(props: &PropertyRequest, kind: CollectionKind) -> Vec<PropertyName> {
    match props {
        PropertyRequest::AllProp | PropertyRequest::PropName => {
            let data_prop = if kind == CollectionKind::Addressbook {
                PropertyName::AddressData
            } else {
                PropertyName::CalendarData
            };
            vec![PropertyName::GetETag, data_prop]
        }
        PropertyRequest::Prop(names) => names.clone(),
    }
}

pub async fn handle(
    state: &AppState,
    principal: &Principal,
    resource: &Resource,
    body: &[u8],
) -> Result<Vec<u8>, DavError> {
    let report = dav_proto::decode::decode_report(body)?;
    match report {
        ReportRequest::CalendarQuery(query) => calendar_query(state, principal, resource, &query).await,
        ReportRequest::CalendarMultiget(req) => {
            multiget(state, principal, resource, &req, CollectionKind::Calendar).await
        }
        ReportRequest::AddressbookMultiget(req) => {
            multiget(state, principal, resource, &req, CollectionKind::Addressbook).await
        }
        ReportRequest::SyncCollection(req) => sync_collection(state, principal, resource, &req).await,
        ReportRequest::FreeBusyQuery(range) => free_busy(state, principal, range).await,
    }
}

fn resource_collection_key<'a>(resource: &'a Resource) -> Result<(&'a str, &'a str), DavError> {
    match resource {
        Resource::Calendar { owner, uri } => Ok((owner, uri)),
        Resource::SharedCalendar { real_owner, uri } => Ok((real_owner, uri)),
        Resource::Addressbook { owner, uri } => Ok((owner, uri)),
        _ => Err(DavError::MethodNotAllowed),
    }
}

async fn require_read(state: &AppState, principal: &Principal, owner: &str, uri: &str) -> Result<(), DavError> {
    let key = format!("{}/{}", owner, uri);
    let allowed = state
        .acl
        .can(&principal.user_id, owner, &key, directory::acl::PRIV_READ)
        .await
        .map_err(DavError::from)?;
    if allowed {
        Ok(())
    } else {
        Err(DavError::Forbidden)
    }
}

async fn calendar_query(
    state: &AppState,
    principal: &Principal,
    resource: &Resource,
    query: &dav_proto::types::CalendarQuery,
) -> Result<Vec<u8>, DavError> {
    let (owner, uri) = resource_collection_key(resource)?;
    require_read(state, principal, owner, uri).await?;
    let collection = state.store.get_collection(owner, uri).await?;

    let inner = query.filter.comp_filters.first();
    let time_range = inner.and_then(|cf| cf.time_range).or(query.filter.time_range);
    let kind = inner.and_then(|cf| component_kind(&cf.name));
    let objects = state
        .store
        .list_objects(
            collection.id,
            &ObjectQuery { kind, time_range: time_range.map(|r| (r.start, r.end)) },
        )
        .await?;

    let names = requested_object_props(&query.props, CollectionKind::Calendar);
    let responses: Vec<MultistatusResponse> = objects
        .iter()
        .filter(|o| ical::filter::matches(&object_meta(o), &query.filter))
        .map(|o| {
            let (found, missing) = object_props(o, CollectionKind::Calendar, &names);
            let mut propstats = Vec::new();
            if !found.is_empty() {
                propstats.push(Propstat::found(found));
            }
            if !missing.is_empty() {
                propstats.push(Propstat::not_found(missing));
            }
            MultistatusResponse {
                href: href_of(state, CollectionKind::Calendar, owner, uri, &o.uid),
                propstats,
                status: None,
            }
        })
        .collect();

    Ok(dav_proto::encode::encode_multistatus(&responses, None)?)
}

fn object_meta(object: &store::Object) -> ical::ObjectMeta {
    ical::extract(&object.raw).unwrap_or_default()
}

fn component_kind(name: &str) -> Option<store::ObjectKind> {
    match name {
        "VEVENT" => Some(store::ObjectKind::VEvent),
        "VTODO" => Some(store::ObjectKind::VTodo),
        "VJOURNAL" => Some(store::ObjectKind::VJournal),
        _ => None,
    }
}

async fn multiget(
    state: &AppState,
    principal: &Principal,
    resource: &Resource,
    req: &dav_proto::types::MultigetRequest,
    kind: CollectionKind,
) -> Result<Vec<u8>, DavError> {
    let (owner, uri) = resource_collection_key(resource)?;
    require_read(state, principal, owner, uri).await?;
    let collection = state.store.get_collection(owner, uri).await?;
    let names = requested_object_props(&req.props, kind);

    let mut responses = Vec::new();
    for href in &req.hrefs {
        let uid = uid_from_href(&href.0);
        match state.store.get_object(collection.id, &uid).await {
            Ok(object) => {
                let (found, missing) = object_props(&object, kind, &names);
                let mut propstats = Vec::new();
                if !found.is_empty() {
                    propstats.push(Propstat::found(found));
                }
                if !missing.is_empty() {
                    propstats.push(Propstat::not_found(missing));
                }
                responses.push(MultistatusResponse { href: href.clone(), propstats, status: None });
            }
            Err(_) => {
                responses.push(MultistatusResponse { href: href.clone(), propstats: vec![], status: Some(404) });
            }
        }
    }
    Ok(dav_proto::encode::encode_multistatus(&responses, None)?)
}

fn uid_from_href(href: &str) -> String {
    href.rsplit('/')
        .next()
        .unwrap_or(href)
        .trim_end_matches(".ics")
        .trim_end_matches(".vcf")
        .to_string()
}

async fn sync_collection(
    state: &AppState,
    principal: &Principal,
    resource: &Resource,
    req: &dav_proto::types::SyncCollectionRequest,
) -> Result<Vec<u8>, DavError> {
    let (owner, uri) = resource_collection_key(resource)?;
    require_read(state, principal, owner, uri).await?;
    let collection = state.store.get_collection(owner, uri).await?;
    let kind = match resource {
        Resource::Addressbook { .. } => CollectionKind::Addressbook,
        _ => CollectionKind::Calendar,
    };

    let since_seq = match &req.sync_token {
        Some(token) => store::seq_of_sync_token(token).ok_or(DavError::InvalidSyncToken)?,
        None => 0,
    };

    let batch = state.store.list_changes_since(collection.id, since_seq, req.limit).await?;
    let names = requested_object_props(&req.props, kind);

    let mut responses = Vec::new();
    for change in &batch.changes {
        let href = href_of(state, kind, owner, uri, &change.uid);
        if change.deleted {
            responses.push(MultistatusResponse { href, propstats: vec![], status: Some(404) });
            continue;
        }
        match state.store.get_object(collection.id, &change.uid).await {
            Ok(object) => {
                let (found, _) = object_props(&object, kind, &names);
                responses.push(MultistatusResponse { href, propstats: vec![Propstat::found(found)], status: None });
            }
            Err(_) => responses.push(MultistatusResponse { href, propstats: vec![], status: Some(404) }),
        }
    }

    let new_token = store::sync_token_of(batch.new_seq);
    Ok(dav_proto::encode::encode_multistatus(&responses, Some(&new_token))?)
}

async fn free_busy(state: &AppState, principal: &Principal, range: TimeRange) -> Result<Vec<u8>, DavError> {
    let opaque = state.store.collections_with_transparency(Transparency::Opaque).await?;
    let mut busy = Vec::new();

    for collection in readable_by(&state.acl, principal, opaque).await {
        let objects = state
            .store
            .list_objects(
                collection.id,
                &ObjectQuery { kind: Some(store::ObjectKind::VEvent), time_range: Some((range.start, range.end)) },
            )
            .await?;
        for object in objects {
            if let (Some(start), Some(end)) = (object.start, object.end) {
                busy.push((start, end));
            }
        }
    }

    let now = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
    let ics = dav_proto::encode::encode_free_busy(&busy, range, &now, &state.config.prodid);
    Ok(ics.into_bytes())
}

async fn readable_by(acl: &AclResolver, principal: &Principal, collections: Vec<Collection>) -> Vec<Collection> {
    let mut out = Vec::new();
    for collection in collections {
        let key = format!("{}/{}", collection.owner, collection.uri);
        if acl
            .can(&principal.user_id, &collection.owner, &key, directory::acl::PRIV_READ)
            .await
            .unwrap_or(false)
        {
            out.push(collection);
        }
    }
    out
}
