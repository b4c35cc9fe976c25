use dav_proto::types::{MultistatusResponse, PropertyName, PropertyValue, Propstat};
use directory::acl::{PRIV_READ, PRIV_UNBIND, PRIV_WRITE_CONTENT, PRIV_WRITE_PROPS};
use directory::Principal;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{HeaderMap, Response, StatusCode};
use store::{Collection, CollectionKind, Store, Transparency};

use crate::error::{DavError, HttpResponse};
use crate::resource::Resource;
use crate::state::AppState;

fn if_match(headers: &HeaderMap) -> Option<String> {
    headers.get(hyper::header::IF_MATCH).and_then(|v| v.to_str().ok()).map(|s| s.trim_matches('"').to_string())
}

fn if_none_match(headers: &HeaderMap) -> Option<String> {
    headers
        .get(hyper::header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim_matches('"').to_string())
}

fn if_schedule_tag_match(headers: &HeaderMap) -> Option<String> {
    headers
        .get("if-schedule-tag-match")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim_matches('"').to_string())
}

async fn require_privilege(
    state: &AppState,
    principal: &Principal,
    owner: &str,
    uri: &str,
    required: u8,
) -> Result<(), DavError> {
    let key = format!("{}/{}", owner, uri);
    let allowed = state.acl.can(&principal.user_id, owner, &key, required).await?;
    if allowed {
        Ok(())
    } else {
        Err(DavError::Forbidden)
    }
}

pub async fn get(
    state: &AppState,
    principal: &Principal,
    resource: &Resource,
    headers: &HeaderMap,
) -> Result<HttpResponse, DavError> {
    let (owner, uri, object_uid, kind) = match resource {
        Resource::CalendarObject { owner, uri, object_uid } => (owner, uri, object_uid, CollectionKind::Calendar),
        Resource::AddressbookObject { owner, uri, object_uid } => {
            (owner, uri, object_uid, CollectionKind::Addressbook)
        }
        _ => return Err(DavError::MethodNotAllowed),
    };

    require_privilege(state, principal, owner, uri, PRIV_READ).await?;
    let collection = state.store.get_collection(owner, uri).await?;
    let object = state.store.get_object(collection.id, object_uid).await?;

    if if_none_match(headers).as_deref() == Some(object.etag.as_str()) {
        return Ok(Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header("etag", format!("\"{}\"", object.etag))
            .body(Full::new(Bytes::new()))
            .unwrap());
    }

    let content_type = match kind {
        CollectionKind::Calendar => "text/calendar; charset=utf-8",
        _ => "text/vcard; charset=utf-8",
    };
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header("content-type", content_type)
        .header("etag", format!("\"{}\"", object.etag));
    if let Some(tag) = &object.schedule_tag {
        builder = builder.header("schedule-tag", format!("\"{}\"", tag));
    }
    Ok(builder.body(Full::new(Bytes::from(object.raw))).unwrap())
}

pub async fn put(
    state: &AppState,
    principal: &Principal,
    resource: &Resource,
    headers: &HeaderMap,
    body: Vec<u8>,
) -> Result<HttpResponse, DavError> {
    let (owner, uri, object_uid, kind) = match resource {
        Resource::CalendarObject { owner, uri, object_uid } => (owner, uri, object_uid, CollectionKind::Calendar),
        Resource::AddressbookObject { owner, uri, object_uid } => {
            (owner, uri, object_uid, CollectionKind::Addressbook)
        }
        _ => return Err(DavError::MethodNotAllowed),
    };

    let limit = match kind {
        CollectionKind::Calendar => state.config.max_ics_bytes,
        _ => state.config.max_vcf_bytes,
    };
    if body.len() > limit {
        return Err(DavError::PayloadTooLarge);
    }

    require_privilege(state, principal, owner, uri, PRIV_WRITE_CONTENT).await?;
    let collection = state.store.get_collection(owner, uri).await?;

    let raw = String::from_utf8(body).map_err(|e| DavError::Malformed(e.to_string()))?;
    let (object_kind, object_start, object_end, before) = match kind {
        CollectionKind::Calendar => {
            let meta = ical::extract(&raw)?;
            let object_kind = match meta.kind {
                Some(ical::ComponentKind::VEvent) => store::ObjectKind::VEvent,
                Some(ical::ComponentKind::VTodo) => store::ObjectKind::VTodo,
                Some(ical::ComponentKind::VJournal) => store::ObjectKind::VJournal,
                None => return Err(DavError::Malformed("no VEVENT/VTODO/VJOURNAL component".into())),
            };
            if meta.uid.as_deref() != Some(object_uid.as_str()) {
                return Err(DavError::Malformed("UID does not match request URI".into()));
            }
            let before = state.store.get_object(collection.id, object_uid).await.ok();
            (object_kind, meta.start, meta.end, before)
        }
        _ => {
            let uid = ical::extract_vcard_uid(&raw);
            if uid.as_deref() != Some(object_uid.as_str()) {
                return Err(DavError::Malformed("UID does not match request URI".into()));
            }
            (store::ObjectKind::VCard, None, None, None)
        }
    };

    if let Some(expected_tag) = if_schedule_tag_match(headers) {
        let current_tag = before.as_ref().and_then(|b| b.schedule_tag.as_deref());
        if current_tag != Some(expected_tag.as_str()) {
            return Err(DavError::PreconditionFailed("schedule-tag mismatch".into()));
        }
    }

    let expected_etag = if_match(headers);
    let must_not_exist = if_none_match(headers).as_deref() == Some("*");

    let (object, _ctag) = state
        .store
        .put_object(
            collection.id,
            object_uid,
            object_kind,
            &raw,
            object_start,
            object_end,
            expected_etag.as_deref(),
            must_not_exist,
        )
        .await?;

    let schedule_tag = if kind == CollectionKind::Calendar {
        crate::scheduling::on_object_written(state, principal, before.as_ref(), &object).await
    } else {
        None
    };

    let status = if before.is_some() { StatusCode::NO_CONTENT } else { StatusCode::CREATED };
    let mut builder = Response::builder().status(status).header("etag", format!("\"{}\"", object.etag));
    if let Some(tag) = schedule_tag {
        builder = builder.header("schedule-tag", format!("\"{}\"", tag));
    }
    Ok(builder.body(Full::new(Bytes::new())).unwrap())
}

pub async fn delete(
    state: &AppState,
    principal: &Principal,
    resource: &Resource,
    headers: &HeaderMap,
) -> Result<HttpResponse, DavError> {
    match resource {
        Resource::CalendarObject { owner, uri, object_uid } | Resource::AddressbookObject { owner, uri, object_uid } => {
            require_privilege(state, principal, owner, uri, PRIV_UNBIND).await?;
            let collection = state.store.get_collection(owner, uri).await?;
            let expected_etag = if_match(headers);

            if let Ok(before) = state.store.get_object(collection.id, object_uid).await {
                if collection.kind == CollectionKind::Calendar {
                    crate::scheduling::on_object_deleted(state, principal, &before).await;
                }
            }
            state.store.delete_object(collection.id, object_uid, expected_etag.as_deref()).await?;
            Ok(Response::builder().status(StatusCode::NO_CONTENT).body(Full::new(Bytes::new())).unwrap())
        }
        Resource::Calendar { owner, uri } | Resource::Addressbook { owner, uri } => {
            require_privilege(state, principal, owner, uri, PRIV_UNBIND).await?;
            state.store.delete_collection(owner, uri).await?;
            Ok(Response::builder().status(StatusCode::NO_CONTENT).body(Full::new(Bytes::new())).unwrap())
        }
        _ => Err(DavError::MethodNotAllowed),
    }
}

pub async fn mkcalendar(
    state: &AppState,
    principal: &Principal,
    resource: &Resource,
    body: &[u8],
) -> Result<HttpResponse, DavError> {
    mkcollection(state, principal, resource, body, CollectionKind::Calendar).await
}

pub async fn mkcol(
    state: &AppState,
    principal: &Principal,
    resource: &Resource,
    body: &[u8],
) -> Result<HttpResponse, DavError> {
    mkcollection(state, principal, resource, body, CollectionKind::Addressbook).await
}

async fn mkcollection(
    state: &AppState,
    principal: &Principal,
    resource: &Resource,
    body: &[u8],
    kind: CollectionKind,
) -> Result<HttpResponse, DavError> {
    let (owner, uri) = match resource {
        Resource::Calendar { owner, uri } | Resource::Addressbook { owner, uri } => (owner, uri),
        _ => return Err(DavError::MethodNotAllowed),
    };

    if principal.user_id != *owner {
        return Err(DavError::Forbidden);
    }
    if state.store.get_collection(owner, uri).await.is_ok() {
        return Err(DavError::MethodNotAllowed);
    }

    let update = dav_proto::decode::decode_property_update(body)?;
    let display_name = update.display_name.clone().unwrap_or_else(|| uri.clone());
    let collection = state.store.create_collection(owner, uri, kind, &display_name).await?;

    if update.calendar_color.is_some() || update.calendar_description.is_some() {
        state
            .store
            .set_collection_properties(
                collection.id,
                None,
                update.calendar_description.as_deref(),
                update.calendar_color.as_deref(),
            )
            .await?;
    }
    if let Some(opaque) = update.schedule_transp_opaque {
        let transparency = if opaque { Transparency::Opaque } else { Transparency::Transparent };
        state.store.set_transparency(collection.id, transparency).await?;
    }

    Ok(Response::builder().status(StatusCode::CREATED).body(Full::new(Bytes::new())).unwrap())
}

pub async fn proppatch(
    state: &AppState,
    principal: &Principal,
    resource: &Resource,
    body: &[u8],
) -> Result<HttpResponse, DavError> {
    let (owner, uri) = match resource {
        Resource::Calendar { owner, uri } | Resource::Addressbook { owner, uri } => (owner, uri),
        _ => return Err(DavError::MethodNotAllowed),
    };
    require_privilege(state, principal, owner, uri, PRIV_WRITE_PROPS).await?;

    let collection = state.store.get_collection(owner, uri).await?;
    let update = dav_proto::decode::decode_property_update(body)?;

    let mut names = Vec::new();
    if update.display_name.is_some() {
        names.push(PropertyName::DisplayName);
    }
    if update.calendar_color.is_some() {
        names.push(PropertyName::CalendarColor);
    }
    if update.calendar_description.is_some() {
        names.push(PropertyName::CalendarDescription);
    }

    let updated: Collection = state
        .store
        .set_collection_properties(
            collection.id,
            update.display_name.as_deref(),
            update.calendar_description.as_deref(),
            update.calendar_color.as_deref(),
        )
        .await?;
    if let Some(opaque) = update.schedule_transp_opaque {
        let transparency = if opaque { Transparency::Opaque } else { Transparency::Transparent };
        state.store.set_transparency(collection.id, transparency).await?;
    }

    let properties: Vec<PropertyValue> = names
        .into_iter()
        .filter_map(|name| match name {
            PropertyName::DisplayName => Some(PropertyValue::DisplayName(updated.display_name.clone())),
            PropertyName::CalendarColor => updated.color.clone().map(PropertyValue::CalendarColor),
            PropertyName::CalendarDescription => Some(PropertyValue::CalendarDescription(updated.description.clone())),
            _ => None,
        })
        .collect();

    let href = dav_proto::types::Href(format!("{}/calendars/{}/{}/", state.config.base_path, owner, uri));
    let response = MultistatusResponse { href, propstats: vec![Propstat::found(properties)], status: None };
    let xml = dav_proto::encode::encode_multistatus(&[response], None)?;
    Ok(Response::builder()
        .status(StatusCode::MULTI_STATUS)
        .header("content-type", "application/xml; charset=utf-8")
        .body(Full::new(Bytes::from(xml)))
        .unwrap())
}
