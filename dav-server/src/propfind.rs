use dav_proto::types::{
    Ace, Href, MultistatusResponse, PropertyName, PropertyRequest, Propstat, PropertyValue, Privileges,
    ResourceType,
};
use directory::Principal;
use store::{Collection, CollectionKind};

use crate::error::DavError;
use crate::resource::Resource;
use crate::state::AppState;

const DEFAULT_PROPS: &[PropertyName] = &[
    PropertyName::ResourceType,
    PropertyName::DisplayName,
    PropertyName::GetETag,
    PropertyName::GetLastModified,
    PropertyName::GetContentType,
];

fn requested_names(props: &PropertyRequest, defaults: &[PropertyName]) -> Vec<PropertyName> {
    match props {
        PropertyRequest::AllProp | PropertyRequest::PropName => defaults.to_vec(),
        PropertyRequest::Prop(names) => names.clone(),
    }
}

fn href(state: &AppState, path: &str) -> Href {
    Href(format!("{}{}", state.config.base_path, path))
}

fn privileges_to_wire(p: u8) -> Privileges {
    Privileges(p)
}

/// Builds one multistatus entry for an arbitrary set of requested
/// properties against a closure that resolves each one, splitting the
/// result into a 200 propstat and a 404 propstat per RFC 4918 §9.1.
fn build_response(
    href: Href,
    names: &[PropertyName],
    mut resolve: impl FnMut(PropertyName) -> Option<PropertyValue>,
) -> MultistatusResponse {
    let mut found = Vec::new();
    let mut missing = Vec::new();
    for name in names {
        match resolve(*name) {
            Some(value) => found.push(value),
            None => missing.push(*name),
        }
    }
    let mut propstats = Vec::new();
    if !found.is_empty() {
        propstats.push(Propstat::found(found));
    }
    if !missing.is_empty() {
        propstats.push(Propstat::not_found(missing));
    }
    MultistatusResponse { href, propstats, status: None }
}

pub async fn handle(
    state: &AppState,
    principal: &Principal,
    resource: &Resource,
    depth: dav_proto::types::Depth,
    body: &[u8],
) -> Result<Vec<u8>, DavError> {
    let props = if body.is_empty() {
        PropertyRequest::AllProp
    } else {
        dav_proto::decode::decode_propfind(body)?
    };

    let responses = match resource {
        Resource::Root => vec![root_response(state, &props)],
        Resource::Principal { user } => vec![principal_response(state, user, &props)],
        Resource::CalendarHome { owner } => calendar_home(state, principal, owner, &props, depth).await?,
        Resource::AddressbookHome { owner } => addressbook_home(state, principal, owner, &props, depth).await?,
        Resource::Calendar { owner, uri } => {
            let path = format!("/calendars/{}/{}/", owner, uri);
            vec![collection_response(state, principal, owner, uri, &path, CollectionKind::Calendar, &props).await?]
        }
        Resource::SharedCalendar { real_owner, uri } => {
            let path = format!("/calendars/{}/shared/{}/{}/", principal.user_id, real_owner, uri);
            vec![collection_response(state, principal, real_owner, uri, &path, CollectionKind::Calendar, &props).await?]
        }
        Resource::Addressbook { owner, uri } => {
            let path = format!("/addressbooks/{}/{}/", owner, uri);
            vec![collection_response(state, principal, owner, uri, &path, CollectionKind::Addressbook, &props).await?]
        }
        Resource::CalendarObject { owner, uri, object_uid } => {
            vec![object_response(state, principal, owner, uri, object_uid, CollectionKind::Calendar, &props).await?]
        }
        Resource::AddressbookObject { owner, uri, object_uid } => {
            vec![object_response(state, principal, owner, uri, object_uid, CollectionKind::Addressbook, &props).await?]
        }
        Resource::ScheduleInbox { owner } | Resource::ScheduleOutbox { owner } => {
            vec![schedule_collection_response(state, owner, resource, &props)]
        }
    };

    Ok(dav_proto::encode::encode_multistatus(&responses, None)?)
}

fn root_response(state: &AppState, props: &PropertyRequest) -> MultistatusResponse {
    let names = requested_names(
        props,
        &[PropertyName::ResourceType, PropertyName::CurrentUserPrincipal],
    );
    build_response(href(state, "/"), &names, |name| match name {
        PropertyName::ResourceType => Some(PropertyValue::ResourceType(vec![ResourceType::Collection])),
        PropertyName::CurrentUserPrincipal => {
            Some(PropertyValue::CurrentUserPrincipal(href(state, "/principals/users/me")))
        }
        _ => None,
    })
}

fn principal_response(state: &AppState, user: &str, props: &PropertyRequest) -> MultistatusResponse {
    let names = requested_names(
        props,
        &[
            PropertyName::DisplayName,
            PropertyName::PrincipalUrl,
            PropertyName::CalendarHomeSet,
            PropertyName::AddressbookHomeSet,
        ],
    );
    build_response(
        href(state, &format!("/principals/users/{}", user)),
        &names,
        |name| match name {
            PropertyName::DisplayName => Some(PropertyValue::DisplayName(user.to_string())),
            PropertyName::PrincipalUrl => {
                Some(PropertyValue::PrincipalUrl(href(state, &format!("/principals/users/{}", user))))
            }
            PropertyName::CurrentUserPrincipal => {
                Some(PropertyValue::CurrentUserPrincipal(href(state, &format!("/principals/users/{}", user))))
            }
            PropertyName::CalendarHomeSet => {
                Some(PropertyValue::CalendarHomeSet(href(state, &format!("/calendars/{}/", user))))
            }
            PropertyName::AddressbookHomeSet => {
                Some(PropertyValue::AddressbookHomeSet(href(state, &format!("/addressbooks/{}/", user))))
            }
            _ => None,
        },
    )
}

async fn calendar_home(
    state: &AppState,
    principal: &Principal,
    owner: &str,
    props: &PropertyRequest,
    depth: dav_proto::types::Depth,
) -> Result<Vec<MultistatusResponse>, DavError> {
    let names = requested_names(props, &[PropertyName::ResourceType, PropertyName::DisplayName]);
    let mut responses = vec![build_response(
        href(state, &format!("/calendars/{}/", owner)),
        &names,
        |name| match name {
            PropertyName::ResourceType => Some(PropertyValue::ResourceType(vec![ResourceType::Collection])),
            PropertyName::DisplayName => Some(PropertyValue::DisplayName(format!("{}'s calendars", owner))),
            _ => None,
        },
    )];

    if matches!(depth, dav_proto::types::Depth::One | dav_proto::types::Depth::Infinity) {
        for collection in state.store.list_collections(owner, CollectionKind::Calendar).await? {
            let path = format!("/calendars/{}/{}/", owner, collection.uri);
            responses.push(collection_response(state, principal, owner, &collection.uri, &path, CollectionKind::Calendar, props).await?);
        }
        if owner == principal.user_id {
            for (real_owner, uri) in state.directory.shared_calendars(owner).await.map_err(crate::error::DavError::from)? {
                let path = format!("/calendars/{}/shared/{}/{}/", owner, real_owner, uri);
                match collection_response(state, principal, &real_owner, &uri, &path, CollectionKind::Calendar, props).await {
                    Ok(response) => responses.push(response),
                    Err(DavError::Forbidden) => continue,
                    Err(err) => return Err(err),
                }
            }
        }
    }
    Ok(responses)
}

async fn addressbook_home(
    state: &AppState,
    principal: &Principal,
    owner: &str,
    props: &PropertyRequest,
    depth: dav_proto::types::Depth,
) -> Result<Vec<MultistatusResponse>, DavError> {
    let names = requested_names(props, &[PropertyName::ResourceType, PropertyName::DisplayName]);
    let mut responses = vec![build_response(
        href(state, &format!("/addressbooks/{}/", owner)),
        &names,
        |name| match name {
            PropertyName::ResourceType => Some(PropertyValue::ResourceType(vec![ResourceType::Collection])),
            PropertyName::DisplayName => Some(PropertyValue::DisplayName(format!("{}'s address books", owner))),
            _ => None,
        },
    )];

    if matches!(depth, dav_proto::types::Depth::One | dav_proto::types::Depth::Infinity) {
        for collection in state.store.list_collections(owner, CollectionKind::Addressbook).await? {
            let path = format!("/addressbooks/{}/{}/", owner, collection.uri);
            responses.push(collection_response(state, principal, owner, &collection.uri, &path, CollectionKind::Addressbook, props).await?);
        }
    }
    Ok(responses)
}

async fn collection_response(
    state: &AppState,
    principal: &Principal,
    owner: &str,
    uri: &str,
    path: &str,
    kind: CollectionKind,
    props: &PropertyRequest,
) -> Result<MultistatusResponse, DavError> {
    let collection = state.store.get_collection(owner, uri).await?;
    let grant = state
        .acl
        .effective_privileges(&principal.user_id, owner, &collection_acl_key(owner, &collection))
        .await
        .map_err(crate::error::DavError::from)?;
    if grant & directory::acl::PRIV_READ == 0 {
        return Err(DavError::Forbidden);
    }

    let names = requested_names(
        props,
        &[
            PropertyName::ResourceType,
            PropertyName::DisplayName,
            PropertyName::GetCTag,
            PropertyName::SyncToken,
            PropertyName::Owner,
        ],
    );
    let state_ref = state;
    let collection_ref = &collection;
    let resolve_type = if kind == CollectionKind::Calendar { ResourceType::Calendar } else { ResourceType::Addressbook };
    Ok(build_response(href(state, path), &names, move |name| match name {
        PropertyName::ResourceType => Some(PropertyValue::ResourceType(vec![ResourceType::Collection, resolve_type.clone()])),
        PropertyName::DisplayName => Some(PropertyValue::DisplayName(collection_ref.display_name.clone())),
        PropertyName::GetCTag => Some(PropertyValue::GetCTag(collection_ref.ctag.clone())),
        PropertyName::SyncToken => Some(PropertyValue::SyncToken(collection_ref.sync_token())),
        PropertyName::Owner => Some(PropertyValue::Owner(href(state_ref, &format!("/principals/users/{}", owner)))),
        PropertyName::SupportedCalendarComponentSet => Some(PropertyValue::SupportedCalendarComponentSet(vec![
            "VEVENT".into(),
            "VTODO".into(),
            "VJOURNAL".into(),
        ])),
        PropertyName::CalendarColor => collection_ref.color.clone().map(PropertyValue::CalendarColor),
        PropertyName::CalendarDescription => Some(PropertyValue::CalendarDescription(collection_ref.description.clone())),
        PropertyName::Acl => Some(PropertyValue::Acl(vec![Ace {
            principal: Href(format!("/principals/users/{}", principal.user_id)),
            grant: privileges_to_wire(grant),
        }])),
        _ => None,
    }))
}

fn collection_acl_key(owner: &str, collection: &Collection) -> String {
    format!("{}/{}", owner, collection.uri)
}

async fn object_response(
    state: &AppState,
    principal: &Principal,
    owner: &str,
    uri: &str,
    object_uid: &str,
    kind: CollectionKind,
    props: &PropertyRequest,
) -> Result<MultistatusResponse, DavError> {
    let collection = state.store.get_collection(owner, uri).await?;
    let grant = state
        .acl
        .effective_privileges(&principal.user_id, owner, &collection_acl_key(owner, &collection))
        .await
        .map_err(crate::error::DavError::from)?;
    if grant & directory::acl::PRIV_READ == 0 {
        return Err(DavError::Forbidden);
    }
    let object = state.store.get_object(collection.id, object_uid).await?;
    let (path, content_type) = if kind == CollectionKind::Calendar {
        (format!("/calendars/{}/{}/{}.ics", owner, uri, object_uid), "text/calendar; charset=utf-8")
    } else {
        (format!("/addressbooks/{}/{}/{}.vcf", owner, uri, object_uid), "text/vcard; charset=utf-8")
    };

    let names = requested_names(
        props,
        &[PropertyName::GetETag, PropertyName::GetContentType, PropertyName::GetLastModified],
    );
    Ok(build_response(href(state, &path), &names, |name| match name {
        PropertyName::GetETag => Some(PropertyValue::GetETag(object.etag.clone())),
        PropertyName::GetContentType => Some(PropertyValue::GetContentType(content_type.to_string())),
        PropertyName::GetLastModified => Some(PropertyValue::GetLastModified(httpdate_of(object.updated_at))),
        PropertyName::CalendarData if kind == CollectionKind::Calendar => Some(PropertyValue::CalendarData(object.raw.clone())),
        PropertyName::AddressData if kind == CollectionKind::Addressbook => Some(PropertyValue::AddressData(object.raw.clone())),
        PropertyName::ScheduleTag => object.schedule_tag.clone().map(PropertyValue::ScheduleTag),
        _ => None,
    }))
}

fn schedule_collection_response(
    state: &AppState,
    owner: &str,
    resource: &Resource,
    props: &PropertyRequest,
) -> MultistatusResponse {
    let (segment, rt) = match resource {
        Resource::ScheduleInbox { .. } => ("calendar-inbox", ResourceType::ScheduleInbox),
        _ => ("calendar-outbox", ResourceType::ScheduleOutbox),
    };
    let path = format!("/calendars/{}/{}/", owner, segment);
    let names = requested_names(props, &[PropertyName::ResourceType, PropertyName::DisplayName]);
    build_response(href(state, &path), &names, move |name| match name {
        PropertyName::ResourceType => Some(PropertyValue::ResourceType(vec![ResourceType::Collection, rt.clone()])),
        PropertyName::DisplayName => Some(PropertyValue::DisplayName(segment.to_string())),
        _ => None,
    })
}

fn httpdate_of(epoch_secs: i64) -> String {
    use chrono::{DateTime, Utc};
    DateTime::<Utc>::from_timestamp(epoch_secs, 0)
        .unwrap_or_default()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}
