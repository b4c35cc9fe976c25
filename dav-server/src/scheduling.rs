//! Classifies a mutation of a scheduled calendar object into an outgoing
//! iTIP message and drops it into the recipients' scheduling inboxes.
//! Delivery to principals this directory cannot resolve is logged and
//! dropped: outbound delivery to foreign calendar servers is not
//! implemented.

use chrono::Utc;

use directory::Principal;
use ical::itip::{author_message, is_significant_change, Method};
use store::{ItipMethod, ScheduleMessage, Store};

use crate::state::AppState;

fn now_stamp() -> String {
    Utc::now().format("%Y%m%dT%H%M%SZ").to_string()
}

fn as_store_method(method: Method) -> ItipMethod {
    match method {
        Method::Request => ItipMethod::Request,
        Method::Reply => ItipMethod::Reply,
        Method::Cancel => ItipMethod::Cancel,
    }
}

fn strip_mailto(value: &str) -> &str {
    value.strip_prefix("mailto:").unwrap_or(value)
}

/// The address this principal is known by in iTIP messages: its directory
/// email if set, otherwise its user ID (useful for the static backend and
/// tests, where email is rarely configured).
fn principal_email(principal: &Principal) -> &str {
    principal.email.as_deref().unwrap_or(&principal.user_id)
}

async fn deliver(state: &AppState, recipient_email: &str, method: Method, raw: &str) {
    let recipient = match state.directory.lookup_user_by_attr("mail", recipient_email).await {
        Ok(p) => p,
        Err(_) => {
            tracing::info!(recipient = recipient_email, "no local principal for scheduling recipient, dropping");
            return;
        }
    };

    let message = ScheduleMessage {
        uid: format!("{}-{}", method.as_str().to_lowercase(), recipient_email),
        method: as_store_method(method),
        raw: raw.to_string(),
        received_at: chrono::Utc::now().timestamp(),
        processed: false,
    };

    if let Err(err) = state.store.write_schedule_message(&recipient.user_id, message).await {
        tracing::warn!(err = %err, recipient = %recipient.user_id, "failed to deliver scheduling message");
    }
}

/// Called after a PUT creates or updates a calendar object. `before` is
/// `None` on creation. Returns the object's fresh schedule-tag when a
/// scheduling message was actually generated by this write, so the caller
/// can report it back to the client.
pub async fn on_object_written(
    state: &AppState,
    principal: &Principal,
    before: Option<&store::Object>,
    after: &store::Object,
) -> Option<String> {
    let after_meta = ical::extract(&after.raw).unwrap_or_default();
    let organizer = after_meta.organizer.clone()?;
    if after_meta.attendees.is_empty() {
        return None;
    }

    let before_meta = before.and_then(|b| ical::extract(&b.raw).ok());
    let organizer_is_author = strip_mailto(&organizer) == principal_email(principal);

    if organizer_is_author {
        let significant = match &before_meta {
            Some(before_meta) => is_significant_change(before_meta, &after_meta),
            None => true,
        };
        if !significant {
            return None;
        }
        let message = author_message(&after.raw, Method::Request, &state.config.prodid, &now_stamp(), None)?;
        for attendee in &after_meta.attendees {
            deliver(state, strip_mailto(attendee), Method::Request, &message).await;
        }
    } else {
        let me = format!("mailto:{}", principal_email(principal));
        if !after_meta.attendees.iter().any(|a| a == &me) {
            return None;
        }
        let message = author_message(
            &after.raw,
            Method::Reply,
            &state.config.prodid,
            &now_stamp(),
            Some(principal_email(principal)),
        )?;
        deliver(state, strip_mailto(&organizer), Method::Reply, &message).await;
    }

    match state.store.set_schedule_tag(after.collection_id, &after.uid).await {
        Ok(tag) => Some(tag),
        Err(err) => {
            tracing::warn!(err = %err, uid = %after.uid, "failed to set schedule-tag after delivering scheduling message");
            None
        }
    }
}

/// Called after a DELETE removes a calendar object that carried an
/// organizer/attendee pair. The deleted object's raw content (captured by
/// the caller before the delete) is still needed to author the CANCEL.
pub async fn on_object_deleted(state: &AppState, principal: &Principal, before: &store::Object) {
    let meta = ical::extract(&before.raw).unwrap_or_default();
    let organizer = match &meta.organizer {
        Some(o) => o.clone(),
        None => return,
    };
    if strip_mailto(&organizer) != principal_email(principal) {
        return;
    }

    let message = match author_message(&before.raw, Method::Cancel, &state.config.prodid, &now_stamp(), None) {
        Some(m) => m,
        None => return,
    };
    for attendee in &meta.attendees {
        deliver(state, strip_mailto(attendee), Method::Cancel, &message).await;
    }
}
