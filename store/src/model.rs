use std::collections::BTreeMap;

pub type CollectionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Calendar,
    Addressbook,
    ScheduleInbox,
    ScheduleOutbox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transparency {
    Opaque,
    Transparent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    VEvent,
    VTodo,
    VJournal,
    VCard,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VEvent => "VEVENT",
            Self::VTodo => "VTODO",
            Self::VJournal => "VJOURNAL",
            Self::VCard => "VCARD",
        }
    }
}

/// A calendar or addressbook owned by exactly one principal.
#[derive(Debug, Clone)]
pub struct Collection {
    pub id: CollectionId,
    pub owner: String,
    pub uri: String,
    pub kind: CollectionKind,
    pub display_name: String,
    pub description: String,
    pub color: Option<String>,
    pub ctag: String,
    pub sync_seq: u64,
    pub transparency: Transparency,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Collection {
    pub fn sync_token(&self) -> String {
        sync_token_of(self.sync_seq)
    }
}

pub fn sync_token_of(seq: u64) -> String {
    format!("seq:{}", seq)
}

pub fn seq_of_sync_token(token: &str) -> Option<u64> {
    token.strip_prefix("seq:").and_then(|n| n.parse().ok())
}

/// A single calendar item or contact, keyed by UID within its collection.
#[derive(Debug, Clone)]
pub struct Object {
    pub collection_id: CollectionId,
    pub uid: String,
    pub etag: String,
    pub kind: ObjectKind,
    pub raw: String,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub schedule_tag: Option<String>,
    pub updated_at: i64,
}

/// One row of a collection's append-only change log.
#[derive(Debug, Clone)]
pub struct Change {
    pub seq: u64,
    pub uid: String,
    pub deleted: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItipMethod {
    Request,
    Reply,
    Cancel,
    Refresh,
}

impl ItipMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "REQUEST",
            Self::Reply => "REPLY",
            Self::Cancel => "CANCEL",
            Self::Refresh => "REFRESH",
        }
    }
}

/// A row in a principal's scheduling inbox.
#[derive(Debug, Clone)]
pub struct ScheduleMessage {
    pub uid: String,
    pub method: ItipMethod,
    pub raw: String,
    pub received_at: i64,
    pub processed: bool,
}

/// Per-user settings not tied to any single collection.
#[derive(Debug, Clone, Default)]
pub struct UserSettings {
    pub default_calendar_uri: Option<String>,
}

pub type Properties = BTreeMap<String, String>;
