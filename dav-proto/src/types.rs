//! Concrete wire types for the subset of WebDAV/CalDAV/CardDAV/ACL/sync
//! this server speaks. Unlike a generic DAV toolkit, these are not
//! parameterized over an extension trait: this server only ever needs one
//! concrete vocabulary, so the types name exactly that vocabulary.

use std::fmt;

/// 14.4 depth XML Element / `Depth` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Depth {
    #[default]
    Zero,
    One,
    Infinity,
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Zero => "0",
            Self::One => "1",
            Self::Infinity => "infinity",
        })
    }
}

impl std::str::FromStr for Depth {
    type Err = crate::error::CodecError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" => Ok(Self::Zero),
            "1" => Ok(Self::One),
            "infinity" => Ok(Self::Infinity),
            other => Err(crate::error::CodecError::BadEnumValue(other.into())),
        }
    }
}

/// `DAV:href` — always a path, never a full authority-qualified URL:
/// this server encodes hrefs relative to its own base path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Href(pub String);

/// `DAV:resourcetype` values this server ever emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceType {
    Collection,
    Calendar,
    Addressbook,
    Principal,
    ScheduleInbox,
    ScheduleOutbox,
}

/// The set of properties a PROPFIND/REPORT body may request. `AllProp`
/// covers `DAV:allprop` and the implicit default when a request carries no
/// body at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyRequest {
    AllProp,
    PropName,
    Prop(Vec<PropertyName>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyName {
    ResourceType,
    DisplayName,
    CurrentUserPrincipal,
    PrincipalUrl,
    PrincipalCollectionSet,
    CalendarHomeSet,
    AddressbookHomeSet,
    SupportedCalendarComponentSet,
    SupportedCalendarData,
    Owner,
    GetCTag,
    SyncToken,
    GetContentType,
    CalendarData,
    AddressData,
    GetETag,
    GetLastModified,
    GetContentLength,
    Acl,
    ScheduleInboxUrl,
    ScheduleOutboxUrl,
    CalendarColor,
    CalendarDescription,
    ScheduleTag,
    Other(&'static str),
}

impl PropertyName {
    pub fn qname(&self) -> (&'static str, &'static str) {
        use crate::xml::{NS_CALDAV, NS_CARDDAV, NS_CS, NS_DAV};
        match self {
            Self::ResourceType => (NS_DAV, "resourcetype"),
            Self::DisplayName => (NS_DAV, "displayname"),
            Self::CurrentUserPrincipal => (NS_DAV, "current-user-principal"),
            Self::PrincipalUrl => (NS_DAV, "principal-URL"),
            Self::PrincipalCollectionSet => (NS_DAV, "principal-collection-set"),
            Self::CalendarHomeSet => (NS_CALDAV, "calendar-home-set"),
            Self::AddressbookHomeSet => (NS_CARDDAV, "addressbook-home-set"),
            Self::SupportedCalendarComponentSet => (NS_CALDAV, "supported-calendar-component-set"),
            Self::SupportedCalendarData => (NS_CALDAV, "supported-calendar-data"),
            Self::Owner => (NS_DAV, "owner"),
            Self::GetCTag => (NS_CS, "getctag"),
            Self::SyncToken => (NS_DAV, "sync-token"),
            Self::GetContentType => (NS_DAV, "getcontenttype"),
            Self::CalendarData => (NS_CALDAV, "calendar-data"),
            Self::AddressData => (NS_CARDDAV, "address-data"),
            Self::GetETag => (NS_DAV, "getetag"),
            Self::GetLastModified => (NS_DAV, "getlastmodified"),
            Self::GetContentLength => (NS_DAV, "getcontentlength"),
            Self::Acl => (NS_DAV, "acl"),
            Self::ScheduleInboxUrl => (NS_CALDAV, "schedule-inbox-URL"),
            Self::ScheduleOutboxUrl => (NS_CALDAV, "schedule-outbox-URL"),
            Self::CalendarColor => (NS_CS, "calendar-color"),
            Self::CalendarDescription => (NS_CALDAV, "calendar-description"),
            Self::ScheduleTag => (NS_CALDAV, "schedule-tag"),
            Self::Other(name) => (NS_DAV, name),
        }
    }

    pub fn from_qname(ns: &str, local: &str) -> Self {
        use crate::xml::{NS_CALDAV, NS_CARDDAV, NS_CS, NS_DAV};
        match (ns, local) {
            (NS_DAV, "resourcetype") => Self::ResourceType,
            (NS_DAV, "displayname") => Self::DisplayName,
            (NS_DAV, "current-user-principal") => Self::CurrentUserPrincipal,
            (NS_DAV, "principal-URL") => Self::PrincipalUrl,
            (NS_DAV, "principal-collection-set") => Self::PrincipalCollectionSet,
            (NS_CALDAV, "calendar-home-set") => Self::CalendarHomeSet,
            (NS_CARDDAV, "addressbook-home-set") => Self::AddressbookHomeSet,
            (NS_CALDAV, "supported-calendar-component-set") => Self::SupportedCalendarComponentSet,
            (NS_CALDAV, "supported-calendar-data") => Self::SupportedCalendarData,
            (NS_DAV, "owner") => Self::Owner,
            (NS_CS, "getctag") => Self::GetCTag,
            (NS_DAV, "sync-token") => Self::SyncToken,
            (NS_DAV, "getcontenttype") => Self::GetContentType,
            (NS_CALDAV, "calendar-data") => Self::CalendarData,
            (NS_CARDDAV, "address-data") => Self::AddressData,
            (NS_DAV, "getetag") => Self::GetETag,
            (NS_DAV, "getlastmodified") => Self::GetLastModified,
            (NS_DAV, "getcontentlength") => Self::GetContentLength,
            (NS_DAV, "acl") => Self::Acl,
            (NS_CALDAV, "schedule-inbox-URL") => Self::ScheduleInboxUrl,
            (NS_CALDAV, "schedule-outbox-URL") => Self::ScheduleOutboxUrl,
            (NS_CS, "calendar-color") => Self::CalendarColor,
            (NS_CALDAV, "calendar-description") => Self::CalendarDescription,
            (NS_CALDAV, "schedule-tag") => Self::ScheduleTag,
            _ => Self::Other("unknown"),
        }
    }
}

/// Privilege bitmask shared by the ACL resolver and the `DAV:acl` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Privileges(pub u8);

impl Privileges {
    pub const READ: Self = Self(1 << 0);
    pub const WRITE_PROPS: Self = Self(1 << 1);
    pub const WRITE_CONTENT: Self = Self(1 << 2);
    pub const BIND: Self = Self(1 << 3);
    pub const UNBIND: Self = Self(1 << 4);
    pub const ALL: Self = Self(0b11111);
    pub const NONE: Self = Self(0);

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn can_read(&self) -> bool {
        self.contains(Self::READ)
    }
}

impl std::ops::BitOr for Privileges {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// One `DAV:ace` entry as emitted in a `DAV:acl` property response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ace {
    pub principal: Href,
    pub grant: Privileges,
}

/// A single multistatus child. Either every named property came back with
/// a status, or the whole href failed with one status (deletions inside a
/// sync-collection report, 404s, …).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultistatusResponse {
    pub href: Href,
    pub propstats: Vec<Propstat>,
    /// Present only for entries that have no properties at all, e.g. a
    /// deleted member inside a sync-collection report.
    pub status: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Propstat {
    pub status: u16,
    pub properties: Vec<PropertyValue>,
    /// Property names requested but not present on the resource, carried
    /// as bare elements under this propstat (status is always 404).
    pub missing: Vec<PropertyName>,
}

impl Propstat {
    pub fn found(properties: Vec<PropertyValue>) -> Self {
        Self { status: 200, properties, missing: Vec::new() }
    }

    pub fn not_found(missing: Vec<PropertyName>) -> Self {
        Self { status: 404, properties: Vec::new(), missing }
    }
}

/// A decoded property value, as returned by the PROPFIND/REPORT engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    ResourceType(Vec<ResourceType>),
    DisplayName(String),
    CurrentUserPrincipal(Href),
    PrincipalUrl(Href),
    PrincipalCollectionSet(Vec<Href>),
    CalendarHomeSet(Href),
    AddressbookHomeSet(Href),
    SupportedCalendarComponentSet(Vec<String>),
    SupportedCalendarData,
    Owner(Href),
    GetCTag(String),
    SyncToken(String),
    GetContentType(String),
    CalendarData(String),
    AddressData(String),
    GetETag(String),
    GetLastModified(String),
    GetContentLength(u64),
    Acl(Vec<Ace>),
    ScheduleInboxUrl(Href),
    ScheduleOutboxUrl(Href),
    CalendarColor(String),
    CalendarDescription(String),
    ScheduleTag(String),
}

impl PropertyValue {
    pub fn name(&self) -> PropertyName {
        match self {
            Self::ResourceType(_) => PropertyName::ResourceType,
            Self::DisplayName(_) => PropertyName::DisplayName,
            Self::CurrentUserPrincipal(_) => PropertyName::CurrentUserPrincipal,
            Self::PrincipalUrl(_) => PropertyName::PrincipalUrl,
            Self::PrincipalCollectionSet(_) => PropertyName::PrincipalCollectionSet,
            Self::CalendarHomeSet(_) => PropertyName::CalendarHomeSet,
            Self::AddressbookHomeSet(_) => PropertyName::AddressbookHomeSet,
            Self::SupportedCalendarComponentSet(_) => PropertyName::SupportedCalendarComponentSet,
            Self::SupportedCalendarData => PropertyName::SupportedCalendarData,
            Self::Owner(_) => PropertyName::Owner,
            Self::GetCTag(_) => PropertyName::GetCTag,
            Self::SyncToken(_) => PropertyName::SyncToken,
            Self::GetContentType(_) => PropertyName::GetContentType,
            Self::CalendarData(_) => PropertyName::CalendarData,
            Self::AddressData(_) => PropertyName::AddressData,
            Self::GetETag(_) => PropertyName::GetETag,
            Self::GetLastModified(_) => PropertyName::GetLastModified,
            Self::GetContentLength(_) => PropertyName::GetContentLength,
            Self::Acl(_) => PropertyName::Acl,
            Self::ScheduleInboxUrl(_) => PropertyName::ScheduleInboxUrl,
            Self::ScheduleOutboxUrl(_) => PropertyName::ScheduleOutboxUrl,
            Self::CalendarColor(_) => PropertyName::CalendarColor,
            Self::CalendarDescription(_) => PropertyName::CalendarDescription,
            Self::ScheduleTag(_) => PropertyName::ScheduleTag,
        }
    }
}

/// Decoded REPORT request bodies (RFC 4791 §7, RFC 6578, RFC 6352).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportRequest {
    CalendarQuery(CalendarQuery),
    CalendarMultiget(MultigetRequest),
    AddressbookMultiget(MultigetRequest),
    SyncCollection(SyncCollectionRequest),
    FreeBusyQuery(TimeRange),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarQuery {
    pub props: PropertyRequest,
    pub filter: CompFilter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultigetRequest {
    pub props: PropertyRequest,
    pub hrefs: Vec<Href>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCollectionRequest {
    /// `None` on initial sync.
    pub sync_token: Option<String>,
    pub limit: Option<u32>,
    pub props: PropertyRequest,
}

/// `CALDAV:comp-filter`, recursively filtering by component name and an
/// optional time-range, restricted to the one level of nesting this server
/// actually evaluates (VCALENDAR/VEVENT|VTODO|VJOURNAL/time-range).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompFilter {
    pub name: String,
    pub time_range: Option<TimeRange>,
    pub prop_filters: Vec<PropFilter>,
    pub comp_filters: Vec<CompFilter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropFilter {
    pub name: String,
    pub text_match: Option<String>,
}

/// A decoded `PROPPATCH` (or `MKCALENDAR`/`MKCOL` extended-MKCOL) body.
/// Only the properties this server lets clients write are modeled; any
/// other `DAV:set`/`DAV:remove` property is silently accepted and ignored,
/// matching how most CalDAV servers handle unsupported dead properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyUpdate {
    pub display_name: Option<String>,
    pub calendar_color: Option<String>,
    pub calendar_description: Option<String>,
    pub schedule_transp_opaque: Option<bool>,
}

/// An open-ended range is represented with `i64::MIN`/`i64::MAX` epoch
/// seconds rather than `Option`, so overlap arithmetic has no special case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn overlaps(&self, other_start: Option<i64>, other_end: Option<i64>) -> bool {
        let start = other_start.unwrap_or(i64::MIN);
        let end = other_end.unwrap_or(i64::MAX);
        start <= self.end && end >= self.start
    }
}
