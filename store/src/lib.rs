pub mod error;
pub mod memory;
pub mod model;

use async_trait::async_trait;

pub use error::{Result, StoreError};
pub use model::*;

/// Query over a collection's objects, used by the REPORT engine's
/// calendar-query handler. `time_range` is matched against the object's
/// stored start/end using the RFC 4791 overlap predicate; `None` means no
/// time filtering.
#[derive(Debug, Clone, Default)]
pub struct ObjectQuery {
    pub kind: Option<ObjectKind>,
    pub time_range: Option<(i64, i64)>,
}

/// The result of reading a collection's change log forward from a
/// watermark: the matched rows plus the new high watermark to resume from.
#[derive(Debug, Clone)]
pub struct ChangeBatch {
    pub changes: Vec<Change>,
    pub new_seq: u64,
}

/// Backing store collaborator for calendars, addressbooks, their objects,
/// change logs, and per-user scheduling state. One implementation ships:
/// [`memory::InMemoryStore`]. A durable backend (Postgres/SQLite/file) can
/// implement the same trait without touching callers.
#[async_trait]
pub trait Store: Send + Sync {
    // --- collection CRUD (calendars and addressbooks alike) ---

    async fn create_collection(
        &self,
        owner: &str,
        uri: &str,
        kind: CollectionKind,
        display_name: &str,
    ) -> Result<Collection>;

    async fn get_collection(&self, owner: &str, uri: &str) -> Result<Collection>;
    async fn get_collection_by_id(&self, id: CollectionId) -> Result<Collection>;
    async fn list_collections(&self, owner: &str, kind: CollectionKind) -> Result<Vec<Collection>>;
    async fn delete_collection(&self, owner: &str, uri: &str) -> Result<()>;
    async fn set_collection_properties(
        &self,
        id: CollectionId,
        display_name: Option<&str>,
        description: Option<&str>,
        color: Option<&str>,
    ) -> Result<Collection>;
    async fn set_transparency(&self, id: CollectionId, transparency: Transparency) -> Result<()>;

    // --- object CRUD ---

    async fn get_object(&self, collection_id: CollectionId, uid: &str) -> Result<Object>;
    async fn list_objects(&self, collection_id: CollectionId, query: &ObjectQuery) -> Result<Vec<Object>>;

    /// Writes an object and atomically records the change; returns the
    /// stored object with its fresh ETag and the collection's new CTag.
    async fn put_object(
        &self,
        collection_id: CollectionId,
        uid: &str,
        kind: ObjectKind,
        raw: &str,
        start: Option<i64>,
        end: Option<i64>,
        expected_etag: Option<&str>,
        must_not_exist: bool,
    ) -> Result<(Object, String)>;

    /// Removes an object and atomically records a deletion; returns the
    /// collection's new CTag.
    async fn delete_object(
        &self,
        collection_id: CollectionId,
        uid: &str,
        expected_etag: Option<&str>,
    ) -> Result<String>;

    /// Assigns and returns a fresh schedule-tag for the object, called
    /// whenever a scheduling message is generated from a write to it.
    async fn set_schedule_tag(&self, collection_id: CollectionId, uid: &str) -> Result<String>;

    // --- sync engine ---

    async fn get_sync_info(&self, collection_id: CollectionId) -> Result<(String, u64)>;

    async fn list_changes_since(
        &self,
        collection_id: CollectionId,
        since_seq: u64,
        limit: Option<u32>,
    ) -> Result<ChangeBatch>;

    // --- scheduling inbox ---

    async fn write_schedule_message(&self, user: &str, message: ScheduleMessage) -> Result<()>;
    async fn list_schedule_messages(&self, user: &str) -> Result<Vec<ScheduleMessage>>;
    async fn delete_schedule_message(&self, user: &str, uid: &str) -> Result<()>;

    // --- per-user settings ---

    async fn get_default_calendar(&self, user: &str) -> Result<Option<String>>;
    async fn set_default_calendar(&self, user: &str, uri: &str) -> Result<()>;

    /// Every collection readable by `user`, independent of ownership,
    /// used by the free-busy aggregator. The ACL filtering itself lives
    /// in the `directory` crate; this just enumerates candidates.
    async fn collections_with_transparency(&self, transparency: Transparency) -> Result<Vec<Collection>>;
}
