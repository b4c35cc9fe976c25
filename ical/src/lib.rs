//! iCalendar indexing, time-range filtering, and iTIP authoring.

pub mod duration;
pub mod filter;
pub mod itip;
pub mod model;

pub use model::{extract, extract_vcard_uid, ComponentKind, ObjectMeta};
