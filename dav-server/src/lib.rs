//! CalDAV/CardDAV HTTP server: path resolution, PROPFIND/REPORT engines,
//! object CRUD, scheduling dispatch, and the connection-accepting loop.

pub mod crud;
pub mod error;
pub mod middleware;
pub mod propfind;
pub mod report;
pub mod resource;
pub mod router;
pub mod scheduling;
pub mod server;
pub mod state;

pub use router::route;
pub use server::{Server, TlsMaterial};
pub use state::{AppState, ServerConfig};
