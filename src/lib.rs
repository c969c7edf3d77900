#![forbid(unsafe_code)]

pub mod capture;
pub mod config;
pub mod core;
pub mod error;
mod paths;
pub mod route;
pub mod store;
pub mod sync;
pub mod telemetry;

pub use error::{Effect, Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export core types at crate root for convenience
pub use crate::core::{
    AgentId, Attachment, BlobRef, DeviceId, DocumentKind, FieldRecord, FieldRecordDraft, GeoPoint,
    Geotag, LifecycleState, Priority, RecordId, RecordMutation, TaskId, VerificationTask,
    WallClock,
};
pub use crate::store::{Limits, RecordStore, StoreStatus};
pub use crate::sync::{CancelToken, SyncCycleReport, SyncDispatcher, Transport};
