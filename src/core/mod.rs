//! Domain core: identity atoms, time, geography, tasks, records.
//!
//! Everything here is pure data with validated constructors; the stateful
//! machinery lives in `store`, `sync` and `capture`.

mod error;
mod geo;
mod identity;
mod record;
mod task;
mod time;

pub use error::{CoreError, InvalidCoordinate, InvalidId, MissingField};
pub use geo::{GeoPoint, Geotag, haversine_km};
pub use identity::{AgentId, BlobRef, DeviceId, RecordId, TaskId};
pub use record::{
    Attachment, ConflictInfo, FieldRecord, FieldRecordDraft, LifecycleState, RecordMutation,
};
pub use task::{DocumentKind, Priority, VerificationTask};
pub use time::WallClock;
