//! Time primitives.
//!
//! WallClock is the device clock: good enough for capture ordering on one
//! device, never trusted for cross-device ordering (the server authority
//! arbitrates that).

use serde::{Deserialize, Serialize};

/// Device wall clock in milliseconds since the Unix epoch.
///
/// Copy is fine here - it's a measurement, not causality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WallClock(pub u64);

impl WallClock {
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self(ms)
    }

    pub fn saturating_add_ms(self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms))
    }
}
