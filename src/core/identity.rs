//! Identity atoms.
//!
//! AgentId: authenticated field-agent reference (opaque, issued elsewhere)
//! DeviceId: the capturing device
//! RecordId: device + monotonic counter, collision-free across devices
//! TaskId: authority-issued assignment identifier
//! BlobRef: content-addressed attachment reference

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{CoreError, InvalidId};

/// Opaque authenticated-agent reference - non-empty string.
///
/// Issued by the identity collaborator; this crate never mints or
/// validates credentials beyond non-emptiness.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        if s.is_empty() {
            Err(InvalidId::Agent {
                raw: s,
                reason: "empty".into(),
            }
            .into())
        } else {
            Ok(Self(s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgentId({:?})", self.0)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capturing-device identifier.
///
/// Generated once per device, persisted alongside the store, and embedded
/// in every RecordId so two devices never mint colliding ids.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(Uuid);

impl DeviceId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        Uuid::parse_str(s).map(Self).map_err(|e| {
            InvalidId::Device {
                raw: s.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Field record identifier - "fr-{device}-{counter}" format.
///
/// The counter is monotonic per device and never reused; the store is the
/// only component that allocates new ids.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId {
    device: DeviceId,
    counter: u64,
}

impl RecordId {
    pub(crate) fn new(device: DeviceId, counter: u64) -> Self {
        Self { device, counter }
    }

    /// Parse and validate a record ID string of the form
    /// `fr-<device-uuid>-<counter>`.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let invalid = |reason: &str| -> CoreError {
            InvalidId::Record {
                raw: s.to_string(),
                reason: reason.to_string(),
            }
            .into()
        };

        let rest = s.strip_prefix("fr-").ok_or_else(|| invalid("must start with 'fr-'"))?;
        // Uuid hyphenated form is fixed-width, so split at the last '-'.
        let (device_raw, counter_raw) = rest
            .rsplit_once('-')
            .ok_or_else(|| invalid("missing counter suffix"))?;
        let device = Uuid::parse_str(device_raw).map_err(|_| invalid("bad device uuid"))?;
        let counter: u64 = counter_raw
            .parse()
            .map_err(|_| invalid("counter is not a number"))?;
        if counter == 0 {
            return Err(invalid("counter starts at 1"));
        }
        Ok(Self {
            device: DeviceId::new(device),
            counter,
        })
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fr-{}-{}", self.device, self.counter)
    }
}

impl Serialize for RecordId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        RecordId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Verification task identifier, issued by the central authority.
///
/// Opaque beyond basic shape checks: non-empty, no whitespace.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    pub fn parse(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        if s.is_empty() {
            return Err(InvalidId::Task {
                raw: s,
                reason: "empty".into(),
            }
            .into());
        }
        if s.chars().any(char::is_whitespace) {
            return Err(InvalidId::Task {
                raw: s,
                reason: "cannot contain whitespace".into(),
            }
            .into());
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({:?})", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for TaskId {
    type Error = CoreError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        TaskId::parse(s)
    }
}

impl From<TaskId> for String {
    fn from(t: TaskId) -> String {
        t.0
    }
}

/// Content-addressed blob reference - SHA256 of attachment bytes.
///
/// The raw bytes live with an external storage collaborator; this crate
/// only stores and transmits the reference.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlobRef([u8; 32]);

impl BlobRef {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive the reference for a blob's content.
    pub fn of_content(content: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        Self(Sha256::digest(content).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        if s.len() != 64 {
            return Err(InvalidId::Blob {
                raw: s.to_string(),
                reason: format!("must be 64 hex chars (got {})", s.len()),
            }
            .into());
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex = std::str::from_utf8(chunk).map_err(|_| InvalidId::Blob {
                raw: s.to_string(),
                reason: "contains invalid UTF-8".into(),
            })?;
            bytes[i] = u8::from_str_radix(hex, 16).map_err(|_| InvalidId::Blob {
                raw: s.to_string(),
                reason: format!("contains invalid hex: {}", hex),
            })?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Debug for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobRef({})", self.to_hex())
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl serde::Serialize for BlobRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for BlobRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BlobRef::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_roundtrips_through_display() {
        let device = DeviceId::new(Uuid::from_bytes([7u8; 16]));
        let id = RecordId::new(device, 42);
        let parsed = RecordId::parse(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.counter(), 42);
        assert_eq!(parsed.device(), device);
    }

    #[test]
    fn record_id_rejects_bad_shapes() {
        assert!(RecordId::parse("42").is_err());
        assert!(RecordId::parse("fr-not-a-uuid-1").is_err());
        assert!(RecordId::parse("fr-00000000-0000-0000-0000-000000000000").is_err());
        // counter 0 is reserved
        let device = DeviceId::new(Uuid::from_bytes([7u8; 16]));
        assert!(RecordId::parse(&format!("fr-{}-0", device)).is_err());
    }

    #[test]
    fn record_ids_order_by_device_then_counter() {
        let a = DeviceId::new(Uuid::from_bytes([1u8; 16]));
        let b = DeviceId::new(Uuid::from_bytes([2u8; 16]));
        assert!(RecordId::new(a, 9) < RecordId::new(b, 1));
        assert!(RecordId::new(a, 1) < RecordId::new(a, 2));
    }

    #[test]
    fn task_id_rejects_whitespace() {
        assert!(TaskId::parse("vt-118").is_ok());
        assert!(TaskId::parse("vt 118").is_err());
        assert!(TaskId::parse("").is_err());
    }

    #[test]
    fn blob_ref_hex_roundtrip() {
        let blob = BlobRef::of_content(b"patta scan");
        let parsed = BlobRef::from_hex(&blob.to_hex()).unwrap();
        assert_eq!(parsed, blob);
        assert!(BlobRef::from_hex("abc").is_err());
    }
}
