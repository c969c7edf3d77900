//! Verification tasks as issued by the central authority.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{CoreError, InvalidId};
use super::geo::GeoPoint;
use super::identity::TaskId;

/// Visit priority. Variant order is visit order: High sorts first.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

/// Document kind tag, e.g. "fra_application" or "survey_number".
///
/// Non-empty, trimmed. Kinds are compared case-sensitively; the authority
/// is the vocabulary owner.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentKind(String);

impl DocumentKind {
    pub fn parse(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into().trim().to_string();
        if s.is_empty() {
            return Err(InvalidId::DocumentKind {
                raw: s,
                reason: "empty".into(),
            }
            .into());
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentKind({:?})", self.0)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for DocumentKind {
    type Error = CoreError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        DocumentKind::parse(s)
    }
}

impl From<DocumentKind> for String {
    fn from(k: DocumentKind) -> String {
        k.0
    }
}

/// An assignment from the central authority.
///
/// Immutable once issued. The authority may reassign by issuing a new task
/// with the same id; the newer `issued_at_ms` wins.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationTask {
    pub task_id: TaskId,
    pub beneficiary_ref: String,
    pub village: String,
    pub location: GeoPoint,
    pub priority: Priority,
    pub estimated_duration_minutes: u32,
    #[serde(default)]
    pub required_document_kinds: BTreeSet<DocumentKind>,
    /// Authority clock, used only for last-issued-wins on reissue.
    pub issued_at_ms: u64,
}

impl VerificationTask {
    /// Last-issued-wins: pick the newer issue of two tasks with the same id.
    pub fn newer_of(a: Self, b: Self) -> Self {
        debug_assert_eq!(a.task_id, b.task_id);
        if b.issued_at_ms >= a.issued_at_ms { b } else { a }
    }
}
