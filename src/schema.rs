//! Requirements hierarchy types.
//!
//! A hierarchy is a strict three-level tree: process → subprocess → use case.
//! The `*Draft` types are the normalized, not-yet-persisted shape; the `*Node`
//! and [`UseCaseRecord`] types carry store-issued identifiers.

use serde::{Deserialize, Serialize};

/// Classification of a use case, stored as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum UseCaseKind {
    Functional = 1,
    NonFunctional = 2,
    System = 3,
}

impl UseCaseKind {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Exact lookup, used when reading rows back from the store.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Functional),
            2 => Some(Self::NonFunctional),
            3 => Some(Self::System),
            _ => None,
        }
    }

    /// Round to the nearest code and clamp into `[1, 3]`.
    /// Non-finite input falls back to [`UseCaseKind::Functional`].
    pub fn clamped(value: f64) -> Self {
        if !value.is_finite() {
            return Self::Functional;
        }
        let code = value.round().clamp(1.0, 3.0) as i64;
        Self::from_code(code).unwrap_or(Self::Functional)
    }
}

impl From<UseCaseKind> for u8 {
    fn from(kind: UseCaseKind) -> Self {
        kind.code()
    }
}

impl TryFrom<u8> for UseCaseKind {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(i64::from(code)).ok_or_else(|| format!("invalid use case kind: {}", code))
    }
}

// ============================================================================
// Normalized hierarchy (input to persistence)
// ============================================================================

/// A normalized hierarchy, guaranteed to satisfy the schema invariants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hierarchy {
    pub processes: Vec<ProcessDraft>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDraft {
    pub name: String,
    pub description: Option<String>,
    pub subprocesses: Vec<SubprocessDraft>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubprocessDraft {
    pub name: String,
    pub description: Option<String>,
    pub use_cases: Vec<UseCaseDraft>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseCaseDraft {
    pub name: String,
    pub description: Option<String>,
    pub primary_actor: Option<String>,
    pub kind: UseCaseKind,
    pub preconditions: Option<String>,
    pub postconditions: Option<String>,
    pub acceptance_criteria: Option<String>,
}

impl Hierarchy {
    /// Total number of rows this hierarchy will occupy once persisted,
    /// as `(processes, subprocesses, use_cases)`.
    pub fn row_counts(&self) -> (usize, usize, usize) {
        let subprocesses = self.processes.iter().map(|p| p.subprocesses.len()).sum();
        let use_cases = self
            .processes
            .iter()
            .flat_map(|p| &p.subprocesses)
            .map(|s| s.use_cases.len())
            .sum();
        (self.processes.len(), subprocesses, use_cases)
    }
}

// ============================================================================
// Persisted tree (output of persistence and of the tree reader)
// ============================================================================

/// A persisted process with its nested subprocesses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessNode {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub subprocesses: Vec<SubprocessNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubprocessNode {
    pub id: i64,
    pub process_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub use_cases: Vec<UseCaseRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseCaseRecord {
    pub id: i64,
    pub subprocess_id: i64,
    #[serde(flatten)]
    pub body: UseCaseDraft,
}
