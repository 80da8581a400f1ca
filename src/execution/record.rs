use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::phase::Phase;
use crate::verdict::{Issue, Severity, Verdict};

/// One stored capability execution.
///
/// Records are append-only: once inserted, a record is never rewritten.
/// A repeat request inside the same idempotency window returns the stored
/// record instead of creating a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    pub directive_id: String,
    pub capability_code: String,
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub verdict: Verdict,
    pub confidence: u8,
    pub severity: Severity,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub analysis: String,
    pub duration_ms: u64,
    pub idempotency_key: String,
    /// Always carries `idempotency_key`; anything else the executor returned
    /// beyond the normalized fields lives under `extra`.
    pub metadata: serde_json::Value,
    /// Whether the engine produced this record in place of a failed run.
    #[serde(default)]
    pub synthesized: bool,
    pub created_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn is_failure(&self) -> bool {
        matches!(self.verdict, Verdict::Fail | Verdict::Blocked)
    }
}

/// Result of asking the engine for one capability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionOutcome {
    pub record: ExecutionRecord,
    /// `true` when an existing record from the same window was returned.
    pub reused: bool,
}
