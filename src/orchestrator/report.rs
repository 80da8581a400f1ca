use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::AggregatedVerdict;
use crate::execution::ExecutionOutcome;
use crate::phase::Phase;
use crate::selection::SelectionOutcome;

/// Everything one gate evaluation produced.
#[derive(Debug, Clone, Serialize)]
pub struct GateReport {
    pub directive_id: String,
    pub directive_uuid: String,
    pub title: String,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub selection: SelectionOutcome,
    pub outcomes: Vec<ExecutionOutcome>,
    pub aggregate: AggregatedVerdict,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl GateReport {
    pub fn can_proceed(&self) -> bool {
        self.aggregate.can_proceed
    }

    /// Outcomes served from an earlier run in the same window.
    pub fn reused_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.reused).count()
    }
}

/// Selection only, without executing anything.
#[derive(Debug, Clone, Serialize)]
pub struct RequirementsReport {
    pub directive_id: String,
    pub title: String,
    pub phase: Phase,
    pub selection: SelectionOutcome,
}
