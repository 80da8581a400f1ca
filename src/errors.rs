//! Typed error hierarchy for the gate.
//!
//! Only two kinds of failure ever escape an orchestration run:
//! - resolution failures, raised before any capability executes
//! - persistence failures, raised the moment storage cannot be trusted
//!
//! Capability execution and augmentation failures never surface here; they
//! are absorbed into synthesized results or empty contributions.

use thiserror::Error;

/// The orchestration stage a [`GateError`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStage {
    Resolution,
    Persistence,
}

impl ErrorStage {
    /// Process exit code the CLI uses for a failure in this stage.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Resolution => 3,
            Self::Persistence => 4,
        }
    }
}

impl std::fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolution => write!(f, "resolution"),
            Self::Persistence => write!(f, "persistence"),
        }
    }
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Directive '{identifier}' not found")]
    DirectiveNotFound { identifier: String },

    #[error("Directive lookup failed for '{identifier}': {source}")]
    DirectiveLookup {
        identifier: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Capability catalog unavailable: {0}")]
    CatalogUnavailable(#[source] anyhow::Error),

    #[error("Mandatory capability {code} for phase {phase} is not in the active catalog")]
    MissingMandatoryCapability { code: String, phase: String },

    #[error("Failed to persist result for {code}: {source}")]
    PersistFailed {
        code: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Stored result {id} for {code} failed verification")]
    VerificationFailed { id: String, code: String },

    #[error("Result store lookup failed for key {key}: {source}")]
    StoreLookup {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

impl GateError {
    /// Which stage of a run produced this error.
    pub fn stage(&self) -> ErrorStage {
        match self {
            Self::DirectiveNotFound { .. }
            | Self::DirectiveLookup { .. }
            | Self::CatalogUnavailable(_)
            | Self::MissingMandatoryCapability { .. } => ErrorStage::Resolution,
            Self::PersistFailed { .. }
            | Self::VerificationFailed { .. }
            | Self::StoreLookup { .. } => ErrorStage::Persistence,
        }
    }
}

pub type GateResult<T> = std::result::Result<T, GateError>;
