//! Capability execution: idempotency keys, executors, output normalization
//! and the engine that ties them to the result store.

pub mod engine;
pub mod executor;
pub mod idempotency;
pub mod normalize;
pub mod record;

pub use engine::{EngineConfig, ExecutionEngine};
pub use executor::{CapabilityExecutor, CommandExecutor, ExecutionContext};
pub use idempotency::{Clock, ManualClock, SystemClock, idempotency_key};
pub use normalize::{NormalizedResponse, normalize_response};
pub use record::{ExecutionOutcome, ExecutionRecord};
