pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod directive;
pub mod errors;
pub mod execution;
pub mod init;
pub mod orchestrator;
pub mod phase;
pub mod selection;
pub mod store;
pub mod verdict;

pub use aggregate::{AggregatedVerdict, aggregate};
pub use catalog::{CapabilityCatalog, CapabilityDefinition, CatalogSource, StaticCatalog};
pub use directive::{Directive, DirectiveResolver, DirectiveType, IntensityLevel};
pub use errors::{GateError, GateResult};
pub use execution::{CapabilityExecutor, CommandExecutor, ExecutionEngine, ExecutionRecord};
pub use orchestrator::{GateOrchestrator, GateReport};
pub use phase::Phase;
pub use store::{DbHandle, ResultStore};
pub use verdict::{Severity, Verdict};
