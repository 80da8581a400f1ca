//! One gate evaluation, end to end.
//!
//! ```text
//! resolve directive -> load catalog -> select -> execute -> aggregate
//! ```
//!
//! Resolution errors (unknown directive, unavailable catalog, missing
//! mandatory capability) abort before any executor runs. Storage errors
//! abort as soon as they happen. Everything else ends in a report.

mod report;

pub use report::{GateReport, RequirementsReport};

use std::sync::Arc;
use std::time::Instant;

use crate::aggregate::aggregate;
use crate::catalog::{CapabilityCatalog, CatalogSource};
use crate::directive::{Directive, DirectiveResolver};
use crate::errors::{GateError, GateResult};
use crate::execution::ExecutionEngine;
use crate::phase::Phase;
use crate::selection::{
    AugmentationRunner, CoordinationRule, MandatoryMatrix, SelectionConfig, SelectionOutcome,
    Selector,
};

pub struct GateOrchestrator {
    resolver: DirectiveResolver,
    catalog: Arc<dyn CatalogSource>,
    matrix: MandatoryMatrix,
    rules: Vec<CoordinationRule>,
    augmentation: AugmentationRunner,
    engine: ExecutionEngine,
    selection: SelectionConfig,
}

impl GateOrchestrator {
    pub fn new(
        resolver: DirectiveResolver,
        catalog: Arc<dyn CatalogSource>,
        engine: ExecutionEngine,
    ) -> Self {
        Self {
            resolver,
            catalog,
            matrix: MandatoryMatrix::builtin(),
            rules: crate::selection::coordination::builtin_rules(),
            augmentation: AugmentationRunner::new(std::time::Duration::from_secs(
                crate::selection::augment::DEFAULT_AUGMENTATION_TIMEOUT_SECS,
            )),
            engine,
            selection: SelectionConfig::default(),
        }
    }

    pub fn with_matrix(mut self, matrix: MandatoryMatrix) -> Self {
        self.matrix = matrix;
        self
    }

    pub fn with_rules(mut self, rules: Vec<CoordinationRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_augmentation(mut self, augmentation: AugmentationRunner) -> Self {
        self.augmentation = augmentation;
        self
    }

    pub fn with_selection_config(mut self, config: SelectionConfig) -> Self {
        self.selection = config;
        self
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// Resolve, load the catalog and select, without executing anything.
    pub async fn requirements(&self, identifier: &str, phase: Phase) -> GateResult<RequirementsReport> {
        let (directive, _catalog, selection) = self.prepare(identifier, phase).await?;
        Ok(RequirementsReport {
            directive_id: directive.id,
            title: directive.title,
            phase,
            selection,
        })
    }

    /// Run the full gate for one directive and phase.
    pub async fn evaluate(
        &self,
        identifier: &str,
        phase: Phase,
        session_id: Option<&str>,
    ) -> GateResult<GateReport> {
        let started_at = chrono::Utc::now();
        let started = Instant::now();

        let (directive, catalog, selection) = self.prepare(identifier, phase).await?;

        let outcomes = self
            .engine
            .run(&selection.requirements, &catalog, &directive, phase, session_id)
            .await?;

        let records: Vec<_> = outcomes.iter().map(|o| o.record.clone()).collect();
        let verdict = aggregate(&records);

        tracing::info!(
            directive = %directive.id,
            phase = %phase,
            verdict = %verdict.verdict,
            can_proceed = verdict.can_proceed,
            executed = outcomes.iter().filter(|o| !o.reused).count(),
            reused = outcomes.iter().filter(|o| o.reused).count(),
            "gate evaluated"
        );

        Ok(GateReport {
            directive_id: directive.id,
            directive_uuid: directive.uuid,
            title: directive.title,
            phase,
            session_id: session_id.map(str::to_string),
            selection,
            outcomes,
            aggregate: verdict,
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn prepare(
        &self,
        identifier: &str,
        phase: Phase,
    ) -> GateResult<(Directive, CapabilityCatalog, SelectionOutcome)> {
        let directive = self.resolver.resolve(identifier).await?;

        let definitions = self
            .catalog
            .load_active()
            .await
            .map_err(GateError::CatalogUnavailable)?;
        let catalog = CapabilityCatalog::new(definitions);

        let selector = Selector::new(
            catalog.clone(),
            self.matrix.clone(),
            self.rules.clone(),
            self.augmentation.clone(),
            self.selection,
        )
        .map_err(GateError::CatalogUnavailable)?;

        let selection = selector.select(&directive, phase).await?;
        Ok((directive, catalog, selection))
    }
}
