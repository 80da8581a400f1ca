//! Capability selection for one (directive, phase).
//!
//! Four signals feed one [`RequirementSet`]:
//!
//! | Signal         | Module           | Adds when                                  |
//! |----------------|------------------|--------------------------------------------|
//! | mandatory      | `mandatory`      | phase x type (x intensity) table lists it  |
//! | keyword        | `scorer`         | domain meets min matches and threshold     |
//! | coordination   | `coordination`   | a rule sees >= 2 of its keywords           |
//! | augmentation   | `augment`        | a best-effort source suggests it           |
//!
//! Mandatory codes must exist in the active catalog or selection fails.
//! Every other signal is filtered to capabilities that are active and
//! applicable to the phase; filtered suggestions are kept as diagnostics.

pub mod augment;
pub mod coordination;
pub mod mandatory;
pub mod requirements;
pub mod scorer;

pub use augment::{
    AugmentationRunner, AugmentationSource, HistoricalPatternMatcher, ImpactClassifier,
    InMemoryPatterns, IssuePattern, PatternSource, Suggestion,
};
pub use coordination::{CoordinationMatch, CoordinationResolver, CoordinationRule};
pub use mandatory::MandatoryMatrix;
pub use requirements::{RequirementEntry, RequirementSet, RequirementSource};
pub use scorer::{DomainScore, DomainScorer, ScoringConfig, TextContexts};

use anyhow::Result;
use serde::Serialize;

use crate::catalog::CapabilityCatalog;
use crate::directive::Directive;
use crate::errors::{GateError, GateResult};
use crate::phase::Phase;
use augment::SourcedSuggestion;

#[derive(Debug, Clone, Copy)]
pub struct SelectionConfig {
    pub scoring: ScoringConfig,
    pub coordination_min_matches: usize,
    pub coordination_confidence: u8,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            coordination_min_matches: coordination::DEFAULT_COORDINATION_MIN_MATCHES,
            coordination_confidence: coordination::DEFAULT_COORDINATION_CONFIDENCE,
        }
    }
}

/// A suggested capability that was not added, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSuggestion {
    pub code: String,
    pub source: RequirementSource,
    pub reason: String,
}

/// Everything selection produced for one run.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionOutcome {
    pub requirements: RequirementSet,
    pub domain_scores: Vec<DomainScore>,
    pub coordination: Vec<CoordinationMatch>,
    pub augmentation: Vec<SourcedSuggestion>,
    pub skipped: Vec<SkippedSuggestion>,
}

/// Combines every selection signal against one loaded catalog.
pub struct Selector {
    catalog: CapabilityCatalog,
    scorer: DomainScorer,
    coordination: CoordinationResolver,
    matrix: MandatoryMatrix,
    augmentation: AugmentationRunner,
    config: SelectionConfig,
}

impl Selector {
    pub fn new(
        catalog: CapabilityCatalog,
        matrix: MandatoryMatrix,
        rules: Vec<CoordinationRule>,
        augmentation: AugmentationRunner,
        config: SelectionConfig,
    ) -> Result<Self> {
        let scorer = DomainScorer::new(&catalog, config.scoring)?;
        let coordination = CoordinationResolver::new(rules, config.coordination_min_matches)?;
        Ok(Self {
            catalog,
            scorer,
            coordination,
            matrix,
            augmentation,
            config,
        })
    }

    pub fn catalog(&self) -> &CapabilityCatalog {
        &self.catalog
    }

    pub async fn select(&self, directive: &Directive, phase: Phase) -> GateResult<SelectionOutcome> {
        let mut requirements = RequirementSet::new();
        let mut skipped = Vec::new();

        // Mandatory first: a missing code aborts before anything else runs.
        let mandatory =
            self.matrix
                .mandatory_for(phase, directive.directive_type, directive.intensity);
        for code in &mandatory {
            if !self.catalog.is_active(code) {
                return Err(GateError::MissingMandatoryCapability {
                    code: code.clone(),
                    phase: phase.to_string(),
                });
            }
            let reason = match directive.intensity {
                Some(level) => format!("mandatory for {} ({}) in {}", directive.directive_type, level, phase),
                None => format!("mandatory for {} in {}", directive.directive_type, phase),
            };
            requirements.add(code, RequirementSource::Mandatory, reason, None);
        }

        let contexts = TextContexts::from_directive(directive);
        let domain_scores = self.scorer.score_all(&self.catalog, phase, &contexts);
        for score in domain_scores.iter().filter(|s| s.recommended) {
            requirements.add(
                &score.code,
                RequirementSource::Keyword,
                format!(
                    "keyword match {}% ({})",
                    score.detail.confidence,
                    score.detail.matched_keywords.join(", ")
                ),
                Some(score.detail.confidence),
            );
        }

        let coordination = self.coordination.detect(&contexts.content);
        for group in &coordination {
            for code in &group.capabilities {
                if !self.catalog.is_available(code, phase) {
                    skipped.push(SkippedSuggestion {
                        code: code.clone(),
                        source: RequirementSource::Coordination,
                        reason: format!("{} not available in {}", code, phase),
                    });
                    continue;
                }
                requirements.add(
                    code,
                    RequirementSource::Coordination,
                    format!("coordination group {}", group.group_name),
                    Some(self.config.coordination_confidence),
                );
            }
        }

        let augmentation = if self.augmentation.is_empty() {
            Vec::new()
        } else {
            self.augmentation.collect(directive, phase).await
        };
        for s in &augmentation {
            let code = &s.suggestion.code;
            if !self.catalog.is_available(code, phase) {
                skipped.push(SkippedSuggestion {
                    code: code.clone(),
                    source: RequirementSource::Augmentation,
                    reason: format!("{} not available in {} ({})", code, phase, s.source),
                });
                continue;
            }
            requirements.add(
                code,
                RequirementSource::Augmentation,
                format!("{}: {}", s.source, s.suggestion.reason),
                None,
            );
        }

        tracing::info!(
            directive = %directive.id,
            phase = %phase,
            required = requirements.len(),
            mandatory = mandatory.len(),
            "selection complete"
        );

        Ok(SelectionOutcome {
            requirements,
            domain_scores,
            coordination,
            augmentation,
            skipped,
        })
    }
}
