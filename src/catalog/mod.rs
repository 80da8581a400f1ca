//! Capability catalog.
//!
//! A capability is a pluggable validation routine (security review, schema
//! check, test audit...) identified by a short uppercase code. The catalog
//! holds the static definitions the selector and engine work from:
//! activity, priority, phase applicability and an optional keyword profile.
//!
//! Definitions come from a [`CatalogSource`], which is queried once per run.
//! [`StaticCatalog`] serves the built-in set, optionally adjusted by
//! [`CapabilityOverride`] entries from configuration.

mod builtin;

pub use builtin::builtin_capabilities;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::phase::Phase;
use crate::verdict::Severity;

/// Per-context weights used when scoring directive text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextWeights {
    #[serde(default = "default_title_weight")]
    pub title: f64,
    #[serde(default = "default_description_weight")]
    pub description: f64,
    #[serde(default = "default_content_weight")]
    pub content: f64,
}

fn default_title_weight() -> f64 {
    3.0
}

fn default_description_weight() -> f64 {
    2.0
}

fn default_content_weight() -> f64 {
    1.0
}

impl Default for ContextWeights {
    fn default() -> Self {
        Self {
            title: default_title_weight(),
            description: default_description_weight(),
            content: default_content_weight(),
        }
    }
}

/// Keyword profile for one capability domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainProfile {
    pub primary: Vec<String>,
    #[serde(default)]
    pub secondary: Vec<String>,
    /// Phrases that void every keyword match in a context they appear in.
    #[serde(default)]
    pub exclusions: Vec<String>,
    #[serde(default)]
    pub weights: ContextWeights,
    #[serde(default = "default_min_matches")]
    pub min_matches: usize,
}

fn default_min_matches() -> usize {
    2
}

impl DomainProfile {
    pub fn new(primary: &[&str], secondary: &[&str]) -> Self {
        Self {
            primary: primary.iter().map(|s| s.to_string()).collect(),
            secondary: secondary.iter().map(|s| s.to_string()).collect(),
            exclusions: Vec::new(),
            weights: ContextWeights::default(),
            min_matches: default_min_matches(),
        }
    }

    pub fn with_exclusions(mut self, exclusions: &[&str]) -> Self {
        self.exclusions = exclusions.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_min_matches(mut self, min_matches: usize) -> Self {
        self.min_matches = min_matches;
        self
    }

    pub fn with_weights(mut self, weights: ContextWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Total number of keywords the profile can match.
    pub fn keyword_inventory(&self) -> usize {
        self.primary.len() + self.secondary.len()
    }
}

/// Static definition of one capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDefinition {
    pub code: String,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    pub priority: i64,
    /// Phases the capability runs in. Empty means every phase.
    #[serde(default)]
    pub phases: Vec<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<DomainProfile>,
}

fn default_active() -> bool {
    true
}

impl CapabilityDefinition {
    pub fn new(code: impl Into<String>, name: impl Into<String>, priority: i64) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            active: true,
            priority,
            phases: Vec::new(),
            profile: None,
        }
    }

    pub fn with_phases(mut self, phases: &[Phase]) -> Self {
        self.phases = phases.to_vec();
        self
    }

    pub fn with_profile(mut self, profile: DomainProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn applies_to(&self, phase: Phase) -> bool {
        self.phases.is_empty() || self.phases.contains(&phase)
    }

    /// Severity tier derived from the static priority.
    pub fn severity(&self) -> Severity {
        Severity::from_priority(self.priority)
    }
}

/// Configuration-level adjustment of a catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityOverride {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_matches: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_primary: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_secondary: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_exclusions: Vec<String>,
}

impl CapabilityOverride {
    /// Apply this override to a definition with a matching code.
    pub fn apply(&self, def: &mut CapabilityDefinition) {
        if let Some(active) = self.active {
            def.active = active;
        }
        if let Some(priority) = self.priority {
            def.priority = priority;
        }
        let touches_profile = self.min_matches.is_some()
            || !self.extra_primary.is_empty()
            || !self.extra_secondary.is_empty()
            || !self.extra_exclusions.is_empty();
        if !touches_profile {
            return;
        }
        let profile = def
            .profile
            .get_or_insert_with(|| DomainProfile::new(&[], &[]));
        if let Some(min) = self.min_matches {
            profile.min_matches = min;
        }
        extend_unique(&mut profile.primary, &self.extra_primary);
        extend_unique(&mut profile.secondary, &self.extra_secondary);
        extend_unique(&mut profile.exclusions, &self.extra_exclusions);
    }
}

fn extend_unique(target: &mut Vec<String>, extra: &[String]) {
    for item in extra {
        if !target.iter().any(|t| t.eq_ignore_ascii_case(item)) {
            target.push(item.clone());
        }
    }
}

/// The set of capability definitions loaded for one run, keyed by code.
#[derive(Debug, Clone, Default)]
pub struct CapabilityCatalog {
    by_code: BTreeMap<String, CapabilityDefinition>,
}

impl CapabilityCatalog {
    pub fn new(definitions: Vec<CapabilityDefinition>) -> Self {
        let by_code = definitions
            .into_iter()
            .map(|d| (d.code.clone(), d))
            .collect();
        Self { by_code }
    }

    pub fn get(&self, code: &str) -> Option<&CapabilityDefinition> {
        self.by_code.get(code)
    }

    /// Whether `code` names an active capability.
    pub fn is_active(&self, code: &str) -> bool {
        self.get(code).is_some_and(|d| d.active)
    }

    /// Whether `code` is active and runs in `phase`.
    pub fn is_available(&self, code: &str, phase: Phase) -> bool {
        self.get(code).is_some_and(|d| d.active && d.applies_to(phase))
    }

    /// Active capabilities applicable to `phase`, in code order.
    pub fn available_for(&self, phase: Phase) -> impl Iterator<Item = &CapabilityDefinition> {
        self.by_code
            .values()
            .filter(move |d| d.active && d.applies_to(phase))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapabilityDefinition> {
        self.by_code.values()
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

/// Where capability definitions come from.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Load every active capability definition.
    async fn load_active(&self) -> Result<Vec<CapabilityDefinition>>;
}

/// Catalog source backed by a fixed list of definitions.
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    definitions: Vec<CapabilityDefinition>,
}

impl StaticCatalog {
    pub fn new(definitions: Vec<CapabilityDefinition>) -> Self {
        Self { definitions }
    }

    /// The built-in catalog with `overrides` applied in order.
    ///
    /// Returns the override codes that matched nothing alongside the catalog.
    pub fn builtin_with_overrides(overrides: &[CapabilityOverride]) -> (Self, Vec<String>) {
        let mut definitions = builtin_capabilities();
        let mut unknown = Vec::new();
        for ov in overrides {
            match definitions.iter_mut().find(|d| d.code == ov.code) {
                Some(def) => ov.apply(def),
                None => unknown.push(ov.code.clone()),
            }
        }
        (Self { definitions }, unknown)
    }
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self::new(builtin_capabilities())
    }
}

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn load_active(&self) -> Result<Vec<CapabilityDefinition>> {
        Ok(self
            .definitions
            .iter()
            .filter(|d| d.active)
            .cloned()
            .collect())
    }
}
