//! Phase x directive-type table of capabilities that must always run.
//!
//! Lookups are `phase -> directive type -> codes`. The `refactor` type
//! branches once more on intensity, and each intensity tier must be a strict
//! superset of the tier below it. A type that should skip a capability
//! (documentation skipping TESTING, for example) simply omits it; there is
//! no exemption list.

use std::collections::{BTreeMap, BTreeSet};

use crate::directive::{DirectiveType, IntensityLevel};
use crate::phase::Phase;

/// Intensity used when a refactor directive does not declare one.
pub const DEFAULT_REFACTOR_INTENSITY: IntensityLevel = IntensityLevel::Structural;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MandatoryEntry {
    Fixed(Vec<String>),
    ByIntensity(BTreeMap<IntensityLevel, Vec<String>>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MandatoryMatrix {
    table: BTreeMap<Phase, BTreeMap<DirectiveType, MandatoryEntry>>,
    universal: BTreeMap<Phase, Vec<String>>,
}

fn codes(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl MandatoryMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, phase: Phase, directive_type: DirectiveType, list: &[&str]) -> Self {
        self.table
            .entry(phase)
            .or_default()
            .insert(directive_type, MandatoryEntry::Fixed(codes(list)));
        self
    }

    /// Register per-intensity lists for `directive_type` in `phase`.
    pub fn with_intensity_entry(
        mut self,
        phase: Phase,
        directive_type: DirectiveType,
        tiers: &[(IntensityLevel, &[&str])],
    ) -> Self {
        let map = tiers
            .iter()
            .map(|(level, list)| (*level, codes(list)))
            .collect();
        self.table
            .entry(phase)
            .or_default()
            .insert(directive_type, MandatoryEntry::ByIntensity(map));
        self
    }

    /// Codes required in `phase` for every directive type.
    pub fn with_universal(mut self, phase: Phase, list: &[&str]) -> Self {
        self.universal.entry(phase).or_default().extend(codes(list));
        self
    }

    /// Capabilities that must run for this phase, type and intensity.
    pub fn mandatory_for(
        &self,
        phase: Phase,
        directive_type: DirectiveType,
        intensity: Option<IntensityLevel>,
    ) -> BTreeSet<String> {
        let mut out: BTreeSet<String> = self
            .universal
            .get(&phase)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default();

        let entry = self
            .table
            .get(&phase)
            .and_then(|by_type| by_type.get(&directive_type));
        match entry {
            Some(MandatoryEntry::Fixed(list)) => out.extend(list.iter().cloned()),
            Some(MandatoryEntry::ByIntensity(tiers)) => {
                let level = intensity.unwrap_or(DEFAULT_REFACTOR_INTENSITY);
                if let Some(list) = tiers.get(&level) {
                    out.extend(list.iter().cloned());
                }
            }
            None => {}
        }
        out
    }

    /// Every code the matrix can ever require.
    pub fn all_codes(&self) -> BTreeSet<String> {
        let mut out: BTreeSet<String> = self.universal.values().flatten().cloned().collect();
        for by_type in self.table.values() {
            for entry in by_type.values() {
                match entry {
                    MandatoryEntry::Fixed(list) => out.extend(list.iter().cloned()),
                    MandatoryEntry::ByIntensity(tiers) => {
                        out.extend(tiers.values().flatten().cloned())
                    }
                }
            }
        }
        out
    }

    /// Check that intensity tiers nest as strictly increasing supersets.
    ///
    /// Returns one message per violation.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (phase, by_type) in &self.table {
            for (directive_type, entry) in by_type {
                let MandatoryEntry::ByIntensity(tiers) = entry else {
                    continue;
                };
                let ordered: Vec<_> = tiers.iter().collect();
                for pair in ordered.windows(2) {
                    let (lower_level, lower) = pair[0];
                    let (upper_level, upper) = pair[1];
                    let lower: BTreeSet<_> = lower.iter().collect();
                    let upper: BTreeSet<_> = upper.iter().collect();
                    if !(lower.is_subset(&upper) && upper.len() > lower.len()) {
                        problems.push(format!(
                            "{} {}: {} is not a strict superset of {}",
                            phase, directive_type, upper_level, lower_level
                        ));
                    }
                }
            }
        }
        problems
    }

    pub fn builtin() -> Self {
        use DirectiveType::*;
        use IntensityLevel::*;
        use Phase::*;

        let refactor_tiers: &[(IntensityLevel, &[&str])] = &[
            (Cosmetic, &["REGRESSION"]),
            (Structural, &["REGRESSION", "VALIDATION"]),
            (Architectural, &["REGRESSION", "VALIDATION", "TESTING", "RISK"]),
        ];

        Self::new()
            // LEAD_PRE_APPROVAL
            .with_entry(LeadPreApproval, Feature, &["VALIDATION"])
            .with_entry(LeadPreApproval, Implementation, &["VALIDATION"])
            .with_entry(LeadPreApproval, Infrastructure, &["VALIDATION"])
            .with_entry(LeadPreApproval, Database, &["DATABASE", "VALIDATION"])
            .with_entry(LeadPreApproval, Security, &["SECURITY", "RISK"])
            .with_entry(LeadPreApproval, Bugfix, &["RCA"])
            .with_entry(LeadPreApproval, Performance, &["PERFORMANCE"])
            .with_intensity_entry(
                LeadPreApproval,
                Refactor,
                &[
                    (Cosmetic, &["VALIDATION"]),
                    (Structural, &["VALIDATION", "REGRESSION"]),
                    (Architectural, &["VALIDATION", "REGRESSION", "RISK"]),
                ],
            )
            // PLAN_PRD
            .with_entry(PlanPrd, Feature, &["DESIGN", "STORIES"])
            .with_entry(PlanPrd, Implementation, &["STORIES"])
            .with_entry(PlanPrd, Infrastructure, &["GITHUB"])
            .with_entry(PlanPrd, Database, &["DATABASE", "SECURITY"])
            .with_entry(PlanPrd, Security, &["SECURITY", "DATABASE"])
            .with_entry(PlanPrd, Documentation, &["DOCMON"])
            .with_entry(PlanPrd, Bugfix, &["RCA"])
            .with_entry(PlanPrd, Performance, &["PERFORMANCE"])
            .with_intensity_entry(PlanPrd, Refactor, refactor_tiers)
            // EXEC_IMPL
            .with_entry(ExecImpl, Feature, &["TESTING", "DESIGN"])
            .with_entry(ExecImpl, Implementation, &["TESTING"])
            .with_entry(ExecImpl, Infrastructure, &["GITHUB", "DOCMON"])
            .with_entry(ExecImpl, Database, &["DATABASE", "SECURITY"])
            .with_entry(ExecImpl, Security, &["SECURITY", "DATABASE", "TESTING"])
            .with_entry(ExecImpl, Documentation, &["DOCMON"])
            .with_entry(ExecImpl, Bugfix, &["RCA", "REGRESSION", "TESTING"])
            .with_entry(ExecImpl, Performance, &["PERFORMANCE", "TESTING"])
            .with_intensity_entry(ExecImpl, Refactor, refactor_tiers)
            // PLAN_VERIFY
            .with_entry(PlanVerify, Feature, &["TESTING", "UAT", "STORIES"])
            .with_entry(PlanVerify, Implementation, &["TESTING"])
            .with_entry(PlanVerify, Infrastructure, &["GITHUB"])
            .with_entry(PlanVerify, Database, &["DATABASE"])
            .with_entry(PlanVerify, Security, &["SECURITY", "TESTING"])
            .with_entry(PlanVerify, Documentation, &["DOCMON"])
            .with_entry(PlanVerify, Bugfix, &["REGRESSION", "TESTING"])
            .with_entry(PlanVerify, Performance, &["PERFORMANCE", "REGRESSION"])
            .with_intensity_entry(PlanVerify, Refactor, refactor_tiers)
            // LEAD_FINAL
            .with_universal(LeadFinal, &["RETRO"])
            .with_entry(LeadFinal, Security, &["SECURITY"])
            .with_intensity_entry(LeadFinal, Refactor, refactor_tiers)
    }
}
