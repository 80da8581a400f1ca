//! The resolved set of capabilities a phase requires, with provenance.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Which signal put a capability into the requirement set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequirementSource {
    Mandatory,
    Keyword,
    Coordination,
    Augmentation,
}

impl fmt::Display for RequirementSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Mandatory => "mandatory",
            Self::Keyword => "keyword",
            Self::Coordination => "coordination",
            Self::Augmentation => "augmentation",
        };
        f.write_str(s)
    }
}

/// One required capability and every reason it was required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementEntry {
    pub code: String,
    pub sources: BTreeSet<RequirementSource>,
    pub reasons: Vec<String>,
    /// Highest selection confidence any source reported. `None` when only
    /// unscored sources (mandatory, augmentation) contributed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
}

impl RequirementEntry {
    pub fn is_mandatory(&self) -> bool {
        self.sources.contains(&RequirementSource::Mandatory)
    }
}

/// Union of requirements from every selection signal.
///
/// Entries can only be added or enriched. There is no removal operation, so
/// a capability contributed by one source can never be dropped by another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequirementSet {
    entries: BTreeMap<String, RequirementEntry>,
}

impl RequirementSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a requirement. Returns `true` if `code` was not yet required.
    pub fn add(
        &mut self,
        code: &str,
        source: RequirementSource,
        reason: impl Into<String>,
        confidence: Option<u8>,
    ) -> bool {
        let reason = reason.into();
        let mut inserted = false;
        let entry = self.entries.entry(code.to_string()).or_insert_with(|| {
            inserted = true;
            RequirementEntry {
                code: code.to_string(),
                sources: BTreeSet::new(),
                reasons: Vec::new(),
                confidence: None,
            }
        });
        entry.sources.insert(source);
        if !reason.is_empty() && !entry.reasons.contains(&reason) {
            entry.reasons.push(reason);
        }
        entry.confidence = match (entry.confidence, confidence) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        inserted
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    pub fn get(&self, code: &str) -> Option<&RequirementEntry> {
        self.entries.get(code)
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RequirementEntry> {
        self.entries.values()
    }

    pub fn mandatory_codes(&self) -> impl Iterator<Item = &str> {
        self.entries
            .values()
            .filter(|e| e.is_mandatory())
            .map(|e| e.code.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_merges_sources_and_reasons() {
        let mut set = RequirementSet::new();
        assert!(set.add("DATABASE", RequirementSource::Keyword, "keyword match", Some(80)));
        assert!(!set.add(
            "DATABASE",
            RequirementSource::Coordination,
            "AUTHENTICATION group",
            Some(60)
        ));
        assert!(!set.add("DATABASE", RequirementSource::Keyword, "keyword match", None));

        let entry = set.get("DATABASE").unwrap();
        assert_eq!(entry.sources.len(), 2);
        assert_eq!(entry.reasons.len(), 2);
        assert_eq!(entry.confidence, Some(80));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_mandatory_survives_any_later_merge() {
        let mut set = RequirementSet::new();
        set.add("TESTING", RequirementSource::Mandatory, "feature @ EXEC_IMPL", None);
        set.add("TESTING", RequirementSource::Augmentation, "", None);
        assert!(set.get("TESTING").unwrap().is_mandatory());
        assert_eq!(set.mandatory_codes().collect::<Vec<_>>(), vec!["TESTING"]);
    }

    #[test]
    fn test_confidence_fills_from_later_source() {
        let mut set = RequirementSet::new();
        set.add("SECURITY", RequirementSource::Mandatory, "m", None);
        set.add("SECURITY", RequirementSource::Coordination, "c", Some(60));
        assert_eq!(set.get("SECURITY").unwrap().confidence, Some(60));
    }

    #[test]
    fn test_serializes_as_map_keyed_by_code() {
        let mut set = RequirementSet::new();
        set.add("UAT", RequirementSource::Keyword, "k", Some(45));
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["UAT"]["sources"][0], "keyword");
        assert_eq!(json["UAT"]["confidence"], 45);
    }
}
