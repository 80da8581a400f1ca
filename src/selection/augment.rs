//! Best-effort augmentation sources.
//!
//! Augmentation runs after keyword, coordination and mandatory resolution
//! and can only add capabilities. Every source runs concurrently under its
//! own timeout; an error or a timeout is logged and treated as "no
//! suggestions", so a broken source can never block a gate.
//!
//! Two sources ship with the crate:
//! - [`ImpactClassifier`] infers impact categories from directive text
//! - [`HistoricalPatternMatcher`] matches text against recorded issue patterns

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::scorer::compile_keywords;
use crate::directive::{Directive, DirectiveType};
use crate::phase::Phase;

pub const DEFAULT_AUGMENTATION_TIMEOUT_SECS: u64 = 10;

/// A capability an augmentation source thinks should also run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub code: String,
    pub reason: String,
}

impl Suggestion {
    pub fn new(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait AugmentationSource: Send + Sync {
    fn name(&self) -> &str;

    async fn suggest(&self, directive: &Directive, phase: Phase) -> Result<Vec<Suggestion>>;
}

/// A suggestion tagged with the source that made it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourcedSuggestion {
    pub source: String,
    #[serde(flatten)]
    pub suggestion: Suggestion,
}

/// Runs every augmentation source concurrently with failure isolation.
#[derive(Clone)]
pub struct AugmentationRunner {
    sources: Vec<Arc<dyn AugmentationSource>>,
    timeout: Duration,
}

impl AugmentationRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sources: Vec::new(),
            timeout,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn AugmentationSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub async fn collect(&self, directive: &Directive, phase: Phase) -> Vec<SourcedSuggestion> {
        let futures: Vec<_> = self
            .sources
            .iter()
            .map(|source| async move {
                let name = source.name().to_string();
                match tokio::time::timeout(self.timeout, source.suggest(directive, phase)).await {
                    Ok(Ok(suggestions)) => suggestions
                        .into_iter()
                        .map(|suggestion| SourcedSuggestion {
                            source: name.clone(),
                            suggestion,
                        })
                        .collect(),
                    Ok(Err(e)) => {
                        tracing::warn!(source = %name, error = %e, "augmentation source failed");
                        Vec::new()
                    }
                    Err(_) => {
                        tracing::warn!(
                            source = %name,
                            timeout_secs = self.timeout.as_secs(),
                            "augmentation source timed out"
                        );
                        Vec::new()
                    }
                }
            })
            .collect();

        join_all(futures).await.into_iter().flatten().collect()
    }
}

// =========================================
// Impact classifier
// =========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactRule {
    pub category: String,
    pub keywords: Vec<String>,
    pub capabilities: Vec<String>,
}

impl ImpactRule {
    fn new(category: &str, keywords: &[&str], capabilities: &[&str]) -> Self {
        Self {
            category: category.to_string(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            capabilities: capabilities.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub fn builtin_impact_rules() -> Vec<ImpactRule> {
    vec![
        ImpactRule::new(
            "breaking_change",
            &["breaking change", "deprecate", "deprecation", "remove support", "rename"],
            &["REGRESSION"],
        ),
        ImpactRule::new(
            "user_facing",
            &["customer", "customers", "end user", "end users", "onboarding", "checkout"],
            &["UAT", "DESIGN"],
        ),
        ImpactRule::new(
            "data_integrity",
            &["data loss", "backfill", "delete", "truncate", "data migration", "integrity"],
            &["DATABASE", "VALIDATION"],
        ),
        ImpactRule::new(
            "production_rollout",
            &["production", "rollout", "feature flag", "canary", "hotfix"],
            &["GITHUB", "RISK"],
        ),
        ImpactRule::new(
            "external_integration",
            &["third-party", "third party", "webhook", "stripe", "integration with", "external api"],
            &["SECURITY", "TESTING"],
        ),
    ]
}

/// Infers impact categories from directive text.
#[derive(Debug, Clone)]
pub struct ImpactClassifier {
    rules: Vec<(ImpactRule, Vec<Regex>)>,
}

impl ImpactClassifier {
    pub fn new(rules: Vec<ImpactRule>) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let matchers: Vec<Regex> = compile_keywords(&rule.keywords)?
                    .into_iter()
                    .map(|(_, re)| re)
                    .collect();
                Ok((rule, matchers))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn builtin() -> Result<Self> {
        Self::new(builtin_impact_rules())
    }

    /// Impact categories detected in `text`.
    pub fn classify(&self, text: &str) -> Vec<&ImpactRule> {
        self.rules
            .iter()
            .filter(|(_, matchers)| matchers.iter().any(|re| re.is_match(text)))
            .map(|(rule, _)| rule)
            .collect()
    }
}

#[async_trait]
impl AugmentationSource for ImpactClassifier {
    fn name(&self) -> &str {
        "impact-classifier"
    }

    async fn suggest(&self, directive: &Directive, _phase: Phase) -> Result<Vec<Suggestion>> {
        let text = directive.full_content();
        Ok(self
            .classify(&text)
            .into_iter()
            .flat_map(|rule| {
                rule.capabilities
                    .iter()
                    .map(|code| Suggestion::new(code, format!("inferred impact: {}", rule.category)))
            })
            .collect())
    }
}

// =========================================
// Historical pattern matcher
// =========================================

/// A recurring issue recorded from past gate runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuePattern {
    pub pattern_id: String,
    pub category: String,
    pub summary: String,
    pub keywords: Vec<String>,
    pub capabilities: Vec<String>,
    pub occurrences: u32,
    /// Directive types the pattern applies to. Empty means all.
    #[serde(default)]
    pub directive_types: Vec<DirectiveType>,
}

#[async_trait]
pub trait PatternSource: Send + Sync {
    async fn load_patterns(&self) -> Result<Vec<IssuePattern>>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryPatterns {
    patterns: Vec<IssuePattern>,
}

impl InMemoryPatterns {
    pub fn new(patterns: Vec<IssuePattern>) -> Self {
        Self { patterns }
    }
}

#[async_trait]
impl PatternSource for InMemoryPatterns {
    async fn load_patterns(&self) -> Result<Vec<IssuePattern>> {
        Ok(self.patterns.clone())
    }
}

pub const DEFAULT_PATTERN_MIN_KEYWORD_HITS: usize = 2;
pub const DEFAULT_PATTERN_MIN_OCCURRENCES: u32 = 2;

/// Keyword matchers for one pattern, valid while its keywords are unchanged.
struct CompiledPattern {
    keywords: Vec<String>,
    matchers: Arc<Vec<Regex>>,
}

/// Suggests capabilities that caught similar issues before.
#[derive(Clone)]
pub struct HistoricalPatternMatcher {
    source: Arc<dyn PatternSource>,
    min_keyword_hits: usize,
    min_occurrences: u32,
    compiled: Arc<DashMap<String, CompiledPattern>>,
}

impl HistoricalPatternMatcher {
    pub fn new(source: Arc<dyn PatternSource>) -> Self {
        Self {
            source,
            min_keyword_hits: DEFAULT_PATTERN_MIN_KEYWORD_HITS,
            min_occurrences: DEFAULT_PATTERN_MIN_OCCURRENCES,
            compiled: Arc::new(DashMap::new()),
        }
    }

    /// Matchers for `pattern`, compiled on first use and again only when
    /// its keywords change. Blank keywords are dropped.
    fn matchers(&self, pattern: &IssuePattern) -> Result<Arc<Vec<Regex>>> {
        if let Some(entry) = self.compiled.get(&pattern.pattern_id)
            && entry.keywords == pattern.keywords
        {
            return Ok(entry.matchers.clone());
        }
        let matchers: Arc<Vec<Regex>> = Arc::new(
            compile_keywords(&pattern.keywords)?
                .into_iter()
                .map(|(_, re)| re)
                .collect(),
        );
        self.compiled.insert(
            pattern.pattern_id.clone(),
            CompiledPattern {
                keywords: pattern.keywords.clone(),
                matchers: matchers.clone(),
            },
        );
        Ok(matchers)
    }

    pub fn with_min_keyword_hits(mut self, hits: usize) -> Self {
        self.min_keyword_hits = hits;
        self
    }

    pub fn with_min_occurrences(mut self, occurrences: u32) -> Self {
        self.min_occurrences = occurrences;
        self
    }
}

#[async_trait]
impl AugmentationSource for HistoricalPatternMatcher {
    fn name(&self) -> &str {
        "historical-patterns"
    }

    async fn suggest(&self, directive: &Directive, _phase: Phase) -> Result<Vec<Suggestion>> {
        let patterns = self.source.load_patterns().await?;
        let text = directive.full_content();
        let mut out = Vec::new();

        for pattern in patterns {
            if pattern.occurrences < self.min_occurrences {
                continue;
            }
            if !pattern.directive_types.is_empty()
                && !pattern.directive_types.contains(&directive.directive_type)
            {
                continue;
            }
            let hits = self
                .matchers(&pattern)?
                .iter()
                .filter(|re| re.is_match(&text))
                .count();
            if hits < self.min_keyword_hits {
                continue;
            }
            for code in &pattern.capabilities {
                out.push(Suggestion::new(
                    code,
                    format!(
                        "matches pattern {} ({} prior occurrences)",
                        pattern.pattern_id, pattern.occurrences
                    ),
                ));
            }
        }
        Ok(out)
    }
}
