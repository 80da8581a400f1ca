//! Weighted keyword scoring of directive text against domain profiles.
//!
//! Directive text is split into three contexts (title, description, full
//! content), each with its own weight. Per context:
//!
//! - every primary keyword present adds `weight * 2`
//! - every secondary keyword present adds `weight`
//! - a keyword counts once, however often it repeats
//! - if any exclusion phrase is present, the whole context scores zero
//!
//! Confidence is the weighted score against a fixed ceiling, capped at 100.
//! A domain is recommended only when it clears both its minimum distinct
//! match count and the confidence threshold.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::catalog::{CapabilityCatalog, ContextWeights, DomainProfile};
use crate::directive::Directive;
use crate::phase::Phase;

/// Default confidence a domain must reach to be recommended.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 40.0;

/// Default score at which confidence saturates at 100%.
pub const DEFAULT_NORMALIZATION_CEILING: f64 = 24.0;

/// The three text contexts a directive is scored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    Title,
    Description,
    Content,
}

impl ContextKind {
    fn weight(&self, weights: &ContextWeights) -> f64 {
        match self {
            Self::Title => weights.title,
            Self::Description => weights.description,
            Self::Content => weights.content,
        }
    }
}

/// Directive text split into scoring contexts.
#[derive(Debug, Clone, Default)]
pub struct TextContexts {
    pub title: String,
    pub description: String,
    pub content: String,
}

impl TextContexts {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            content: content.into(),
        }
    }

    /// Title and description only; content is the two joined.
    pub fn from_title_description(title: &str, description: &str) -> Self {
        let content = [title, description]
            .iter()
            .filter(|s| !s.trim().is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n");
        Self::new(title, description, content)
    }

    pub fn from_directive(directive: &Directive) -> Self {
        Self::new(
            directive.title.clone(),
            directive.description.clone(),
            directive.full_content(),
        )
    }

    fn iter(&self) -> [(ContextKind, &str); 3] {
        [
            (ContextKind::Title, self.title.as_str()),
            (ContextKind::Description, self.description.as_str()),
            (ContextKind::Content, self.content.as_str()),
        ]
    }
}

/// Scoring detail for one context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextBreakdown {
    pub context: ContextKind,
    pub weight: f64,
    pub primary_hits: Vec<String>,
    pub secondary_hits: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded_by: Option<String>,
    pub score: f64,
}

/// Result of scoring one profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileScore {
    pub score: f64,
    /// Rounded for display; recommendation uses `exact_confidence`.
    pub confidence: u8,
    pub exact_confidence: f64,
    pub matched_count: usize,
    pub meets_minimum: bool,
    pub matched_keywords: Vec<String>,
    pub breakdown: Vec<ContextBreakdown>,
}

/// Result of scoring one capability, including the recommendation decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainScore {
    pub code: String,
    #[serde(flatten)]
    pub detail: ProfileScore,
    pub recommended: bool,
}

/// Build a case-insensitive whole-word matcher for a keyword or phrase.
///
/// Internal whitespace in a phrase matches any run of whitespace. Word
/// boundaries are only anchored at alphanumeric edges, so keywords such as
/// `ci/cd` or `a/b test` still match. A blank keyword is an error, since it
/// would match any text.
pub fn keyword_regex(keyword: &str) -> Result<Regex> {
    if keyword.trim().is_empty() {
        anyhow::bail!("Keyword must not be blank");
    }
    let words: Vec<String> = keyword.split_whitespace().map(regex::escape).collect();
    let body = words.join(r"\s+");
    let starts_word = keyword
        .trim()
        .chars()
        .next()
        .is_some_and(|c| c.is_alphanumeric() || c == '_');
    let ends_word = keyword
        .trim()
        .chars()
        .last()
        .is_some_and(|c| c.is_alphanumeric() || c == '_');
    let pattern = format!(
        "(?i){}{}{}",
        if starts_word { r"\b" } else { "" },
        body,
        if ends_word { r"\b" } else { "" }
    );
    Regex::new(&pattern).with_context(|| format!("Invalid keyword pattern '{}'", keyword))
}

/// Compile keyword matchers paired with their lowercased keyword, skipping
/// blank entries.
pub(crate) fn compile_keywords(keywords: &[String]) -> Result<Vec<(String, Regex)>> {
    keywords
        .iter()
        .filter(|k| !k.trim().is_empty())
        .map(|k| Ok((k.to_lowercase(), keyword_regex(k)?)))
        .collect()
}

/// A domain profile with its keyword matchers compiled.
#[derive(Debug, Clone)]
pub struct CompiledProfile {
    primary: Vec<(String, Regex)>,
    secondary: Vec<(String, Regex)>,
    exclusions: Vec<(String, Regex)>,
    weights: ContextWeights,
    min_matches: usize,
    inventory: usize,
}

impl CompiledProfile {
    pub fn compile(profile: &DomainProfile) -> Result<Self> {
        Ok(Self {
            primary: compile_keywords(&profile.primary)?,
            secondary: compile_keywords(&profile.secondary)?,
            exclusions: compile_keywords(&profile.exclusions)?,
            weights: profile.weights,
            min_matches: profile.min_matches,
            inventory: profile.keyword_inventory(),
        })
    }

    pub fn score(&self, contexts: &TextContexts, ceiling: f64) -> ProfileScore {
        let mut total = 0.0;
        let mut matched: BTreeSet<String> = BTreeSet::new();
        let mut breakdown = Vec::with_capacity(3);

        for (kind, text) in contexts.iter() {
            let weight = kind.weight(&self.weights);
            let excluded_by = self
                .exclusions
                .iter()
                .find(|(_, re)| re.is_match(text))
                .map(|(phrase, _)| phrase.clone());

            let (primary_hits, secondary_hits) = if excluded_by.is_some() {
                (Vec::new(), Vec::new())
            } else {
                (hits(&self.primary, text), hits(&self.secondary, text))
            };

            let score = primary_hits.len() as f64 * weight * 2.0
                + secondary_hits.len() as f64 * weight;
            total += score;
            matched.extend(primary_hits.iter().cloned());
            matched.extend(secondary_hits.iter().cloned());

            breakdown.push(ContextBreakdown {
                context: kind,
                weight,
                primary_hits,
                secondary_hits,
                excluded_by,
                score,
            });
        }

        let matched_count = matched.len().min(self.inventory);
        ProfileScore {
            score: total,
            confidence: confidence_percent(total, ceiling),
            exact_confidence: confidence_ratio(total, ceiling),
            matched_count,
            meets_minimum: matched_count >= self.min_matches,
            matched_keywords: matched.into_iter().collect(),
            breakdown,
        }
    }
}

fn hits(keywords: &[(String, Regex)], text: &str) -> Vec<String> {
    keywords
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(kw, _)| kw.clone())
        .collect()
}

/// `min(score / ceiling, 1) * 100`.
pub fn confidence_ratio(score: f64, ceiling: f64) -> f64 {
    if score <= 0.0 {
        return 0.0;
    }
    if ceiling <= 0.0 {
        return 100.0;
    }
    (score / ceiling).min(1.0) * 100.0
}

/// [`confidence_ratio`], rounded.
pub fn confidence_percent(score: f64, ceiling: f64) -> u8 {
    confidence_ratio(score, ceiling).round() as u8
}

/// Score text against a single profile.
pub fn score(contexts: &TextContexts, profile: &DomainProfile, ceiling: f64) -> Result<ProfileScore> {
    Ok(CompiledProfile::compile(profile)?.score(contexts, ceiling))
}

#[derive(Debug, Clone, Copy)]
pub struct ScoringConfig {
    pub threshold: f64,
    pub normalization_ceiling: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            normalization_ceiling: DEFAULT_NORMALIZATION_CEILING,
        }
    }
}

/// Scores every profiled capability in a catalog.
#[derive(Debug, Clone)]
pub struct DomainScorer {
    profiles: Vec<(String, CompiledProfile)>,
    config: ScoringConfig,
}

impl DomainScorer {
    /// Compile the keyword profiles of every capability in `catalog`.
    pub fn new(catalog: &CapabilityCatalog, config: ScoringConfig) -> Result<Self> {
        let mut profiles = Vec::new();
        for def in catalog.iter() {
            if let Some(profile) = &def.profile {
                let compiled = CompiledProfile::compile(profile)
                    .with_context(|| format!("Failed to compile profile for {}", def.code))?;
                profiles.push((def.code.clone(), compiled));
            }
        }
        Ok(Self { profiles, config })
    }

    pub fn config(&self) -> ScoringConfig {
        self.config
    }

    /// Score one capability by code. `None` if it has no profile.
    pub fn score_code(&self, code: &str, contexts: &TextContexts) -> Option<DomainScore> {
        self.profiles
            .iter()
            .find(|(c, _)| c == code)
            .map(|(c, p)| self.to_domain_score(c, p, contexts))
    }

    /// Score every profiled capability available in `phase`.
    pub fn score_all(
        &self,
        catalog: &CapabilityCatalog,
        phase: Phase,
        contexts: &TextContexts,
    ) -> Vec<DomainScore> {
        self.profiles
            .iter()
            .filter(|(code, _)| catalog.is_available(code, phase))
            .map(|(code, profile)| self.to_domain_score(code, profile, contexts))
            .collect()
    }

    /// Score every profiled capability regardless of phase.
    pub fn score_any_phase(&self, contexts: &TextContexts) -> Vec<DomainScore> {
        self.profiles
            .iter()
            .map(|(code, profile)| self.to_domain_score(code, profile, contexts))
            .collect()
    }

    fn to_domain_score(
        &self,
        code: &str,
        profile: &CompiledProfile,
        contexts: &TextContexts,
    ) -> DomainScore {
        let detail = profile.score(contexts, self.config.normalization_ceiling);
        let recommended =
            detail.meets_minimum && detail.exact_confidence >= self.config.threshold;
        tracing::debug!(
            capability = code,
            score = detail.score,
            confidence = detail.confidence,
            matched = detail.matched_count,
            recommended,
            "scored domain"
        );
        DomainScore {
            code: code.to_string(),
            detail,
            recommended,
        }
    }
}
