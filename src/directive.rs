//! Directives and their resolution.
//!
//! A [`Directive`] is the read-only work item whose text drives capability
//! selection. Callers refer to directives by several identifiers; the
//! [`DirectiveResolver`] tries them in a fixed order:
//!
//! 1. primary key (`uuid`)
//! 2. literal id (`id`)
//! 3. legacy key (`legacy_id`)
//! 4. human key (`key`)
//!
//! The first hit wins. A repository error at any step aborts resolution;
//! it is never treated as "not found".

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::{GateError, GateResult};

/// Category of a directive. Drives the mandatory matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectiveType {
    #[default]
    Feature,
    Implementation,
    Infrastructure,
    Database,
    Security,
    Documentation,
    Bugfix,
    Refactor,
    Performance,
    Orchestrator,
}

impl DirectiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Implementation => "implementation",
            Self::Infrastructure => "infrastructure",
            Self::Database => "database",
            Self::Security => "security",
            Self::Documentation => "documentation",
            Self::Bugfix => "bugfix",
            Self::Refactor => "refactor",
            Self::Performance => "performance",
            Self::Orchestrator => "orchestrator",
        }
    }

    /// Parse a type name, falling back to `Feature` for anything unknown.
    ///
    /// `Feature` carries the broadest mandatory set, so an unrecognized type
    /// is validated at least as thoroughly as a known one.
    ///
    /// ```
    /// use phasegate::directive::DirectiveType;
    ///
    /// assert_eq!(DirectiveType::parse_lenient("bug_fix"), DirectiveType::Bugfix);
    /// assert_eq!(DirectiveType::parse_lenient("spike"), DirectiveType::Feature);
    /// ```
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| {
            tracing::debug!(directive_type = s, "unknown directive type, treating as feature");
            Self::Feature
        })
    }
}

impl fmt::Display for DirectiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DirectiveType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "feature" => Ok(Self::Feature),
            "implementation" => Ok(Self::Implementation),
            "infrastructure" | "infra" => Ok(Self::Infrastructure),
            "database" | "db" => Ok(Self::Database),
            "security" => Ok(Self::Security),
            "documentation" | "docs" => Ok(Self::Documentation),
            "bugfix" | "bug_fix" | "fix" => Ok(Self::Bugfix),
            "refactor" | "refactoring" => Ok(Self::Refactor),
            "performance" | "perf" => Ok(Self::Performance),
            "orchestrator" | "parent" => Ok(Self::Orchestrator),
            _ => Err(format!("Unknown directive type '{}'", s)),
        }
    }
}

impl<'de> Deserialize<'de> for DirectiveType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse_lenient(&raw))
    }
}

/// How deep a refactor reaches. Ordered from least to most invasive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntensityLevel {
    Cosmetic,
    Structural,
    Architectural,
}

impl IntensityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosmetic => "cosmetic",
            Self::Structural => "structural",
            Self::Architectural => "architectural",
        }
    }
}

impl fmt::Display for IntensityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntensityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cosmetic" => Ok(Self::Cosmetic),
            "structural" => Ok(Self::Structural),
            "architectural" => Ok(Self::Architectural),
            _ => Err(format!(
                "Unknown intensity '{}'. Valid: cosmetic, structural, architectural",
                s
            )),
        }
    }
}

/// A unit of work submitted to the gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    pub uuid: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub objectives: Vec<String>,
    #[serde(default, rename = "type", alias = "directive_type")]
    pub directive_type: DirectiveType,
    #[serde(default)]
    pub priority: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<IntensityLevel>,
}

impl Directive {
    /// Create a directive with a fresh uuid and the given literal id and title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            id: id.into(),
            legacy_id: None,
            key: None,
            title: title.into(),
            description: String::new(),
            scope: String::new(),
            rationale: String::new(),
            objectives: Vec::new(),
            directive_type: DirectiveType::Feature,
            priority: 0,
            intensity: None,
        }
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }

    pub fn with_legacy_id(mut self, legacy_id: impl Into<String>) -> Self {
        self.legacy_id = Some(legacy_id.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn with_objectives(mut self, objectives: Vec<String>) -> Self {
        self.objectives = objectives;
        self
    }

    pub fn with_type(mut self, directive_type: DirectiveType) -> Self {
        self.directive_type = directive_type;
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_intensity(mut self, intensity: IntensityLevel) -> Self {
        self.intensity = Some(intensity);
        self
    }

    /// Every free-text field joined with newlines, title first.
    pub fn full_content(&self) -> String {
        let mut parts = vec![
            self.title.as_str(),
            self.description.as_str(),
            self.scope.as_str(),
            self.rationale.as_str(),
        ];
        parts.extend(self.objectives.iter().map(String::as_str));
        parts
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Lookup operations a directive store must provide.
///
/// `Ok(None)` means "no such directive"; `Err` means the store itself failed.
#[async_trait]
pub trait DirectiveRepository: Send + Sync {
    async fn find_by_uuid(&self, uuid: &str) -> Result<Option<Directive>>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Directive>>;
    async fn find_by_legacy_id(&self, legacy_id: &str) -> Result<Option<Directive>>;
    async fn find_by_key(&self, key: &str) -> Result<Option<Directive>>;
}

/// Resolves any supported identifier to a directive.
#[derive(Clone)]
pub struct DirectiveResolver {
    repo: Arc<dyn DirectiveRepository>,
}

impl DirectiveResolver {
    pub fn new(repo: Arc<dyn DirectiveRepository>) -> Self {
        Self { repo }
    }

    pub async fn resolve(&self, identifier: &str) -> GateResult<Directive> {
        let identifier = identifier.trim();
        let lookup_err = |source: anyhow::Error| GateError::DirectiveLookup {
            identifier: identifier.to_string(),
            source,
        };

        if let Some(d) = self.repo.find_by_uuid(identifier).await.map_err(lookup_err)? {
            return Ok(d);
        }
        if let Some(d) = self.repo.find_by_id(identifier).await.map_err(lookup_err)? {
            return Ok(d);
        }
        if let Some(d) = self
            .repo
            .find_by_legacy_id(identifier)
            .await
            .map_err(lookup_err)?
        {
            tracing::debug!(identifier, "directive resolved by legacy key");
            return Ok(d);
        }
        if let Some(d) = self.repo.find_by_key(identifier).await.map_err(lookup_err)? {
            return Ok(d);
        }

        Err(GateError::DirectiveNotFound {
            identifier: identifier.to_string(),
        })
    }
}

/// Directive repository backed by a plain vector.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectives {
    directives: Vec<Directive>,
}

impl InMemoryDirectives {
    pub fn new(directives: Vec<Directive>) -> Self {
        Self { directives }
    }

    pub fn insert(&mut self, directive: Directive) {
        self.directives.retain(|d| d.uuid != directive.uuid);
        self.directives.push(directive);
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    fn find(&self, pred: impl Fn(&Directive) -> bool) -> Option<Directive> {
        self.directives.iter().find(|d| pred(d)).cloned()
    }
}

#[async_trait]
impl DirectiveRepository for InMemoryDirectives {
    async fn find_by_uuid(&self, uuid: &str) -> Result<Option<Directive>> {
        Ok(self.find(|d| d.uuid == uuid))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Directive>> {
        Ok(self.find(|d| d.id == id))
    }

    async fn find_by_legacy_id(&self, legacy_id: &str) -> Result<Option<Directive>> {
        Ok(self.find(|d| d.legacy_id.as_deref() == Some(legacy_id)))
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<Directive>> {
        Ok(self.find(|d| d.key.as_deref() == Some(key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> Arc<dyn DirectiveRepository> {
        Arc::new(InMemoryDirectives::new(vec![
            Directive::new("SD-001", "First")
                .with_uuid("11111111-1111-1111-1111-111111111111")
                .with_legacy_id("LEGACY-1")
                .with_key("first-directive"),
            Directive::new("SD-002", "Second").with_uuid("22222222-2222-2222-2222-222222222222"),
            // A directive whose literal id collides with another's legacy key.
            Directive::new("LEGACY-1", "Shadow").with_uuid("33333333-3333-3333-3333-333333333333"),
        ]))
    }

    struct FailingRepo;

    #[async_trait]
    impl DirectiveRepository for FailingRepo {
        async fn find_by_uuid(&self, _: &str) -> Result<Option<Directive>> {
            anyhow::bail!("connection refused")
        }
        async fn find_by_id(&self, _: &str) -> Result<Option<Directive>> {
            Ok(None)
        }
        async fn find_by_legacy_id(&self, _: &str) -> Result<Option<Directive>> {
            Ok(None)
        }
        async fn find_by_key(&self, _: &str) -> Result<Option<Directive>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_resolve_by_each_identifier() {
        let resolver = DirectiveResolver::new(repo());
        let by_uuid = resolver
            .resolve("22222222-2222-2222-2222-222222222222")
            .await
            .unwrap();
        assert_eq!(by_uuid.id, "SD-002");

        let by_id = resolver.resolve("SD-001").await.unwrap();
        assert_eq!(by_id.title, "First");

        let by_key = resolver.resolve("first-directive").await.unwrap();
        assert_eq!(by_key.id, "SD-001");
    }

    #[tokio::test]
    async fn test_literal_id_wins_over_legacy_key() {
        let resolver = DirectiveResolver::new(repo());
        let d = resolver.resolve("LEGACY-1").await.unwrap();
        assert_eq!(d.title, "Shadow");
    }

    #[tokio::test]
    async fn test_not_found() {
        let resolver = DirectiveResolver::new(repo());
        let err = resolver.resolve("SD-999").await.unwrap_err();
        assert!(matches!(err, GateError::DirectiveNotFound { .. }));
    }

    #[tokio::test]
    async fn test_repository_error_is_not_not_found() {
        let resolver = DirectiveResolver::new(Arc::new(FailingRepo));
        let err = resolver.resolve("SD-001").await.unwrap_err();
        assert!(matches!(err, GateError::DirectiveLookup { .. }));
    }

    #[test]
    fn test_directive_type_lenient_deserialize() {
        let d: Directive = serde_json::from_str(
            r#"{"uuid":"u","id":"SD-1","title":"t","type":"experimental"}"#,
        )
        .unwrap();
        assert_eq!(d.directive_type, DirectiveType::Feature);

        let d: Directive =
            serde_json::from_str(r#"{"uuid":"u","id":"SD-1","title":"t","type":"Bug-Fix"}"#)
                .unwrap();
        assert_eq!(d.directive_type, DirectiveType::Bugfix);
    }

    #[test]
    fn test_intensity_ordering() {
        assert!(IntensityLevel::Cosmetic < IntensityLevel::Structural);
        assert!(IntensityLevel::Structural < IntensityLevel::Architectural);
        assert!("sweeping".parse::<IntensityLevel>().is_err());
    }

    #[test]
    fn test_full_content_skips_empty_fields() {
        let d = Directive::new("SD-1", "Title")
            .with_rationale("Because")
            .with_objectives(vec!["Ship it".into()]);
        assert_eq!(d.full_content(), "Title\nBecause\nShip it");
    }
}
