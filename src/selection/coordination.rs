//! Coordination rules: keyword co-occurrence that requires several
//! capabilities together.
//!
//! Detection is deliberately independent of the domain scorer. It counts
//! which of a rule's keywords appear anywhere in the directive's full
//! content; weights and exclusions play no part.

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::scorer::compile_keywords;

/// Minimum distinct keyword hits before a rule fires.
pub const DEFAULT_COORDINATION_MIN_MATCHES: usize = 2;

/// Confidence assigned to capabilities added by a coordination rule.
pub const DEFAULT_COORDINATION_CONFIDENCE: u8 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationRule {
    pub name: String,
    pub keywords: Vec<String>,
    pub capabilities: Vec<String>,
    pub reason: String,
}

impl CoordinationRule {
    pub fn new(name: &str, keywords: &[&str], capabilities: &[&str], reason: &str) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            capabilities: capabilities.iter().map(|s| s.to_string()).collect(),
            reason: reason.to_string(),
        }
    }
}

/// A rule that fired for a piece of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoordinationMatch {
    pub group_name: String,
    pub capabilities: Vec<String>,
    pub reason: String,
    pub matched_keywords: Vec<String>,
    pub match_count: usize,
}

pub fn builtin_rules() -> Vec<CoordinationRule> {
    vec![
        CoordinationRule::new(
            "AUTHENTICATION",
            &[
                "auth",
                "authentication",
                "login",
                "logout",
                "password",
                "session",
                "oauth",
                "jwt",
                "sign in",
                "sign up",
                "credentials",
                "rls",
                "row level security",
                "roles",
                "permissions",
            ],
            &["SECURITY", "DATABASE"],
            "Authentication touches both credential handling and user storage",
        ),
        CoordinationRule::new(
            "API_ENDPOINT",
            &[
                "api",
                "endpoint",
                "endpoints",
                "rest",
                "graphql",
                "webhook",
                "route",
                "routes",
            ],
            &["SECURITY", "DATABASE", "PERFORMANCE"],
            "New endpoints need access control, data access review and load checks",
        ),
        CoordinationRule::new(
            "USER_INTERFACE",
            &[
                "ui",
                "component",
                "components",
                "form",
                "page",
                "screen",
                "button",
                "modal",
                "layout",
                "responsive",
                "dashboard",
            ],
            &["DESIGN", "TESTING"],
            "User-facing changes need design review and interaction tests",
        ),
        CoordinationRule::new(
            "DEPLOYMENT",
            &[
                "deploy",
                "deployment",
                "release",
                "ci/cd",
                "pipeline",
                "production",
                "rollout",
                "github actions",
                "workflow",
            ],
            &["GITHUB", "TESTING"],
            "Delivery pipeline changes need CI review and test coverage",
        ),
        CoordinationRule::new(
            "ACCEPTANCE",
            &[
                "uat",
                "acceptance",
                "user acceptance",
                "acceptance criteria",
                "stakeholder",
                "user stories",
                "sign-off",
            ],
            &["UAT", "TESTING"],
            "Acceptance work needs scripted scenarios backed by tests",
        ),
        CoordinationRule::new(
            "DATA_MIGRATION",
            &[
                "migration",
                "migrate",
                "backfill",
                "data import",
                "schema change",
                "etl",
            ],
            &["DATABASE", "VALIDATION"],
            "Data migrations need schema review and integrity validation",
        ),
    ]
}

/// Detects which coordination rules a text triggers.
#[derive(Debug, Clone)]
pub struct CoordinationResolver {
    rules: Vec<(CoordinationRule, Vec<(String, Regex)>)>,
    min_matches: usize,
}

impl CoordinationResolver {
    pub fn new(rules: Vec<CoordinationRule>, min_matches: usize) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let matchers = compile_keywords(&rule.keywords)?;
                Ok((rule, matchers))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules, min_matches })
    }

    pub fn builtin() -> Result<Self> {
        Self::new(builtin_rules(), DEFAULT_COORDINATION_MIN_MATCHES)
    }

    /// Rules whose distinct keyword hits in `text` reach the minimum.
    pub fn detect(&self, text: &str) -> Vec<CoordinationMatch> {
        self.rules
            .iter()
            .filter_map(|(rule, matchers)| {
                let matched_keywords: Vec<String> = matchers
                    .iter()
                    .filter(|(_, re)| re.is_match(text))
                    .map(|(kw, _)| kw.clone())
                    .collect();
                let match_count = matched_keywords.len();
                if match_count < self.min_matches {
                    return None;
                }
                tracing::debug!(group = %rule.name, match_count, "coordination rule fired");
                Some(CoordinationMatch {
                    group_name: rule.name.clone(),
                    capabilities: rule.capabilities.clone(),
                    reason: rule.reason.clone(),
                    matched_keywords,
                    match_count,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(text: &str) -> Vec<String> {
        CoordinationResolver::builtin()
            .unwrap()
            .detect(text)
            .into_iter()
            .map(|m| m.group_name)
            .collect()
    }

    #[test]
    fn test_authentication_requires_security_and_database() {
        let resolver = CoordinationResolver::builtin().unwrap();
        let matches = resolver.detect(
            "User Authentication System\nImplement login, logout, session management with RLS policies on user tables",
        );
        let auth = matches
            .iter()
            .find(|m| m.group_name == "AUTHENTICATION")
            .unwrap();
        assert_eq!(auth.capabilities, vec!["SECURITY", "DATABASE"]);
        assert_eq!(auth.match_count, 5);
        assert!(auth.matched_keywords.contains(&"rls".to_string()));
    }

    #[test]
    fn test_api_endpoint_requires_three_capabilities() {
        let resolver = CoordinationResolver::builtin().unwrap();
        let matches = resolver.detect(
            "High-Performance API Endpoint\nBuild secure REST API endpoint with database queries and performance optimization",
        );
        let api = matches.iter().find(|m| m.group_name == "API_ENDPOINT").unwrap();
        assert_eq!(api.capabilities, vec!["SECURITY", "DATABASE", "PERFORMANCE"]);
        assert_eq!(api.matched_keywords, vec!["api", "endpoint", "rest"]);
    }

    #[test]
    fn test_authentication_with_rls_co_occurrence() {
        let found = groups(
            "Database Migration for User Tables\nCreate migration scripts for user authentication tables with RLS policies",
        );
        assert!(found.contains(&"AUTHENTICATION".to_string()));
    }

    #[test]
    fn test_weak_signals_trigger_nothing() {
        assert!(groups("Update Documentation\nUpdate user guide with new feature descriptions").is_empty());
    }

    #[test]
    fn test_single_keyword_is_not_enough() {
        assert!(groups("Fix the login copy").is_empty());
    }

    #[test]
    fn test_repeated_keyword_counts_once() {
        assert!(groups("login login login").is_empty());
    }

    #[test]
    fn test_min_matches_is_configurable() {
        let resolver = CoordinationResolver::new(builtin_rules(), 1).unwrap();
        let matches = resolver.detect("Fix the login copy");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].group_name, "AUTHENTICATION");
    }
}
