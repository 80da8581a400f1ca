//! Built-in capability definitions and keyword profiles.
//!
//! The normalization ceiling used by the scorer (24 points) is tuned against
//! the size of these lists. Growing a primary list substantially changes how
//! quickly a domain saturates at 100%.

use super::{CapabilityDefinition, DomainProfile};
use crate::phase::Phase;

pub fn builtin_capabilities() -> Vec<CapabilityDefinition> {
    vec![
        CapabilityDefinition::new("SECURITY", "Security Architect", 95).with_profile(
            DomainProfile::new(
                &[
                    "security",
                    "authentication",
                    "authorization",
                    "auth",
                    "login",
                    "logout",
                    "password",
                    "session management",
                    "rls",
                    "row level security",
                    "encryption",
                    "vulnerability",
                    "oauth",
                    "jwt",
                    "csrf",
                    "xss",
                    "permissions",
                ],
                &[
                    "session",
                    "sessions",
                    "token",
                    "tokens",
                    "role",
                    "roles",
                    "access control",
                    "secure",
                    "credentials",
                    "secrets",
                    "policy",
                    "policies",
                    "permission",
                    "sanitize",
                ],
            )
            .with_exclusions(&[
                "security deposit",
                "job security",
                "social security",
                "security guard",
                "security camera",
            ]),
        ),
        CapabilityDefinition::new("DATABASE", "Database Architect", 90).with_profile(
            DomainProfile::new(
                &[
                    "database",
                    "migration",
                    "migrations",
                    "schema",
                    "postgres",
                    "postgresql",
                    "supabase",
                    "sql",
                    "rls",
                    "row level security",
                    "foreign key",
                    "data model",
                    "alter table",
                    "create table",
                    "index",
                    "indexes",
                ],
                &[
                    "table",
                    "tables",
                    "query",
                    "queries",
                    "column",
                    "columns",
                    "constraint",
                    "constraints",
                    "seed",
                    "policy",
                    "policies",
                    "trigger",
                    "triggers",
                    "records",
                ],
            )
            .with_exclusions(&[
                "table component",
                "html table",
                "data table",
                "table layout",
                "table of contents",
                "ui table",
            ]),
        ),
        CapabilityDefinition::new("TESTING", "QA Engineering Director", 85).with_profile(
            DomainProfile::new(
                &[
                    "test",
                    "tests",
                    "testing",
                    "e2e",
                    "unit test",
                    "unit tests",
                    "integration test",
                    "integration tests",
                    "test coverage",
                    "test suite",
                    "playwright",
                    "vitest",
                    "jest",
                    "coverage",
                ],
                &[
                    "assert",
                    "assertion",
                    "mock",
                    "fixture",
                    "spec",
                    "specs",
                    "qa",
                    "scenario",
                    "scenarios",
                ],
            )
            .with_exclusions(&["a/b test", "a/b testing", "split test"]),
        ),
        CapabilityDefinition::new("REGRESSION", "Regression Validator", 80).with_profile(
            DomainProfile::new(
                &[
                    "regression",
                    "backward compatibility",
                    "backwards compatibility",
                    "breaking change",
                ],
                &[
                    "compatibility",
                    "existing behavior",
                    "legacy",
                    "restructure",
                    "rename",
                    "refactor",
                    "refactoring",
                ],
            ),
        ),
        CapabilityDefinition::new("RCA", "Root Cause Analyst", 80).with_profile(
            DomainProfile::new(
                &["root cause", "rca", "incident", "postmortem", "outage"],
                &["bug", "error", "failure", "crash", "debug", "investigate"],
            ),
        ),
        CapabilityDefinition::new("PERFORMANCE", "Performance Engineering Lead", 75).with_profile(
            DomainProfile::new(
                &[
                    "performance",
                    "optimize",
                    "optimization",
                    "latency",
                    "caching",
                    "cache",
                    "scalability",
                    "throughput",
                    "load time",
                    "page load",
                    "bundle size",
                    "lazy loading",
                    "memory leak",
                ],
                &[
                    "speed",
                    "slow",
                    "fast",
                    "load",
                    "traffic",
                    "benchmark",
                    "profiling",
                    "scale",
                    "efficient",
                ],
            )
            .with_exclusions(&[
                "performance review",
                "performance evaluation",
                "employee performance",
            ]),
        ),
        CapabilityDefinition::new("VALIDATION", "Principal Systems Analyst", 75).with_profile(
            DomainProfile::new(
                &[
                    "validation",
                    "validate",
                    "audit",
                    "duplicate",
                    "duplicates",
                    "existing implementation",
                    "existing implementations",
                    "codebase",
                    "verify",
                ],
                &[
                    "check",
                    "review",
                    "search",
                    "existing",
                    "overlap",
                    "conflict",
                    "prerequisite",
                    "dependencies",
                ],
            )
            .with_exclusions(&["form validation", "input validation", "field validation"]),
        ),
        CapabilityDefinition::new("DESIGN", "Senior Design Sub-Agent", 70).with_profile(
            DomainProfile::new(
                &[
                    "ui",
                    "ux",
                    "user interface",
                    "responsive",
                    "accessibility",
                    "a11y",
                    "wcag",
                    "layout",
                    "design system",
                    "component",
                    "components",
                    "navigation",
                    "styling",
                    "css",
                ],
                &[
                    "button",
                    "form",
                    "forms",
                    "modal",
                    "menu",
                    "theme",
                    "typography",
                    "aria",
                    "keyboard navigation",
                    "screen reader",
                    "mockup",
                    "wireframe",
                    "dark mode",
                ],
            )
            .with_exclusions(&[
                "typescript interface",
                "typescript interfaces",
                "api interface",
                "interface definition",
                "interface definitions",
            ]),
        ),
        CapabilityDefinition::new("RISK", "Risk Assessment", 70),
        CapabilityDefinition::new("UAT", "UAT Test Executor", 65)
            .with_phases(&[Phase::ExecImpl, Phase::PlanVerify, Phase::LeadFinal])
            .with_profile(DomainProfile::new(
                &[
                    "uat",
                    "user acceptance",
                    "acceptance testing",
                    "acceptance criteria",
                    "stakeholder",
                    "sign-off",
                ],
                &[
                    "acceptance",
                    "scenario",
                    "scenarios",
                    "stakeholders",
                    "demo",
                    "feedback",
                    "requirements",
                ],
            )),
        CapabilityDefinition::new("GITHUB", "DevOps Platform Architect", 60).with_profile(
            DomainProfile::new(
                &[
                    "github",
                    "github actions",
                    "ci/cd",
                    "ci",
                    "pipeline",
                    "workflow",
                    "deployment",
                    "pull request",
                    "continuous integration",
                ],
                &[
                    "build", "deploy", "release", "merge", "branch", "automated", "actions", "job",
                    "jobs",
                ],
            )
            .with_exclusions(&["sales pipeline", "hiring pipeline"]),
        ),
        CapabilityDefinition::new("STORIES", "User Story Context Engineer", 55)
            .with_phases(&[Phase::PlanPrd, Phase::ExecImpl, Phase::PlanVerify]),
        CapabilityDefinition::new("DOCMON", "Information Architecture Lead", 50).with_profile(
            DomainProfile::new(
                &[
                    "documentation",
                    "docs",
                    "readme",
                    "user guide",
                    "api documentation",
                    "changelog",
                    "technical writing",
                ],
                &[
                    "guide",
                    "guides",
                    "instructions",
                    "examples",
                    "tutorial",
                    "overview",
                    "reference",
                ],
            ),
        ),
        CapabilityDefinition::new("RETRO", "Continuous Improvement Coach", 40)
            .with_phases(&[Phase::LeadFinal]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_codes_are_unique() {
        let caps = builtin_capabilities();
        let codes: HashSet<_> = caps.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes.len(), caps.len());
    }

    #[test]
    fn test_builtin_keywords_are_lowercase() {
        for cap in builtin_capabilities() {
            if let Some(profile) = cap.profile {
                for kw in profile.primary.iter().chain(&profile.secondary) {
                    assert_eq!(kw, &kw.to_lowercase(), "{} keyword {}", cap.code, kw);
                }
            }
        }
    }

    #[test]
    fn test_builtin_keyword_lists_do_not_overlap_within_domain() {
        for cap in builtin_capabilities() {
            if let Some(profile) = cap.profile {
                let primary: HashSet<_> = profile.primary.iter().collect();
                for kw in &profile.secondary {
                    assert!(!primary.contains(kw), "{} lists {} twice", cap.code, kw);
                }
            }
        }
    }
}
