//! Verdicts, severity tiers and issues produced by capabilities.
//!
//! ## Types
//!
//! - [`Verdict`]: outcome of one capability run, and of the aggregated gate
//! - [`Severity`]: severity tier of a result or an individual issue
//! - [`Issue`]: a single problem reported by a capability
//!
//! ## Example
//!
//! ```
//! use phasegate::verdict::{Issue, Severity, Verdict};
//!
//! let issue = Issue::new(Severity::High, "Missing index on orders.user_id")
//!     .with_category("performance");
//! assert!(issue.severity.is_blocking());
//! assert_eq!(Verdict::parse_lenient("conditional pass"), Some(Verdict::ConditionalPass));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a capability, or of the gate as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pass,
    ConditionalPass,
    Warning,
    Fail,
    Blocked,
}

impl Verdict {
    /// Parse a verdict string from executor output.
    ///
    /// Accepts any case and `-`/space separators. Returns `None` for
    /// anything unrecognized so the caller can apply its own default.
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().replace(['-', ' '], "_").as_str() {
            "PASS" | "PASSED" => Some(Self::Pass),
            "CONDITIONAL_PASS" | "CONDITIONAL" => Some(Self::ConditionalPass),
            "WARNING" | "WARN" => Some(Self::Warning),
            "FAIL" | "FAILED" => Some(Self::Fail),
            "BLOCKED" | "BLOCK" => Some(Self::Blocked),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::ConditionalPass => "CONDITIONAL_PASS",
            Self::Warning => "WARNING",
            Self::Fail => "FAIL",
            Self::Blocked => "BLOCKED",
        }
    }

    /// Severity rank of an aggregated gate verdict, higher is worse.
    ///
    /// `PASS < WARNING < CONDITIONAL_PASS < BLOCKED`. A conditional pass
    /// carries a real failure, a warning does not. `FAIL` never appears as an
    /// aggregate verdict and ranks alongside `BLOCKED`.
    pub fn gate_rank(&self) -> u8 {
        match self {
            Self::Pass => 0,
            Self::Warning => 1,
            Self::ConditionalPass => 2,
            Self::Fail | Self::Blocked => 3,
        }
    }

    pub fn is_passing(&self) -> bool {
        matches!(self, Self::Pass | Self::ConditionalPass)
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Pass => "✓",
            Self::ConditionalPass => "◐",
            Self::Warning => "⚠",
            Self::Fail => "✗",
            Self::Blocked => "⛔",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity tier. Ordered from most to least severe.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Severity {
    /// Tier for a capability's static priority: `>= 90` critical,
    /// `>= 70` high, anything else medium.
    ///
    /// ```
    /// use phasegate::verdict::Severity;
    ///
    /// assert_eq!(Severity::from_priority(95), Severity::Critical);
    /// assert_eq!(Severity::from_priority(70), Severity::High);
    /// assert_eq!(Severity::from_priority(69), Severity::Medium);
    /// ```
    pub fn from_priority(priority: i64) -> Self {
        if priority >= 90 {
            Self::Critical
        } else if priority >= 70 {
            Self::High
        } else {
            Self::Medium
        }
    }

    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "CRITICAL" | "BLOCKER" => Some(Self::Critical),
            "HIGH" | "ERROR" | "MAJOR" => Some(Self::High),
            "MEDIUM" | "WARNING" | "MODERATE" => Some(Self::Medium),
            "LOW" | "INFO" | "MINOR" | "NOTE" => Some(Self::Low),
            _ => None,
        }
    }

    /// Critical and high failures block the gate.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Critical | Self::High)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single problem reported by a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Issue {
    pub fn new(severity: Severity, description: impl Into<String>) -> Self {
        Self {
            severity,
            description: description.into(),
            category: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}
