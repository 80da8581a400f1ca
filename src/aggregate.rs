//! Reduction of per-capability results into one gate verdict.
//!
//! Rules are evaluated strictly in order; the first match wins:
//!
//! | # | Condition                                   | Verdict            | Proceed |
//! |---|---------------------------------------------|--------------------|---------|
//! | 1 | any FAIL with CRITICAL or HIGH severity     | `BLOCKED`          | no      |
//! | 2 | any BLOCKED                                 | `BLOCKED`          | no      |
//! | 3 | any other FAIL                              | `CONDITIONAL_PASS` | yes     |
//! | 4 | every result PASS or CONDITIONAL_PASS       | `PASS`             | yes     |
//! | 5 | otherwise                                   | `WARNING`          | yes     |
//!
//! An empty result list is a `PASS` with no confidence.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::execution::ExecutionRecord;
use crate::verdict::{Severity, Verdict};

/// The gate decision for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedVerdict {
    pub verdict: Verdict,
    pub can_proceed: bool,
    /// Floor of the mean per-result confidence; `None` when nothing ran.
    pub confidence: Option<u8>,
    pub message: String,
    /// Result count per verdict.
    pub counts: BTreeMap<String, usize>,
    pub results: Vec<CapabilityVerdict>,
}

/// One capability's contribution to the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityVerdict {
    pub code: String,
    pub verdict: Verdict,
    pub confidence: u8,
    pub severity: Severity,
    pub synthesized: bool,
}

pub fn aggregate(results: &[ExecutionRecord]) -> AggregatedVerdict {
    let per_capability: Vec<CapabilityVerdict> = results
        .iter()
        .map(|r| CapabilityVerdict {
            code: r.capability_code.clone(),
            verdict: r.verdict,
            confidence: r.confidence,
            severity: r.severity,
            synthesized: r.synthesized,
        })
        .collect();

    let mut counts = BTreeMap::new();
    for r in results {
        *counts.entry(r.verdict.as_str().to_string()).or_insert(0) += 1;
    }

    if results.is_empty() {
        return AggregatedVerdict {
            verdict: Verdict::Pass,
            can_proceed: true,
            confidence: None,
            message: "No capabilities were required for this phase".to_string(),
            counts,
            results: per_capability,
        };
    }

    let sum: u64 = results.iter().map(|r| r.confidence as u64).sum();
    let confidence = Some((sum / results.len() as u64) as u8);

    let blocking = codes_where(results, |r| r.verdict == Verdict::Fail && r.severity.is_blocking());
    let blocked = codes_where(results, |r| r.verdict == Verdict::Blocked);
    let failed = codes_where(results, |r| r.verdict == Verdict::Fail);

    let (verdict, can_proceed, message) = if !blocking.is_empty() {
        (
            Verdict::Blocked,
            false,
            format!("Blocking failure in {}", blocking.join(", ")),
        )
    } else if !blocked.is_empty() {
        (
            Verdict::Blocked,
            false,
            format!("Blocked by {}", blocked.join(", ")),
        )
    } else if !failed.is_empty() {
        (
            Verdict::ConditionalPass,
            true,
            format!("Non-critical failure in {}", failed.join(", ")),
        )
    } else if results
        .iter()
        .all(|r| matches!(r.verdict, Verdict::Pass | Verdict::ConditionalPass))
    {
        (
            Verdict::Pass,
            true,
            format!("All {} capabilities passed", results.len()),
        )
    } else {
        let warned = codes_where(results, |r| r.verdict == Verdict::Warning);
        (
            Verdict::Warning,
            true,
            format!("Warnings from {}", warned.join(", ")),
        )
    };

    AggregatedVerdict {
        verdict,
        can_proceed,
        confidence,
        message,
        counts,
        results: per_capability,
    }
}

fn codes_where(results: &[ExecutionRecord], pred: impl Fn(&ExecutionRecord) -> bool) -> Vec<&str> {
    results
        .iter()
        .filter(|r| pred(r))
        .map(|r| r.capability_code.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::record;

    fn rec(code: &str, verdict: Verdict, severity: Severity, confidence: u8) -> ExecutionRecord {
        let mut r = record(code, code, code, verdict);
        r.severity = severity;
        r.confidence = confidence;
        r
    }

    #[test]
    fn test_empty_is_pass_without_confidence() {
        let agg = aggregate(&[]);
        assert_eq!(agg.verdict, Verdict::Pass);
        assert!(agg.can_proceed);
        assert_eq!(agg.confidence, None);
        assert!(agg.message.contains("No capabilities"));
        let json = serde_json::to_value(&agg).unwrap();
        assert!(json["confidence"].is_null());
    }

    #[test]
    fn test_single_critical_fail_blocks() {
        let agg = aggregate(&[
            rec("SECURITY", Verdict::Fail, Severity::Critical, 90),
            rec("TESTING", Verdict::Pass, Severity::High, 95),
            rec("DOCMON", Verdict::Pass, Severity::Medium, 99),
        ]);
        assert_eq!(agg.verdict, Verdict::Blocked);
        assert!(!agg.can_proceed);
        assert!(agg.message.contains("SECURITY"));
    }

    #[test]
    fn test_high_fail_blocks() {
        let agg = aggregate(&[rec("DESIGN", Verdict::Fail, Severity::High, 60)]);
        assert_eq!(agg.verdict, Verdict::Blocked);
    }

    #[test]
    fn test_blocked_result_blocks() {
        let agg = aggregate(&[
            rec("UAT", Verdict::Blocked, Severity::Medium, 40),
            rec("TESTING", Verdict::Pass, Severity::High, 90),
        ]);
        assert_eq!(agg.verdict, Verdict::Blocked);
        assert!(agg.message.starts_with("Blocked by UAT"));
    }

    #[test]
    fn test_medium_fail_is_conditional_pass() {
        let agg = aggregate(&[
            rec("DOCMON", Verdict::Fail, Severity::Medium, 70),
            rec("TESTING", Verdict::Warning, Severity::High, 80),
        ]);
        assert_eq!(agg.verdict, Verdict::ConditionalPass);
        assert!(agg.can_proceed);
    }

    #[test]
    fn test_all_pass_or_conditional_is_pass() {
        let agg = aggregate(&[
            rec("TESTING", Verdict::Pass, Severity::High, 90),
            rec("DESIGN", Verdict::ConditionalPass, Severity::High, 75),
        ]);
        assert_eq!(agg.verdict, Verdict::Pass);
        assert_eq!(agg.counts.get("PASS"), Some(&1));
        assert_eq!(agg.counts.get("CONDITIONAL_PASS"), Some(&1));
    }

    #[test]
    fn test_warning_otherwise() {
        let agg = aggregate(&[
            rec("TESTING", Verdict::Pass, Severity::High, 90),
            rec("GITHUB", Verdict::Warning, Severity::Medium, 50),
        ]);
        assert_eq!(agg.verdict, Verdict::Warning);
        assert!(agg.can_proceed);
        assert!(agg.message.contains("GITHUB"));
    }

    #[test]
    fn test_confidence_is_floor_of_mean() {
        let agg = aggregate(&[
            rec("A", Verdict::Pass, Severity::Medium, 90),
            rec("B", Verdict::Pass, Severity::Medium, 85),
        ]);
        assert_eq!(agg.confidence, Some(87));
    }

    #[test]
    fn test_pass_to_fail_never_improves_outcome() {
        let severities = [Severity::Critical, Severity::High, Severity::Medium, Severity::Low];
        let others = [Verdict::Pass, Verdict::ConditionalPass, Verdict::Warning, Verdict::Fail, Verdict::Blocked];

        for other in others {
            for other_sev in severities {
                for fail_sev in severities {
                    let before = aggregate(&[
                        rec("A", Verdict::Pass, fail_sev, 80),
                        rec("B", other, other_sev, 80),
                    ]);
                    let after = aggregate(&[
                        rec("A", Verdict::Fail, fail_sev, 80),
                        rec("B", other, other_sev, 80),
                    ]);
                    assert!(
                        after.verdict.gate_rank() >= before.verdict.gate_rank(),
                        "{:?}/{:?} with A {:?}: {:?} -> {:?}",
                        other,
                        other_sev,
                        fail_sev,
                        before.verdict,
                        after.verdict
                    );
                    assert!(before.can_proceed || !after.can_proceed);
                }
            }
        }
    }
}
