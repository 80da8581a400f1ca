//! Lifecycle phases a gate can be evaluated for.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named lifecycle stage.
///
/// Parsing is case-insensitive and accepts the long-form aliases used by
/// older tooling:
///
/// ```
/// use phasegate::phase::Phase;
///
/// assert_eq!("exec_implementation".parse::<Phase>().unwrap(), Phase::ExecImpl);
/// assert_eq!("PLAN-VERIFY".parse::<Phase>().unwrap(), Phase::PlanVerify);
/// assert_eq!(Phase::LeadFinal.to_string(), "LEAD_FINAL");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    LeadPreApproval,
    PlanPrd,
    ExecImpl,
    PlanVerify,
    LeadFinal,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeadPreApproval => "LEAD_PRE_APPROVAL",
            Self::PlanPrd => "PLAN_PRD",
            Self::ExecImpl => "EXEC_IMPL",
            Self::PlanVerify => "PLAN_VERIFY",
            Self::LeadFinal => "LEAD_FINAL",
        }
    }

    /// All phases in lifecycle order.
    pub fn all() -> [Phase; 5] {
        [
            Self::LeadPreApproval,
            Self::PlanPrd,
            Self::ExecImpl,
            Self::PlanVerify,
            Self::LeadFinal,
        ]
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "LEAD_PRE_APPROVAL" | "LEAD" | "PRE_APPROVAL" => Ok(Self::LeadPreApproval),
            "PLAN_PRD" | "PLAN_PRD_GENERATION" | "PLAN" | "PRD" => Ok(Self::PlanPrd),
            "EXEC_IMPL" | "EXEC_IMPLEMENTATION" | "EXEC" => Ok(Self::ExecImpl),
            "PLAN_VERIFY" | "PLAN_VERIFICATION" | "VERIFY" => Ok(Self::PlanVerify),
            "LEAD_FINAL" | "LEAD_FINAL_APPROVAL" | "FINAL" => Ok(Self::LeadFinal),
            _ => Err(format!(
                "Unknown phase '{}'. Valid: LEAD_PRE_APPROVAL, PLAN_PRD, EXEC_IMPL, PLAN_VERIFY, LEAD_FINAL",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_parse_aliases() {
        assert_eq!("LEAD".parse::<Phase>().unwrap(), Phase::LeadPreApproval);
        assert_eq!("plan_prd_generation".parse::<Phase>().unwrap(), Phase::PlanPrd);
        assert_eq!("EXEC".parse::<Phase>().unwrap(), Phase::ExecImpl);
        assert_eq!("plan verification".parse::<Phase>().unwrap(), Phase::PlanVerify);
        assert_eq!("lead_final_approval".parse::<Phase>().unwrap(), Phase::LeadFinal);
    }

    #[test]
    fn test_phase_parse_unknown() {
        let err = "DEPLOY".parse::<Phase>().unwrap_err();
        assert!(err.contains("DEPLOY"));
    }

    #[test]
    fn test_phase_display_round_trips() {
        for phase in Phase::all() {
            assert_eq!(phase.to_string().parse::<Phase>().unwrap(), phase);
        }
    }

    #[test]
    fn test_phase_serde_uses_screaming_case() {
        let json = serde_json::to_string(&Phase::PlanVerify).unwrap();
        assert_eq!(json, "\"PLAN_VERIFY\"");
        let back: Phase = serde_json::from_str("\"EXEC_IMPL\"").unwrap();
        assert_eq!(back, Phase::ExecImpl);
    }
}
