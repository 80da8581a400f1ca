//! Normalization of raw executor output.
//!
//! Executors are opaque; only the shape of what they return is checked.
//! Nothing is ever rejected. Each field falls back on its own:
//!
//! | Field             | When absent or unusable |
//! |-------------------|-------------------------|
//! | `verdict`         | `WARNING`               |
//! | `confidence`      | `50` (else clamped 0-100) |
//! | `issues`          | empty                   |
//! | `warnings`        | empty                   |
//! | `recommendations` | empty                   |
//! | `analysis`        | empty                   |

use serde_json::{Map, Value};

use crate::verdict::{Issue, Severity, Verdict};

pub const DEFAULT_VERDICT: Verdict = Verdict::Warning;
pub const DEFAULT_CONFIDENCE: u8 = 50;

const KNOWN_FIELDS: &[&str] = &[
    "verdict",
    "confidence",
    "issues",
    "warnings",
    "recommendations",
    "analysis",
    "duration_ms",
];

/// Executor output after field-by-field defaulting.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResponse {
    pub verdict: Verdict,
    pub confidence: u8,
    pub issues: Vec<Issue>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
    pub analysis: String,
    pub duration_ms: Option<u64>,
    /// Top-level fields outside the normalized set.
    pub extra: Map<String, Value>,
}

pub fn normalize_response(value: &Value) -> NormalizedResponse {
    let obj = value.as_object();
    let field = |name: &str| obj.and_then(|o| o.get(name));

    let verdict = field("verdict")
        .and_then(Value::as_str)
        .and_then(Verdict::parse_lenient)
        .unwrap_or(DEFAULT_VERDICT);

    let confidence = field("confidence")
        .and_then(parse_confidence)
        .unwrap_or(DEFAULT_CONFIDENCE);

    let issues = field("issues")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_issue).collect())
        .unwrap_or_default();

    let extra = obj
        .map(|o| {
            o.iter()
                .filter(|(k, _)| !KNOWN_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default();

    NormalizedResponse {
        verdict,
        confidence,
        issues,
        warnings: string_list(field("warnings")),
        recommendations: string_list(field("recommendations")),
        analysis: field("analysis")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        duration_ms: field("duration_ms").and_then(Value::as_u64),
        extra,
    }
}

fn parse_confidence(value: &Value) -> Option<u8> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok()?,
        _ => return None,
    };
    if n.is_nan() {
        return None;
    }
    Some(n.clamp(0.0, 100.0).round() as u8)
}

fn parse_issue(value: &Value) -> Option<Issue> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(Issue::new(Severity::Medium, s.trim())),
        Value::Object(o) => {
            let description = ["description", "issue", "message"]
                .iter()
                .find_map(|k| o.get(*k).and_then(Value::as_str))?;
            let severity = o
                .get("severity")
                .and_then(Value::as_str)
                .and_then(Severity::parse_lenient)
                .unwrap_or_default();
            let mut issue = Issue::new(severity, description);
            if let Some(category) = o.get("category").and_then(Value::as_str) {
                issue = issue.with_category(category);
            }
            Some(issue)
        }
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => o
                    .get("message")
                    .or_else(|| o.get("description"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Extract a JSON object from output that may be wrapped in markdown or prose.
///
/// Tries, in order: a ```` ```json ```` block, any fenced block containing
/// `{`, then the first balanced `{...}` in the raw text.
pub fn extract_json(output: &str) -> Option<String> {
    if let Some(start) = output.find("```json") {
        let after_marker = &output[start + 7..];
        if let Some(end) = after_marker.find("```") {
            return Some(after_marker[..end].trim().to_string());
        }
    }

    if let Some(start) = output.find("```") {
        let after_marker = &output[start + 3..];
        if let Some(end) = after_marker.find("```")
            && let Some(json_start) = after_marker[..end].find('{')
        {
            let content = after_marker[json_start..end].trim();
            if !content.is_empty() {
                return Some(content.to_string());
            }
        }
    }

    let start = output.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in output[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(output[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse executor stdout into a JSON value.
///
/// Output with no recoverable JSON object becomes `{"analysis": <output>}`,
/// which normalizes to a `WARNING` with default confidence.
pub fn parse_output(output: &str) -> Value {
    extract_json(output)
        .and_then(|s| serde_json::from_str::<Value>(&s).ok())
        .filter(Value::is_object)
        .unwrap_or_else(|| serde_json::json!({ "analysis": output.trim() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // =========================================
    // normalize_response tests
    // =========================================

    #[test]
    fn test_normalize_full_response() {
        let n = normalize_response(&json!({
            "verdict": "FAIL",
            "confidence": 87.6,
            "issues": [
                {"severity": "critical", "description": "RLS disabled on users"},
                "missing index"
            ],
            "warnings": ["slow query"],
            "recommendations": [{"message": "add index"}],
            "analysis": "two problems",
            "duration_ms": 1200,
            "model": "local"
        }));
        assert_eq!(n.verdict, Verdict::Fail);
        assert_eq!(n.confidence, 88);
        assert_eq!(n.issues.len(), 2);
        assert_eq!(n.issues[0].severity, Severity::Critical);
        assert_eq!(n.issues[1].severity, Severity::Medium);
        assert_eq!(n.warnings, vec!["slow query"]);
        assert_eq!(n.recommendations, vec!["add index"]);
        assert_eq!(n.duration_ms, Some(1200));
        assert_eq!(n.extra.get("model"), Some(&json!("local")));
    }

    #[test]
    fn test_normalize_defaults_empty_object() {
        let n = normalize_response(&json!({}));
        assert_eq!(n.verdict, Verdict::Warning);
        assert_eq!(n.confidence, 50);
        assert!(n.issues.is_empty());
        assert!(n.warnings.is_empty());
        assert!(n.recommendations.is_empty());
        assert!(n.analysis.is_empty());
    }

    #[test]
    fn test_normalize_non_object() {
        let n = normalize_response(&json!(["PASS"]));
        assert_eq!(n.verdict, Verdict::Warning);
        assert_eq!(n.confidence, 50);
    }

    #[test]
    fn test_normalize_unknown_verdict_and_bad_confidence() {
        let n = normalize_response(&json!({"verdict": "LGTM", "confidence": "high"}));
        assert_eq!(n.verdict, Verdict::Warning);
        assert_eq!(n.confidence, 50);
    }

    #[test]
    fn test_normalize_clamps_confidence() {
        assert_eq!(normalize_response(&json!({"confidence": 250})).confidence, 100);
        assert_eq!(normalize_response(&json!({"confidence": -3})).confidence, 0);
        assert_eq!(normalize_response(&json!({"confidence": "72%"})).confidence, 72);
    }

    #[test]
    fn test_issue_without_description_is_dropped() {
        let n = normalize_response(&json!({"issues": [{"severity": "high"}, 42]}));
        assert!(n.issues.is_empty());
    }

    // =========================================
    // extract_json tests
    // =========================================

    #[test]
    fn test_extract_json_from_json_block() {
        let output = "Result:\n```json\n{\"verdict\": \"PASS\"}\n```\nDone";
        assert_eq!(extract_json(output).unwrap(), "{\"verdict\": \"PASS\"}");
    }

    #[test]
    fn test_extract_json_from_generic_block() {
        let output = "```\nnote {\"verdict\": \"FAIL\"}\n```";
        assert_eq!(extract_json(output).unwrap(), "{\"verdict\": \"FAIL\"}");
    }

    #[test]
    fn test_extract_raw_json_with_braces_in_strings() {
        let output = r#"prefix {"analysis": "use {x}", "nested": {"a": 1}} suffix"#;
        let json = extract_json(output).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["analysis"], "use {x}");
    }

    #[test]
    fn test_extract_json_none() {
        assert!(extract_json("no json here").is_none());
        assert!(extract_json("{ unbalanced").is_none());
    }

    #[test]
    fn test_parse_output_falls_back_to_analysis() {
        let value = parse_output("all good, nothing to report\n");
        assert_eq!(value, json!({"analysis": "all good, nothing to report"}));
        assert_eq!(normalize_response(&value).verdict, Verdict::Warning);
    }
}
