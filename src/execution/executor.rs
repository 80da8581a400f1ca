//! Capability executors.
//!
//! An executor is an opaque analysis unit. The engine hands it one
//! [`ExecutionContext`] and gets back arbitrary JSON, which is normalized
//! afterwards; executors never see each other's output.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::normalize::parse_output;
use crate::catalog::CapabilityDefinition;
use crate::directive::Directive;
use crate::phase::Phase;

pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 4000;

/// Directive fields passed to an executor, truncated for transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectiveSummary {
    pub id: String,
    pub uuid: String,
    pub title: String,
    #[serde(rename = "type")]
    pub directive_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity: Option<String>,
    pub priority: i64,
    pub description: String,
    pub scope: String,
    pub objectives: Vec<String>,
}

/// The document written to an executor's stdin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionContext {
    pub capability_code: String,
    pub capability_name: String,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub directive: DirectiveSummary,
    /// Why selection required this capability.
    pub reasons: Vec<String>,
}

impl ExecutionContext {
    pub fn new(
        definition: &CapabilityDefinition,
        directive: &Directive,
        phase: Phase,
        session_id: Option<&str>,
        reasons: &[String],
        max_chars: usize,
    ) -> Self {
        Self {
            capability_code: definition.code.clone(),
            capability_name: definition.name.clone(),
            phase,
            session_id: session_id.map(str::to_string),
            directive: DirectiveSummary {
                id: directive.id.clone(),
                uuid: directive.uuid.clone(),
                title: truncate(&directive.title, max_chars),
                directive_type: directive.directive_type.as_str().to_string(),
                intensity: directive.intensity.map(|i| i.to_string()),
                priority: directive.priority,
                description: truncate(&directive.description, max_chars),
                scope: truncate(&directive.scope, max_chars),
                objectives: directive
                    .objectives
                    .iter()
                    .map(|o| truncate(o, max_chars))
                    .collect(),
            },
            reasons: reasons.to_vec(),
        }
    }
}

/// Cut `text` to at most `max_chars` characters, on a char boundary.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[async_trait]
pub trait CapabilityExecutor: Send + Sync {
    /// Run one capability. Any error is turned into a synthesized failure
    /// record by the engine.
    async fn execute(&self, code: &str, directive_id: &str, context: &ExecutionContext) -> Result<Value>;
}

/// Runs an external command per capability.
///
/// The serialized [`ExecutionContext`] goes to stdin; stdout is scanned for a
/// JSON object. `PHASEGATE_CAPABILITY` and `PHASEGATE_DIRECTIVE` are set in
/// the child's environment.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    command: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandExecutor {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl CapabilityExecutor for CommandExecutor {
    async fn execute(&self, code: &str, directive_id: &str, context: &ExecutionContext) -> Result<Value> {
        let payload = serde_json::to_vec(context).context("Failed to serialize execution context")?;

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .env("PHASEGATE_CAPABILITY", code)
            .env("PHASEGATE_DIRECTIVE", directive_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn executor '{}'", self.command))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child that never reads stdin closes the pipe; that is not an error.
            if let Err(e) = stdin.write_all(&payload).await {
                tracing::debug!(capability = code, error = %e, "executor did not read stdin");
            }
            let _ = stdin.shutdown().await;
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for executor process")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Executor for {} exited with code {}: {}",
                code,
                output.status.code().unwrap_or(-1),
                truncate(stderr.trim(), 500)
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_output(&stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CapabilityDefinition;
    use crate::directive::DirectiveType;

    fn context(max_chars: usize) -> ExecutionContext {
        let definition = CapabilityDefinition::new("DATABASE", "Database review", 90);
        let directive = Directive::new("SD-1", "Database Migration for User Tables")
            .with_description("Create migration scripts for user authentication tables")
            .with_type(DirectiveType::Database);
        ExecutionContext::new(
            &definition,
            &directive,
            Phase::ExecImpl,
            Some("s1"),
            &["mandatory".to_string()],
            max_chars,
        )
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
        assert_eq!(truncate("abc", 0), "");
    }

    #[test]
    fn test_context_truncates_text() {
        let ctx = context(8);
        assert_eq!(ctx.directive.title, "Database");
        assert_eq!(ctx.directive.description, "Create m");
        assert_eq!(ctx.directive.directive_type, "database");
    }

    #[test]
    fn test_context_serializes() {
        let value = serde_json::to_value(context(DEFAULT_MAX_CONTEXT_CHARS)).unwrap();
        assert_eq!(value["capability_code"], "DATABASE");
        assert_eq!(value["phase"], "EXEC_IMPL");
        assert_eq!(value["session_id"], "s1");
        assert_eq!(value["directive"]["type"], "database");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_executor_parses_stdout() {
        let exec = CommandExecutor::new("sh").with_args(vec![
            "-c".into(),
            "cat > /dev/null; echo \"{\\\"verdict\\\":\\\"PASS\\\",\\\"capability\\\":\\\"$PHASEGATE_CAPABILITY\\\"}\"".into(),
        ]);
        let value = exec.execute("DATABASE", "SD-1", &context(100)).await.unwrap();
        assert_eq!(value["verdict"], "PASS");
        assert_eq!(value["capability"], "DATABASE");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_executor_non_json_output() {
        let exec = CommandExecutor::new("sh").with_args(vec!["-c".into(), "echo looks fine".into()]);
        let value = exec.execute("DATABASE", "SD-1", &context(100)).await.unwrap();
        assert_eq!(value, serde_json::json!({"analysis": "looks fine"}));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_executor_failure_exit() {
        let exec = CommandExecutor::new("sh").with_args(vec!["-c".into(), "echo boom >&2; exit 3".into()]);
        let err = exec.execute("DATABASE", "SD-1", &context(100)).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exited with code 3"));
        assert!(msg.contains("boom"));
    }

    #[tokio::test]
    async fn test_command_executor_missing_binary() {
        let exec = CommandExecutor::new("phasegate-no-such-executor-binary");
        assert!(exec.execute("DATABASE", "SD-1", &context(100)).await.is_err());
    }
}
