//! Configuration for phasegate.
//!
//! Settings come from `.phasegate/phasegate.toml`, then environment
//! variables, then CLI flags, each layer overriding the previous one.
//!
//! # Configuration File Format
//!
//! ```toml
//! [selection]
//! confidence_threshold = 40.0
//! normalization_ceiling = 24.0
//! coordination_min_matches = 2
//! coordination_confidence = 60
//!
//! [execution]
//! timeout_secs = 300
//! parallel = false
//! max_context_chars = 4000
//! idempotency_window_secs = 3600
//!
//! [augmentation]
//! enabled = true
//! timeout_secs = 10
//! min_keyword_hits = 2
//! min_occurrences = 2
//!
//! [executor]
//! command = "./scripts/review.sh"
//! args = ["--json"]
//!
//! [storage]
//! db_path = "phasegate.db"
//!
//! [[capabilities]]
//! code = "DATABASE"
//! priority = 92
//! extra_primary = ["prisma"]
//! ```
//!
//! # Environment
//!
//! | Variable                 | Overrides             |
//! |--------------------------|-----------------------|
//! | `PHASEGATE_EXECUTOR_CMD` | `executor.command`    |
//! | `PHASEGATE_PARALLEL`     | `execution.parallel`  |
//! | `PHASEGATE_DB`           | `storage.db_path`     |

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::CapabilityOverride;
use crate::execution::EngineConfig;
use crate::init::GATE_DIR;
use crate::selection::augment::{
    DEFAULT_AUGMENTATION_TIMEOUT_SECS, DEFAULT_PATTERN_MIN_KEYWORD_HITS,
    DEFAULT_PATTERN_MIN_OCCURRENCES,
};
use crate::selection::coordination::{
    DEFAULT_COORDINATION_CONFIDENCE, DEFAULT_COORDINATION_MIN_MATCHES,
};
use crate::selection::scorer::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_NORMALIZATION_CEILING};
use crate::selection::{ScoringConfig, SelectionConfig};

pub const CONFIG_FILE: &str = "phasegate.toml";
pub const DEFAULT_DB_FILE: &str = "phasegate.db";

pub const ENV_EXECUTOR_CMD: &str = "PHASEGATE_EXECUTOR_CMD";
pub const ENV_PARALLEL: &str = "PHASEGATE_PARALLEL";
pub const ENV_DB: &str = "PHASEGATE_DB";

/// Keyword scoring and coordination settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionSection {
    /// Minimum confidence percentage for a keyword recommendation
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Weighted score that maps to 100% confidence
    #[serde(default = "default_normalization_ceiling")]
    pub normalization_ceiling: f64,
    /// Distinct keywords a coordination rule needs before it fires
    #[serde(default = "default_coordination_min_matches")]
    pub coordination_min_matches: usize,
    /// Confidence given to capabilities added by coordination
    #[serde(default = "default_coordination_confidence")]
    pub coordination_confidence: u8,
}

fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_normalization_ceiling() -> f64 {
    DEFAULT_NORMALIZATION_CEILING
}

fn default_coordination_min_matches() -> usize {
    DEFAULT_COORDINATION_MIN_MATCHES
}

fn default_coordination_confidence() -> u8 {
    DEFAULT_COORDINATION_CONFIDENCE
}

impl Default for SelectionSection {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            normalization_ceiling: default_normalization_ceiling(),
            coordination_min_matches: default_coordination_min_matches(),
            coordination_confidence: default_coordination_confidence(),
        }
    }
}

/// Execution engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSection {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_window_secs")]
    pub idempotency_window_secs: u64,
}

fn default_timeout_secs() -> u64 {
    crate::execution::engine::DEFAULT_EXECUTION_TIMEOUT.as_secs()
}

fn default_max_context_chars() -> usize {
    crate::execution::executor::DEFAULT_MAX_CONTEXT_CHARS
}

fn default_window_secs() -> u64 {
    crate::execution::idempotency::DEFAULT_WINDOW.as_secs()
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            parallel: false,
            max_context_chars: default_max_context_chars(),
            idempotency_window_secs: default_window_secs(),
        }
    }
}

/// Augmentation source settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentationSection {
    #[serde(default = "default_augmentation_enabled")]
    pub enabled: bool,
    #[serde(default = "default_augmentation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_min_keyword_hits")]
    pub min_keyword_hits: usize,
    #[serde(default = "default_min_occurrences")]
    pub min_occurrences: u32,
}

fn default_augmentation_enabled() -> bool {
    true
}

fn default_augmentation_timeout_secs() -> u64 {
    DEFAULT_AUGMENTATION_TIMEOUT_SECS
}

fn default_min_keyword_hits() -> usize {
    DEFAULT_PATTERN_MIN_KEYWORD_HITS
}

fn default_min_occurrences() -> u32 {
    DEFAULT_PATTERN_MIN_OCCURRENCES
}

impl Default for AugmentationSection {
    fn default() -> Self {
        Self {
            enabled: default_augmentation_enabled(),
            timeout_secs: default_augmentation_timeout_secs(),
            min_keyword_hits: default_min_keyword_hits(),
            min_occurrences: default_min_occurrences(),
        }
    }
}

/// External command run once per capability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageSection {
    /// Database path. Relative paths resolve against `.phasegate/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

/// The complete phasegate.toml structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateToml {
    #[serde(default)]
    pub selection: SelectionSection,
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub augmentation: AugmentationSection,
    #[serde(default)]
    pub executor: ExecutorSection,
    #[serde(default)]
    pub storage: StorageSection,
    /// Adjustments to the built-in capability catalog
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<CapabilityOverride>,
}

impl GateToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse phasegate.toml")
    }

    /// Load `phasegate.toml` from `gate_dir`, or defaults if it doesn't exist.
    pub fn load_or_default(gate_dir: &Path) -> Result<Self> {
        let config_path = gate_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize phasegate.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let s = &self.selection;

        if !(0.0..=100.0).contains(&s.confidence_threshold) {
            warnings.push(format!(
                "confidence_threshold {} is outside 0-100",
                s.confidence_threshold
            ));
        }
        if s.normalization_ceiling <= 0.0 {
            warnings.push(format!(
                "normalization_ceiling must be positive, got {}",
                s.normalization_ceiling
            ));
        }
        if s.coordination_min_matches == 0 {
            warnings.push("coordination_min_matches of 0 fires every rule on any text".to_string());
        }
        if s.coordination_confidence > 100 {
            warnings.push(format!(
                "coordination_confidence {} is above 100",
                s.coordination_confidence
            ));
        }
        if self.execution.timeout_secs == 0 {
            warnings.push("execution.timeout_secs of 0 fails every capability".to_string());
        }
        if self.execution.idempotency_window_secs == 0 {
            warnings.push("execution.idempotency_window_secs must be positive".to_string());
        }
        if self.augmentation.timeout_secs == 0 && self.augmentation.enabled {
            warnings.push("augmentation.timeout_secs of 0 discards every suggestion".to_string());
        }
        if let Some(ref cmd) = self.executor.command
            && cmd.trim().is_empty()
        {
            warnings.push("executor.command is empty".to_string());
        }

        let (_, unknown) = crate::catalog::StaticCatalog::builtin_with_overrides(&self.capabilities);
        for code in unknown {
            warnings.push(format!("Override for unknown capability '{}'", code));
        }

        warnings
    }

    pub fn selection_config(&self) -> SelectionConfig {
        SelectionConfig {
            scoring: ScoringConfig {
                threshold: self.selection.confidence_threshold,
                normalization_ceiling: self.selection.normalization_ceiling,
            },
            coordination_min_matches: self.selection.coordination_min_matches,
            coordination_confidence: self.selection.coordination_confidence,
        }
    }
}

/// Configuration with environment and CLI layers applied on top of the file.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Path to the project directory
    pub project_dir: PathBuf,
    /// Path to the .phasegate directory
    pub gate_dir: PathBuf,
    /// Parsed phasegate.toml
    pub toml: GateToml,
    /// CLI override: executor command
    pub cli_executor: Option<String>,
    /// CLI override: parallel execution
    pub cli_parallel: Option<bool>,
    /// CLI override: database path
    pub cli_db: Option<PathBuf>,
}

impl GateConfig {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let gate_dir = project_dir.join(GATE_DIR);
        let toml = GateToml::load_or_default(&gate_dir)?;

        Ok(Self {
            project_dir,
            gate_dir,
            toml,
            cli_executor: None,
            cli_parallel: None,
            cli_db: None,
        })
    }

    pub fn with_cli_args(
        project_dir: PathBuf,
        executor: Option<String>,
        parallel: Option<bool>,
        db: Option<PathBuf>,
    ) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.cli_executor = executor;
        config.cli_parallel = parallel;
        config.cli_db = db;
        Ok(config)
    }

    pub fn config_file(&self) -> PathBuf {
        self.gate_dir.join(CONFIG_FILE)
    }

    /// Executor command (CLI → env → file). `None` when nothing is configured.
    pub fn executor_command(&self) -> Option<String> {
        self.cli_executor
            .clone()
            .or_else(|| std::env::var(ENV_EXECUTOR_CMD).ok())
            .or_else(|| self.toml.executor.command.clone())
            .filter(|c| !c.trim().is_empty())
    }

    pub fn executor_args(&self) -> &[String] {
        &self.toml.executor.args
    }

    /// Parallel execution (CLI → env → file).
    pub fn parallel(&self) -> bool {
        if let Some(parallel) = self.cli_parallel {
            return parallel;
        }
        if let Ok(env_val) = std::env::var(ENV_PARALLEL) {
            return matches!(env_val.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        self.toml.execution.parallel
    }

    /// Database path (CLI → env → file → `.phasegate/phasegate.db`).
    pub fn db_path(&self) -> PathBuf {
        let configured = self
            .cli_db
            .clone()
            .or_else(|| std::env::var(ENV_DB).ok().map(PathBuf::from))
            .or_else(|| self.toml.storage.db_path.clone());
        match configured {
            Some(path) if path.is_absolute() => path,
            Some(path) => self.gate_dir.join(path),
            None => self.gate_dir.join(DEFAULT_DB_FILE),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        let exec = &self.toml.execution;
        EngineConfig {
            timeout: Duration::from_secs(exec.timeout_secs),
            window: Duration::from_secs(exec.idempotency_window_secs.max(1)),
            parallel: self.parallel(),
            max_context_chars: exec.max_context_chars,
        }
    }

    pub fn selection_config(&self) -> SelectionConfig {
        self.toml.selection_config()
    }

    pub fn augmentation_timeout(&self) -> Duration {
        Duration::from_secs(self.toml.augmentation.timeout_secs)
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.toml.validate();
        if self.executor_command().is_none() {
            warnings.push(format!(
                "No executor configured; set [executor].command or {}",
                ENV_EXECUTOR_CMD
            ));
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Clears the phasegate environment for the duration of a test.
    struct EnvGuard {
        saved: Vec<(&'static str, Option<String>)>,
    }

    impl EnvGuard {
        fn clear() -> Self {
            let saved = [ENV_EXECUTOR_CMD, ENV_PARALLEL, ENV_DB]
                .into_iter()
                .map(|k| (k, std::env::var(k).ok()))
                .collect();
            for k in [ENV_EXECUTOR_CMD, ENV_PARALLEL, ENV_DB] {
                unsafe { std::env::remove_var(k) };
            }
            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (k, v) in &self.saved {
                match v {
                    Some(v) => unsafe { std::env::set_var(k, v) },
                    None => unsafe { std::env::remove_var(k) },
                }
            }
        }
    }

    fn write_config(dir: &Path, content: &str) {
        let gate_dir = dir.join(GATE_DIR);
        std::fs::create_dir_all(&gate_dir).unwrap();
        std::fs::write(gate_dir.join(CONFIG_FILE), content).unwrap();
    }

    // =========================================
    // GateToml tests
    // =========================================

    #[test]
    fn test_gate_toml_parse_empty() {
        let config = GateToml::parse("").unwrap();
        assert_eq!(config, GateToml::default());
        assert_eq!(config.selection.confidence_threshold, 40.0);
        assert_eq!(config.selection.normalization_ceiling, 24.0);
        assert_eq!(config.execution.timeout_secs, 300);
        assert_eq!(config.execution.idempotency_window_secs, 3600);
        assert_eq!(config.execution.max_context_chars, 4000);
        assert!(config.augmentation.enabled);
        assert_eq!(config.augmentation.timeout_secs, 10);
        assert!(config.capabilities.is_empty());
    }

    #[test]
    fn test_gate_toml_parse_sections() {
        let config = GateToml::parse(
            r#"
            [selection]
            confidence_threshold = 55.0

            [execution]
            parallel = true
            timeout_secs = 60

            [executor]
            command = "review-bot"
            args = ["--json"]

            [storage]
            db_path = "gate.sqlite"

            [[capabilities]]
            code = "DATABASE"
            priority = 92
            extra_primary = ["prisma"]

            [[capabilities]]
            code = "RETRO"
            active = false
            "#,
        )
        .unwrap();

        assert_eq!(config.selection.confidence_threshold, 55.0);
        assert_eq!(config.selection.coordination_min_matches, 2);
        assert!(config.execution.parallel);
        assert_eq!(config.execution.timeout_secs, 60);
        assert_eq!(config.executor.command.as_deref(), Some("review-bot"));
        assert_eq!(config.executor.args, vec!["--json"]);
        assert_eq!(config.storage.db_path, Some(PathBuf::from("gate.sqlite")));
        assert_eq!(config.capabilities.len(), 2);
        assert_eq!(config.capabilities[0].priority, Some(92));
        assert_eq!(config.capabilities[1].active, Some(false));
    }

    #[test]
    fn test_gate_toml_parse_invalid() {
        assert!(GateToml::parse("[selection]\nconfidence_threshold = \"high\"").is_err());
    }

    #[test]
    fn test_gate_toml_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut config = GateToml::default();
        config.executor.command = Some("review-bot".into());
        config.capabilities.push(CapabilityOverride {
            code: "SECURITY".into(),
            extra_exclusions: vec!["security blanket".into()],
            ..Default::default()
        });
        config.save(&path).unwrap();

        assert_eq!(GateToml::load(&path).unwrap(), config);
    }

    #[test]
    fn test_validate_default_is_clean() {
        assert!(GateToml::default().validate().is_empty());
    }

    #[test]
    fn test_validate_warnings() {
        let mut config = GateToml::default();
        config.selection.confidence_threshold = 140.0;
        config.selection.normalization_ceiling = 0.0;
        config.capabilities.push(CapabilityOverride {
            code: "NOPE".into(),
            ..Default::default()
        });
        let warnings = config.validate();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().any(|w| w.contains("confidence_threshold")));
        assert!(warnings.iter().any(|w| w.contains("normalization_ceiling")));
        assert!(warnings.iter().any(|w| w.contains("NOPE")));
    }

    #[test]
    fn test_selection_config_conversion() {
        let mut config = GateToml::default();
        config.selection.confidence_threshold = 60.0;
        config.selection.coordination_confidence = 70;
        let sel = config.selection_config();
        assert_eq!(sel.scoring.threshold, 60.0);
        assert_eq!(sel.coordination_confidence, 70);
    }

    // =========================================
    // GateConfig layering tests
    // =========================================

    #[test]
    fn test_gate_config_defaults_without_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _env = EnvGuard::clear();
        let dir = tempdir().unwrap();
        let config = GateConfig::new(dir.path().to_path_buf()).unwrap();

        assert_eq!(config.toml, GateToml::default());
        assert!(config.executor_command().is_none());
        assert!(!config.parallel());
        assert_eq!(config.db_path(), config.gate_dir.join(DEFAULT_DB_FILE));
        assert_eq!(config.engine_config().timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_gate_config_env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _env = EnvGuard::clear();
        let dir = tempdir().unwrap();
        write_config(
            dir.path(),
            "[executor]\ncommand = \"from-file\"\n[execution]\nparallel = false\n[storage]\ndb_path = \"file.db\"\n",
        );

        let config = GateConfig::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(config.executor_command().as_deref(), Some("from-file"));
        assert_eq!(config.db_path(), config.gate_dir.join("file.db"));

        unsafe {
            std::env::set_var(ENV_EXECUTOR_CMD, "from-env");
            std::env::set_var(ENV_PARALLEL, "true");
            std::env::set_var(ENV_DB, "/tmp/phasegate-env.db");
        }
        assert_eq!(config.executor_command().as_deref(), Some("from-env"));
        assert!(config.parallel());
        assert_eq!(config.db_path(), PathBuf::from("/tmp/phasegate-env.db"));
    }

    #[test]
    fn test_gate_config_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _env = EnvGuard::clear();
        let dir = tempdir().unwrap();
        unsafe {
            std::env::set_var(ENV_EXECUTOR_CMD, "from-env");
            std::env::set_var(ENV_PARALLEL, "1");
        }

        let config = GateConfig::with_cli_args(
            dir.path().to_path_buf(),
            Some("from-cli".into()),
            Some(false),
            Some(PathBuf::from("cli.db")),
        )
        .unwrap();
        assert_eq!(config.executor_command().as_deref(), Some("from-cli"));
        assert!(!config.parallel());
        assert_eq!(config.db_path(), config.gate_dir.join("cli.db"));
    }

    #[test]
    fn test_gate_config_validate_flags_missing_executor() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _env = EnvGuard::clear();
        let dir = tempdir().unwrap();
        let config = GateConfig::new(dir.path().to_path_buf()).unwrap();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains(ENV_EXECUTOR_CMD));
    }
}
