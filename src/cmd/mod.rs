//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module      | Commands handled                                  |
//! |-------------|---------------------------------------------------|
//! | `project`   | `Init`                                            |
//! | `config`    | `Config`                                          |
//! | `directive` | `Directive`, `Patterns`                           |
//! | `evaluate`  | `Score`, `Requirements`, `Evaluate`, `History`    |

pub mod config;
pub mod directive;
pub mod evaluate;
pub mod project;

pub use config::cmd_config;
pub use directive::{cmd_directive, cmd_patterns};
pub use evaluate::{cmd_evaluate, cmd_history, cmd_requirements, cmd_score};
pub use project::cmd_init;

use anyhow::Result;
use phasegate::config::GateConfig;
use phasegate::store::DbHandle;
use std::path::Path;

/// Load `phasegate.toml` with the global CLI overrides applied.
pub fn load_config(cli: &crate::Cli, project_dir: &Path) -> Result<GateConfig> {
    GateConfig::with_cli_args(
        project_dir.to_path_buf(),
        cli.executor.clone(),
        cli.parallel_override(),
        cli.db.clone(),
    )
}

pub fn open_db(config: &GateConfig) -> Result<DbHandle> {
    let path = config.db_path();
    tracing::debug!(path = %path.display(), "opening database");
    DbHandle::open(&path)
}
