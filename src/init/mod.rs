//! Initialization of the `.phasegate/` project directory.
//!
//! ```text
//! .phasegate/
//! ├── phasegate.toml   # Configuration (defaults written on init)
//! ├── phasegate.db     # Directives, execution results, issue patterns
//! └── directives/      # Directive JSON files staged for import
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{CONFIG_FILE, GateToml};

/// The name of the phasegate project directory.
pub const GATE_DIR: &str = ".phasegate";

/// Result of initializing a phasegate project.
#[derive(Debug)]
pub struct InitResult {
    /// Path to the .phasegate directory
    pub gate_dir: PathBuf,
    /// Whether the directory was newly created (false if it already existed)
    pub created: bool,
}

/// Initialize a phasegate project in the given directory.
///
/// Re-running on an initialized project only fills in what is missing; an
/// existing `phasegate.toml` is never overwritten.
pub fn init_project(project_dir: &Path) -> Result<InitResult> {
    let gate_dir = project_dir.join(GATE_DIR);

    let created = if gate_dir.exists() {
        ensure_directory_structure(&gate_dir)?;
        false
    } else {
        create_directory_structure(&gate_dir)?;
        true
    };

    Ok(InitResult { gate_dir, created })
}

fn create_directory_structure(gate_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(gate_dir)
        .with_context(|| format!("Failed to create directory: {}", gate_dir.display()))?;

    ensure_directory_structure(gate_dir)
}

fn ensure_directory_structure(gate_dir: &Path) -> Result<()> {
    let directives_dir = gate_dir.join("directives");
    std::fs::create_dir_all(&directives_dir).with_context(|| {
        format!(
            "Failed to create directives directory: {}",
            directives_dir.display()
        )
    })?;

    let config_file = gate_dir.join(CONFIG_FILE);
    if !config_file.exists() {
        GateToml::default().save(&config_file)?;
    }

    Ok(())
}

/// Check if a project is already initialized.
pub fn is_initialized(project_dir: &Path) -> bool {
    project_dir.join(GATE_DIR).exists()
}
