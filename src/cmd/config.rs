//! Configuration view and validation commands (`phasegate config`).

use anyhow::Result;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    use phasegate::config::{CONFIG_FILE, GateConfig, GateToml};
    use phasegate::init::GATE_DIR;

    let gate_dir = project_dir.join(GATE_DIR);
    let config_path = gate_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Phasegate Configuration");
            println!("=======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No phasegate.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();

            let config = GateConfig::new(project_dir.to_path_buf())?;
            let toml = &config.toml;

            println!("[selection]");
            println!(
                "  confidence_threshold = {}",
                toml.selection.confidence_threshold
            );
            println!(
                "  normalization_ceiling = {}",
                toml.selection.normalization_ceiling
            );
            println!(
                "  coordination_min_matches = {}",
                toml.selection.coordination_min_matches
            );
            println!(
                "  coordination_confidence = {}",
                toml.selection.coordination_confidence
            );
            println!();

            println!("[execution]");
            println!("  timeout_secs = {}", toml.execution.timeout_secs);
            println!("  parallel = {}", toml.execution.parallel);
            println!("  max_context_chars = {}", toml.execution.max_context_chars);
            println!(
                "  idempotency_window_secs = {}",
                toml.execution.idempotency_window_secs
            );
            println!();

            println!("[augmentation]");
            println!("  enabled = {}", toml.augmentation.enabled);
            println!("  timeout_secs = {}", toml.augmentation.timeout_secs);
            println!();

            if !toml.capabilities.is_empty() {
                println!("[[capabilities]]");
                for ov in &toml.capabilities {
                    println!("  {}", ov.code);
                }
                println!();
            }

            println!("Effective values (with env/CLI overrides):");
            match config.executor_command() {
                Some(cmd) => println!("  executor = \"{}\"", cmd),
                None => println!("  executor = (none)"),
            }
            println!("  parallel = {}", config.parallel());
            println!("  db_path = \"{}\"", config.db_path().display());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let config = GateConfig::new(project_dir.to_path_buf())?;
            let warnings = config.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("phasegate.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !gate_dir.exists() {
                std::fs::create_dir_all(&gate_dir)?;
            }

            GateToml::default().save(&config_path)?;

            println!("Created phasegate.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [executor] command, args");
            println!("  - [selection] thresholds");
            println!("  - [[capabilities]] overrides for the built-in catalog");
            println!();
        }
    }

    Ok(())
}
