//! Project initialization command.

use anyhow::Result;

pub fn cmd_init(project_dir: &std::path::Path) -> Result<()> {
    use phasegate::init::{init_project, is_initialized};

    let was_initialized = is_initialized(project_dir);

    let result = init_project(project_dir)?;

    if result.created {
        println!(
            "Initialized phasegate project at {}",
            result.gate_dir.display()
        );
        println!();
        println!("Created directory structure:");
        println!("  .phasegate/");
        println!("  ├── phasegate.toml  # Configuration");
        println!("  └── directives/     # Directive files to import");
        println!();
        println!("Next steps:");
        println!("  1. Set [executor].command in phasegate.toml");
        println!("  2. Run `phasegate directive import <file.json>`");
        println!("  3. Run `phasegate evaluate <id> --phase EXEC_IMPL`");
    } else if was_initialized {
        println!(
            "Phasegate project already initialized at {}",
            result.gate_dir.display()
        );
        println!("Directory structure verified.");
    }

    Ok(())
}
