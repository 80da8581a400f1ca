//! Directive and issue pattern storage commands.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;

use phasegate::config::GateConfig;
use phasegate::directive::{Directive, DirectiveResolver};
use phasegate::selection::IssuePattern;
use phasegate::store::db::{DirectiveColumn, GateDb};

use super::super::{DirectiveCommands, PatternsCommands};
use super::open_db;

pub async fn cmd_directive(config: &GateConfig, command: DirectiveCommands) -> Result<()> {
    let db = open_db(config)?;

    match command {
        DirectiveCommands::Import { file } => {
            let items = read_json_items(&file)?;
            let imported = db
                .call(move |db| {
                    let mut imported = Vec::with_capacity(items.len());
                    for item in items {
                        let directive = directive_with_uuid(db, item)?;
                        db.upsert_directive(&directive)?;
                        imported.push(directive);
                    }
                    Ok(imported)
                })
                .await?;

            for directive in &imported {
                println!(
                    "Imported {} ({}) {}",
                    console::style(&directive.id).bold(),
                    directive.directive_type.as_str(),
                    directive.title
                );
            }
            println!("{} directive(s) imported", imported.len());
        }
        DirectiveCommands::Show { id } => {
            let resolver = DirectiveResolver::new(std::sync::Arc::new(db));
            let directive = resolver.resolve(&id).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&directive).context("Failed to serialize directive")?
            );
        }
        DirectiveCommands::List => {
            let directives = db.call(|db| db.list_directives()).await?;
            if directives.is_empty() {
                println!("No directives stored. Run `phasegate directive import <file.json>`.");
                return Ok(());
            }
            for d in directives {
                println!(
                    "{:<16} {:<14} {}",
                    d.id,
                    d.directive_type.as_str(),
                    d.title
                );
            }
        }
    }

    Ok(())
}

pub async fn cmd_patterns(config: &GateConfig, command: PatternsCommands) -> Result<()> {
    let db = open_db(config)?;

    match command {
        PatternsCommands::Import { file } => {
            let patterns = read_json_items(&file)?
                .into_iter()
                .map(|item| serde_json::from_value::<IssuePattern>(item).context("Invalid issue pattern"))
                .collect::<Result<Vec<_>>>()?;
            let count = patterns.len();
            db.call(move |db| {
                for pattern in &patterns {
                    db.upsert_pattern(pattern)?;
                }
                Ok(())
            })
            .await?;
            println!("{} pattern(s) imported", count);
        }
        PatternsCommands::List => {
            let patterns = db.call(|db| db.list_patterns()).await?;
            if patterns.is_empty() {
                println!("No issue patterns stored.");
                return Ok(());
            }
            for p in patterns {
                println!(
                    "{:<16} {:<12} x{:<4} {} -> {}",
                    p.pattern_id,
                    p.category,
                    p.occurrences,
                    p.summary,
                    p.capabilities.join(", ")
                );
            }
        }
    }

    Ok(())
}

/// Read a JSON file holding either one object or an array of objects.
fn read_json_items(file: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse JSON in {}", file.display()))?;
    Ok(match value {
        Value::Array(items) => items,
        other => vec![other],
    })
}

/// Deserialize a directive, keeping the stored uuid for a known id and
/// minting a new one otherwise.
fn directive_with_uuid(db: &GateDb, mut item: Value) -> Result<Directive> {
    let has_uuid = item
        .get("uuid")
        .and_then(Value::as_str)
        .is_some_and(|u| !u.trim().is_empty());

    if !has_uuid {
        let id = item
            .get("id")
            .and_then(Value::as_str)
            .context("Directive is missing an id")?
            .to_string();
        let uuid = match db.find_directive(DirectiveColumn::Id, &id)? {
            Some(existing) => existing.uuid,
            None => uuid::Uuid::new_v4().to_string(),
        };
        if let Value::Object(map) = &mut item {
            map.insert("uuid".to_string(), Value::String(uuid));
        }
    }

    serde_json::from_value(item).context("Invalid directive")
}
