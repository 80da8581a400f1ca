//! Selection and gate evaluation commands.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use phasegate::catalog::{CapabilityCatalog, CatalogSource, StaticCatalog};
use phasegate::config::{ENV_EXECUTOR_CMD, GateConfig};
use phasegate::directive::DirectiveResolver;
use phasegate::execution::{CapabilityExecutor, CommandExecutor, ExecutionContext, ExecutionEngine};
use phasegate::orchestrator::{GateOrchestrator, GateReport, RequirementsReport};
use phasegate::phase::Phase;
use phasegate::selection::{
    AugmentationRunner, DomainScorer, HistoricalPatternMatcher, ImpactClassifier, TextContexts,
};
use phasegate::store::{DbHandle, ResultStore};

use super::open_db;

/// Stands in for the executor when a command only selects.
struct SelectionOnly;

#[async_trait]
impl CapabilityExecutor for SelectionOnly {
    async fn execute(&self, code: &str, _directive_id: &str, _ctx: &ExecutionContext) -> Result<Value> {
        anyhow::bail!("{} cannot run: no executor configured", code)
    }
}

fn catalog(config: &GateConfig) -> StaticCatalog {
    let (catalog, unknown) = StaticCatalog::builtin_with_overrides(&config.toml.capabilities);
    for code in unknown {
        tracing::warn!(capability = %code, "override for unknown capability ignored");
    }
    catalog
}

fn augmentation(config: &GateConfig, db: &DbHandle) -> Result<AugmentationRunner> {
    let runner = AugmentationRunner::new(config.augmentation_timeout());
    if !config.toml.augmentation.enabled {
        return Ok(runner);
    }
    let patterns = HistoricalPatternMatcher::new(Arc::new(db.clone()))
        .with_min_keyword_hits(config.toml.augmentation.min_keyword_hits)
        .with_min_occurrences(config.toml.augmentation.min_occurrences);
    Ok(runner
        .with_source(Arc::new(ImpactClassifier::builtin()?))
        .with_source(Arc::new(patterns)))
}

fn build_orchestrator(
    config: &GateConfig,
    db: DbHandle,
    executor: Arc<dyn CapabilityExecutor>,
) -> Result<GateOrchestrator> {
    let engine = ExecutionEngine::new(executor, Arc::new(db.clone()))
        .with_config(config.engine_config());
    let augmentation = augmentation(config, &db)?;
    let resolver = DirectiveResolver::new(Arc::new(db));

    Ok(
        GateOrchestrator::new(resolver, Arc::new(catalog(config)), engine)
            .with_augmentation(augmentation)
            .with_selection_config(config.selection_config()),
    )
}

fn parse_phase(phase: &str) -> Result<Phase> {
    phase.parse::<Phase>().map_err(anyhow::Error::msg)
}

pub async fn cmd_score(config: &GateConfig, title: &str, description: &str, json: bool) -> Result<()> {
    let definitions = catalog(config).load_active().await?;
    let catalog = CapabilityCatalog::new(definitions);
    let scorer = DomainScorer::new(&catalog, config.selection_config().scoring)?;

    let mut scores = scorer.score_any_phase(&TextContexts::from_title_description(title, description));
    scores.sort_by(|a, b| {
        b.detail
            .confidence
            .cmp(&a.detail.confidence)
            .then_with(|| a.code.cmp(&b.code))
    });

    if json {
        println!("{}", serde_json::to_string_pretty(&scores)?);
        return Ok(());
    }

    for s in scores.iter().filter(|s| s.detail.matched_count > 0) {
        let marker = if s.recommended {
            console::style("●").green().to_string()
        } else {
            console::style("○").dim().to_string()
        };
        println!(
            "{} {:<12} {:>3}%  {}",
            marker,
            s.code,
            s.detail.confidence,
            s.detail.matched_keywords.join(", ")
        );
    }
    let recommended = scores.iter().filter(|s| s.recommended).count();
    println!("{} capability(ies) recommended", recommended);
    Ok(())
}

pub async fn cmd_requirements(config: &GateConfig, id: &str, phase: &str, json: bool) -> Result<()> {
    let phase = parse_phase(phase)?;
    let db = open_db(config)?;
    let orchestrator = build_orchestrator(config, db, Arc::new(SelectionOnly))?;
    let report = orchestrator.requirements(id, phase).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_requirements(&report);
    }
    Ok(())
}

fn print_requirements(report: &RequirementsReport) {
    println!(
        "{} {} [{}]",
        console::style(&report.directive_id).bold(),
        report.title,
        report.phase
    );
    if report.selection.requirements.is_empty() {
        println!("  No capabilities required.");
    }
    for entry in report.selection.requirements.iter() {
        let sources: Vec<String> = entry.sources.iter().map(|s| s.to_string()).collect();
        let confidence = entry
            .confidence
            .map(|c| format!("{:>3}%", c))
            .unwrap_or_else(|| "   -".to_string());
        println!("  {:<12} {} {}", entry.code, confidence, sources.join("+"));
        for reason in &entry.reasons {
            println!("      {}", console::style(reason).dim());
        }
    }
    for skipped in &report.selection.skipped {
        println!(
            "  {} {} ({}): {}",
            console::style("skipped").yellow(),
            skipped.code,
            skipped.source,
            skipped.reason
        );
    }
}

/// Run the gate. Returns whether the directive may proceed.
pub async fn cmd_evaluate(
    config: &GateConfig,
    id: &str,
    phase: &str,
    session: Option<&str>,
    json: bool,
) -> Result<bool> {
    let phase = parse_phase(phase)?;
    let command = config.executor_command().with_context(|| {
        format!(
            "No executor configured. Set [executor].command in phasegate.toml, {} or --executor",
            ENV_EXECUTOR_CMD
        )
    })?;
    let executor = CommandExecutor::new(command)
        .with_args(config.executor_args().to_vec())
        .with_working_dir(config.project_dir.clone());

    let db = open_db(config)?;
    let orchestrator = build_orchestrator(config, db, Arc::new(executor))?;
    let report = orchestrator.evaluate(id, phase, session).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(report.can_proceed())
}

fn print_report(report: &GateReport) {
    println!(
        "{} {} [{}]",
        console::style(&report.directive_id).bold(),
        report.title,
        report.phase
    );
    for outcome in &report.outcomes {
        let r = &outcome.record;
        let reused = if outcome.reused {
            console::style(" (reused)").dim().to_string()
        } else {
            String::new()
        };
        println!(
            "  {} {:<12} {:<16} {:>3}%  {}{}",
            r.verdict.emoji(),
            r.capability_code,
            r.verdict.as_str(),
            r.confidence,
            r.severity.as_str(),
            reused
        );
        for issue in &r.issues {
            println!(
                "      {} {}",
                console::style(issue.severity.as_str()).red(),
                issue.description
            );
        }
    }

    let agg = &report.aggregate;
    let verdict = if agg.can_proceed {
        console::style(agg.verdict.as_str()).green().bold()
    } else {
        console::style(agg.verdict.as_str()).red().bold()
    };
    let confidence = agg
        .confidence
        .map(|c| format!(" ({}% confidence)", c))
        .unwrap_or_default();
    println!();
    println!("Gate: {}{} - {}", verdict, confidence, agg.message);
}

pub async fn cmd_history(config: &GateConfig, id: &str, json: bool) -> Result<()> {
    let db = open_db(config)?;
    let resolver = DirectiveResolver::new(Arc::new(db.clone()));
    let directive = resolver.resolve(id).await?;
    let records = db.list_for_directive(&directive.id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No results stored for {}", directive.id);
        return Ok(());
    }
    for r in records {
        println!(
            "{}  {:<18} {:<12} {} {:<16} {:>3}%  {}",
            r.created_at.format("%Y-%m-%d %H:%M:%S"),
            r.phase.as_str(),
            r.capability_code,
            r.verdict.emoji(),
            r.verdict.as_str(),
            r.confidence,
            r.session_id.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
