//! Subcommand implementations

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde::Serialize;
use tracing::info;
use typeflow_analysis::{verify_function, Analyzer, LockedTypes, ValueReport};
use typeflow_core::{GraphSpec, InferConfig, InferTypes, LoadedFunction, Metatype, RoundOutcome, RoundPhase};

use crate::RunArgs;

fn load(run: &RunArgs) -> Result<(LoadedFunction, InferTypes)> {
    let mut config = match &run.config {
        Some(path) => InferConfig::from_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => InferConfig::default(),
    };
    if let Some(max_rounds) = run.max_rounds {
        config.max_rounds = max_rounds;
    }
    let spec = GraphSpec::from_file(&run.graph)
        .with_context(|| format!("failed to read graph {}", run.graph.display()))?;
    let loaded = spec
        .build()
        .with_context(|| format!("invalid graph {}", run.graph.display()))?;
    Ok((loaded, InferTypes::new(config)))
}

/// Apply rounds until the pass stops changing types or `limit` calls were made
fn settle(pass: &InferTypes, loaded: &mut LoadedFunction, limit: Option<u32>) -> Vec<RoundOutcome> {
    let mut outcomes = Vec::new();
    loop {
        let outcome = pass.apply(&mut loaded.types, &mut loaded.fd);
        outcomes.push(outcome);
        let reached = limit.is_some_and(|limit| outcomes.len() >= limit as usize);
        if !matches!(outcome, RoundOutcome::Changed { .. }) || reached {
            break;
        }
    }
    info!(function = loaded.fd.name(), calls = outcomes.len(), "rounds finished");
    outcomes
}

#[derive(Serialize)]
struct InferSummary<'a> {
    function: &'a str,
    outcomes: &'a [RoundOutcome],
    rounds: u32,
    phase: RoundPhase,
    warnings: &'a [String],
    values: Vec<ValueReport>,
}

pub fn infer(run: &RunArgs, rounds: Option<u32>, json: bool) -> Result<()> {
    let (mut loaded, pass) = load(run)?;
    let outcomes = settle(&pass, &mut loaded, rounds);
    let report = Analyzer::new().analyze(&loaded, outcomes.last().copied());

    if json {
        let summary = InferSummary {
            function: loaded.fd.name(),
            outcomes: &outcomes,
            rounds: report.rounds,
            phase: report.phase,
            warnings: loaded.fd.warnings(),
            values: report.values,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let status = match report.phase {
        RoundPhase::Converged => "converged".green(),
        RoundPhase::Capped => "capped".red(),
        RoundPhase::Running => "still changing".yellow(),
        RoundPhase::Idle => "not started".yellow(),
    };
    println!("{} {}: {} after {} round(s)", "function".bold(), report.name.bold(), status, report.rounds);
    for warning in loaded.fd.warnings() {
        eprintln!("{} {}", "warning:".yellow().bold(), warning);
    }
    let width = report.values.iter().map(|v| v.name.len()).max().unwrap_or(0);
    for value in &report.values {
        let ty = if value.metatype == Metatype::Unknown {
            value.ty.dimmed()
        } else {
            value.ty.green()
        };
        let lock = if value.locked { " (locked)" } else { "" };
        println!(
            "  {:width$}  {}:{:#x}:{}  {}{}",
            value.name,
            value.space,
            value.offset,
            value.size,
            ty,
            lock,
            width = width
        );
    }
    Ok(())
}

pub fn report(run: &RunArgs, named_only: bool) -> Result<()> {
    let (mut loaded, pass) = load(run)?;
    let outcomes = settle(&pass, &mut loaded, None);
    let analyzer = if named_only { Analyzer::new().named_only() } else { Analyzer::new() };
    let report = analyzer.analyze(&loaded, outcomes.last().copied());
    println!("{}", report.to_json()?);
    Ok(())
}

pub fn check(run: &RunArgs) -> Result<()> {
    let (mut loaded, pass) = load(run)?;
    let locked = LockedTypes::capture(&loaded.fd);
    settle(&pass, &mut loaded, None);
    let result = verify_function(&loaded.types, &loaded.fd, &locked);
    for violation in &result.violations {
        let value = serde_json::to_string(violation)?;
        eprintln!("{} {}", "violation:".red().bold(), value);
    }
    if !result.is_clean() {
        bail!("{} of {} values failed the type check", result.violations.len(), result.checked);
    }
    println!("{} {} values checked", "ok".green().bold(), result.checked);
    Ok(())
}
