//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use anyhow::Context;
use fairhire_ml::artifacts::LoadedArtifacts;
use fairhire_ml::config::{FairnessConfig, load_config, workspace_config_path};
use fairhire_ml::data::TrainingTable;
use fairhire_ml::features::RawRecord;
use fairhire_ml::pipeline;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Handle a CLI subcommand.
pub fn handle_command(command: Commands, workspace: &Path, seed: Option<u64>) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace),
        Commands::Train { data } => handle_train(&data, workspace, seed),
        Commands::Evaluate {
            record,
            decision,
            batch,
        } => handle_evaluate(record.as_deref(), decision, batch.as_deref(), workspace),
        Commands::Audit { data } => handle_audit(&data, workspace),
        Commands::Mitigate { data, save } => handle_mitigate(&data, save, workspace, seed),
    }
}

fn effective_config(workspace: &Path, seed: Option<u64>) -> anyhow::Result<FairnessConfig> {
    let mut config = load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    if seed.is_some() {
        config.debias.seed = seed;
    }
    Ok(config)
}

fn artifacts_dir(workspace: &Path, config: &FairnessConfig) -> PathBuf {
    if config.artifacts.dir.is_absolute() {
        config.artifacts.dir.clone()
    } else {
        workspace.join(&config.artifacts.dir)
    }
}

fn load_artifacts(workspace: &Path, config: &FairnessConfig) -> anyhow::Result<LoadedArtifacts> {
    let dir = artifacts_dir(workspace, config);
    LoadedArtifacts::load(&dir).with_context(|| {
        format!(
            "No usable artifacts in {}. Run `fairhire train` first.",
            dir.display()
        )
    })
}

fn load_table(path: &Path) -> anyhow::Result<TrainingTable> {
    TrainingTable::from_path(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Inline JSON, or `@path` naming a JSON file.
fn parse_record(input: &str) -> anyhow::Result<RawRecord> {
    let json = match input.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read record file {path}"))?,
        None => input.to_string(),
    };
    serde_json::from_str(&json).context("Candidate record is not valid JSON")
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let toml_str = FairnessConfig::default().to_toml_string()?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = effective_config(workspace, None)?;
            println!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn handle_train(data: &Path, workspace: &Path, seed: Option<u64>) -> anyhow::Result<()> {
    let config = effective_config(workspace, seed)?;
    let table = load_table(data)?;
    let prepared = pipeline::prepare(&table, &config)?;

    let (model, report) = pipeline::train_baseline(&prepared.split.train, &config)?;
    let audit = pipeline::audit(&model, &prepared.split.test)?;

    let dir = artifacts_dir(workspace, &config);
    LoadedArtifacts::new(prepared.scaler, model).save(&dir)?;

    print_json(&serde_json::json!({
        "artifacts": dir,
        "training": report,
        "test": audit,
        "bias_detected": audit.bias_detected(config.decision.threshold),
    }))
}

fn handle_evaluate(
    record: Option<&str>,
    decision: u8,
    batch: Option<&Path>,
    workspace: &Path,
) -> anyhow::Result<()> {
    let config = effective_config(workspace, None)?;
    let artifacts = load_artifacts(workspace, &config)?;

    match (record, batch) {
        (_, Some(path)) => {
            let table = load_table(path)?;
            let result = pipeline::evaluate_batch(&artifacts, &table.records, &table.labels, &config)?;
            print_json(&result)
        }
        (Some(input), None) => {
            let record = parse_record(input)?;
            let report = pipeline::evaluate(&artifacts, &record, decision, &config)?;
            print_json(&report)
        }
        (None, None) => anyhow::bail!("Provide --record or --batch"),
    }
}

fn handle_audit(data: &Path, workspace: &Path) -> anyhow::Result<()> {
    let config = effective_config(workspace, None)?;
    let artifacts = load_artifacts(workspace, &config)?;
    let dataset = load_table(data)?.encode(&artifacts.scaler, config.decision.age_threshold)?;
    let report = pipeline::audit(&artifacts.model, &dataset)?;

    print_json(&serde_json::json!({
        "rows": dataset.len(),
        "debiased": artifacts.model.debiased,
        "fairness": report.fairness,
        "classification": report.classification,
        "bias_detected": report.bias_detected(config.decision.threshold),
    }))
}

fn handle_mitigate(data: &Path, save: bool, workspace: &Path, seed: Option<u64>) -> anyhow::Result<()> {
    let config = effective_config(workspace, seed)?;
    let table = load_table(data)?;
    let prepared = pipeline::prepare(&table, &config)?;
    let outcome = pipeline::mitigate(&prepared.split.train, &prepared.split.test, &config)?;

    if let Some(warning) = &outcome.training_report.convergence_warning {
        eprintln!("Warning: {warning}");
    }

    let saved_to = if save {
        let dir = artifacts_dir(workspace, &config);
        LoadedArtifacts::new(prepared.scaler, outcome.debiased_model.clone()).save(&dir)?;
        Some(dir)
    } else {
        None
    };

    print_json(&serde_json::json!({
        "training": outcome.training_report,
        "post_mitigation": outcome.post_mitigation_metrics,
        "classification": outcome.classification,
        "artifacts": saved_to,
    }))
}
