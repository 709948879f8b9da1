//! Vigil - validation pipeline runner
//!
//! The `vigil` command drives the engine from JSON files.
//!
//! ## Commands
//!
//! - `run`: register pipelines, run each once and print the executions
//! - `validate`: registration checks only
//! - `rollback`: restore a file from a remediation backup
//! - `config-template`: print the default engine config

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use vigil_core::{
    AnalyzerKind, BackupStore, CommandAnalyzer, ContextOverrides, Engine, EngineConfig, Execution,
    ExecutionStats, ExecutionStatus, FsBackupStore, PipelineSpec, METRICS,
};

#[derive(Parser)]
#[command(name = "vigil")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run validation pipelines with gated auto-remediation", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register pipelines, run each once and print the results
    Run {
        /// Engine config (JSON); defaults apply when omitted
        #[arg(short, long, env = "VIGIL_CONFIG")]
        config: Option<PathBuf>,

        /// Pipeline definitions (JSON object or array)
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Project directory, overriding each pipeline's own
        #[arg(long)]
        project: Option<PathBuf>,
    },

    /// Check pipeline definitions without running them
    Validate {
        #[arg(short, long, env = "VIGIL_CONFIG")]
        config: Option<PathBuf>,

        #[arg(short, long)]
        pipeline: PathBuf,
    },

    /// Restore a file from a remediation backup
    Rollback {
        /// Backup directory (default: .vigil/backups)
        #[arg(long, default_value = ".vigil/backups")]
        backup_dir: PathBuf,

        /// Backup id recorded on the remediation
        backup_id: String,
    },

    /// Print the default engine config as JSON
    ConfigTemplate,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PipelineFile {
    Many(Vec<PipelineSpec>),
    One(Box<PipelineSpec>),
}

#[derive(Debug, Serialize)]
struct RunReport {
    executions: Vec<Execution>,
    stats: ExecutionStats,
}

impl RunReport {
    fn all_completed(&self) -> bool {
        self.executions
            .iter()
            .all(|e| e.status == ExecutionStatus::Completed)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    vigil_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            config,
            pipeline,
            project,
        } => {
            if !cmd_run(config.as_deref(), &pipeline, project).await? {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Validate { config, pipeline } => {
            if !cmd_validate(config.as_deref(), &pipeline)? {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Rollback {
            backup_dir,
            backup_id,
        } => cmd_rollback(&backup_dir, &backup_id),
        Commands::ConfigTemplate => cmd_config_template(),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load engine config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn load_pipelines(path: &Path) -> Result<Vec<PipelineSpec>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;
    let parsed: PipelineFile = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse pipeline file {}", path.display()))?;
    Ok(match parsed {
        PipelineFile::Many(specs) => specs,
        PipelineFile::One(spec) => vec![*spec],
    })
}

/// One `CommandAnalyzer` per enabled kind; philosophy results feed alignment.
fn build_engine(config: EngineConfig) -> Result<Engine> {
    let kinds: Vec<AnalyzerKind> = config.enabled_analyzers.iter().copied().collect();
    let builder = kinds.into_iter().fold(Engine::builder(config), |builder, kind| {
        let analyzer = match kind {
            AnalyzerKind::Philosophy => CommandAnalyzer::new(kind).with_alignment(),
            _ => CommandAnalyzer::new(kind),
        };
        builder.analyzer(Arc::new(analyzer))
    });
    builder.build().context("Failed to build engine")
}

async fn run_pipelines(
    config: EngineConfig,
    specs: Vec<PipelineSpec>,
    project: Option<PathBuf>,
) -> Result<RunReport> {
    let engine = build_engine(config)?;

    let mut ids = Vec::with_capacity(specs.len());
    for spec in specs {
        let name = spec.name.clone();
        let pipeline = engine
            .register_pipeline(spec)
            .with_context(|| format!("Pipeline '{name}' is invalid"))?;
        let overrides = ContextOverrides {
            project_path: project.clone(),
            ..ContextOverrides::default()
        };
        let id = engine
            .request_execution(pipeline, overrides)
            .with_context(|| format!("Pipeline '{name}' could not be queued"))?;
        ids.push(id);
    }

    engine.run_until_idle().await;
    METRICS.flush();

    let executions = ids
        .into_iter()
        .filter_map(|id| engine.execution(id))
        .collect();
    Ok(RunReport {
        executions,
        stats: engine.stats(),
    })
}

async fn cmd_run(config: Option<&Path>, pipeline: &Path, project: Option<PathBuf>) -> Result<bool> {
    let config = load_config(config)?;
    let specs = load_pipelines(pipeline)?;
    info!(pipelines = specs.len(), "running pipelines");

    let report = run_pipelines(config, specs, project).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    for execution in &report.executions {
        if let Some(error) = &execution.error {
            eprintln!("execution {} failed: {error}", execution.id);
        }
    }
    Ok(report.all_completed())
}

fn validate_pipelines(config: EngineConfig, specs: Vec<PipelineSpec>) -> Result<Vec<(String, Option<String>)>> {
    let engine = build_engine(config)?;
    Ok(specs
        .into_iter()
        .map(|spec| {
            let name = spec.name.clone();
            let error = engine.register_pipeline(spec).err().map(|e| e.to_string());
            (name, error)
        })
        .collect())
}

fn cmd_validate(config: Option<&Path>, pipeline: &Path) -> Result<bool> {
    let config = load_config(config)?;
    let specs = load_pipelines(pipeline)?;

    let mut all_ok = true;
    for (name, error) in validate_pipelines(config, specs)? {
        match error {
            None => println!("ok {name}"),
            Some(error) => {
                all_ok = false;
                println!("invalid {name}: {error}");
            }
        }
    }
    Ok(all_ok)
}

fn cmd_rollback(backup_dir: &Path, backup_id: &str) -> Result<()> {
    let store = FsBackupStore::new(backup_dir);
    let record = store
        .restore(backup_id)
        .with_context(|| format!("Failed to restore backup {backup_id}"))?;
    println!("restored {}", record.target_path.display());
    Ok(())
}

fn cmd_config_template() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&EngineConfig::default())?);
    Ok(())
}
