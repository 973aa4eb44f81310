//! CLI argument parsing and command dispatch

use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daos_bench_core::{
    sweep_timestamp, EnvFile, OrchestratorBuilder, RunnerConfig, SweepPlan, SweepSummary,
    SystemRunner, ToolResolver,
};

/// File the sweep summary is written to with `--json`
const SUMMARY_FILE: &str = "sweep-summary.json";

/// fio benchmark sweeps over DAOS pools and containers
#[derive(Parser, Debug)]
#[command(name = "daos-fio-bench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a full benchmark sweep
    Run {
        /// Path to the runner configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Write the sweep summary as JSON into the output root
        #[arg(long)]
        json: bool,
    },
    /// Validate a runner configuration file and print the sweep plan
    Validate {
        /// Path to the runner configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

impl Cli {
    /// Dispatch the selected command
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Run { config, json } => run_sweep(config, *json).await,
            Commands::Validate { config } => validate(config),
        }
    }
}

fn load_config(path: &Path) -> Result<RunnerConfig> {
    RunnerConfig::from_file(path)
        .with_context(|| format!("Failed to load runner config: {}", path.display()))
}

async fn run_sweep(config_path: &Path, json: bool) -> Result<()> {
    let cwd = std::env::current_dir().context("Cannot determine working directory")?;
    let config = load_config(config_path)?;

    let environment = match config.env_file(&cwd) {
        Some(path) => {
            let environment = EnvFile::new(&path)
                .load()
                .await
                .with_context(|| format!("Failed to load env file: {}", path.display()))?;
            tracing::info!(path = %path.display(), vars = environment.len(), "Environment loaded");
            Some(environment)
        }
        None => {
            tracing::info!("No env file configured, using the process environment");
            None
        }
    };

    let search_path = environment
        .as_ref()
        .and_then(|env| env.get("PATH"))
        .map(OsString::from)
        .or_else(|| std::env::var_os("PATH"));
    let mut resolver = ToolResolver::new(search_path, &cwd);
    for (name, path) in config.tool_overrides(&cwd) {
        resolver = resolver.with_override(name, path);
    }

    let runner = match environment {
        Some(environment) => SystemRunner::with_environment(environment),
        None => SystemRunner::new(),
    };

    let timestamp = sweep_timestamp();
    let plan = config.sweep_plan(&cwd, timestamp);
    let settings = config.session_settings(&cwd);

    println!("\n{}", "=".repeat(70));
    println!("   DAOS fio bench - Pool/Container Benchmark Sweep");
    println!("{}", "=".repeat(70));
    println!();
    println!("Configuration:");
    println!("  Control config: {}", settings.control_config.display());
    println!("  Agent config:   {}", settings.agent_config.display());
    println!("  Pool size:      SCM {} / NVMe {}", settings.scm_size, settings.nvme_size);
    println!("  Reclaim mode:   {}", settings.reclaim_mode);
    println!("  Sweep points:   {}", plan.points.len());
    println!("  Output root:    {}", plan.output_root.display());
    if let Some(job_file) = &plan.custom_job_file {
        println!("  Custom job:     {}", job_file.display());
    }
    println!("{}", "=".repeat(70));
    println!();

    let mut orchestrator = OrchestratorBuilder::new()
        .runner(Arc::new(runner))
        .resolver(resolver)
        .settings(settings)
        .build()?;

    let summary = orchestrator.run_sweep(&plan).await.context("Sweep failed")?;

    print_summary(&summary);

    if json {
        let path = write_summary(&plan, &summary)?;
        println!("Summary written to {}", path.display());
    }

    Ok(())
}

fn write_summary(plan: &SweepPlan, summary: &SweepSummary) -> Result<PathBuf> {
    std::fs::create_dir_all(&plan.output_root).with_context(|| {
        format!("Failed to create output root: {}", plan.output_root.display())
    })?;
    let path = plan.output_root.join(SUMMARY_FILE);
    let file = File::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, summary)?;
    tracing::info!(path = %path.display(), runs = summary.runs.len(), "Sweep summary written");
    Ok(path)
}

fn print_summary(summary: &SweepSummary) {
    println!("{}", "=".repeat(70));
    println!("   Sweep Results ({})", summary.timestamp);
    println!("{}", "=".repeat(70));
    println!();
    println!("Runs ({} points):", summary.points);
    for run in &summary.runs {
        let mode = run
            .mode
            .map(|m| m.to_string())
            .unwrap_or_else(|| "custom".to_string());
        let tag = if run.prefill { " (prefill)" } else { "" };
        println!(
            "  {:<28} {:<10}{:<10} {}",
            run.label,
            mode,
            tag,
            run.output_path.display()
        );
    }
    println!();
    println!("Teardown:");
    println!("  Container:  {}", summary.teardown.container);
    println!("  Pool:       {}", summary.teardown.pool);
    println!("  Agent:      {}", summary.teardown.agent);
    println!();
    println!("{}", "=".repeat(70));
    println!();
}

fn validate(config_path: &Path) -> Result<()> {
    let cwd = std::env::current_dir().context("Cannot determine working directory")?;
    let config = load_config(config_path)?;
    let plan = config.sweep_plan(&cwd, "<timestamp>");

    println!("Configuration OK: {}", config_path.display());
    println!("  Pool size:     SCM {} / NVMe {}", config.scm_size, config.nvme_size);
    println!("  Reclaim mode:  {}", config.reclaim_mode);
    println!("  Sweep points:  {}", plan.points.len());
    for point in &plan.points {
        println!("    {:<28} {}", point.label(), point.mode);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli =
            Cli::try_parse_from(["daos-fio-bench", "run", "--config", "runner.yaml", "--json"])
                .unwrap();
        match cli.command {
            Commands::Run { config, json } => {
                assert_eq!(config, PathBuf::from("runner.yaml"));
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(!cli.verbose);
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::try_parse_from(["daos-fio-bench", "validate", "-c", "runner.yaml", "-v"])
            .unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Validate { .. }));
    }

    #[test]
    fn test_command_required() {
        assert!(Cli::try_parse_from(["daos-fio-bench"]).is_err());
    }
}
