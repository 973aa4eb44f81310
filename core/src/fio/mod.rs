//! Benchmark execution with fio and the DAOS engine plugin
//!
//! [`BenchmarkRunner`] turns a sweep point plus the live pool and container
//! into a job file, then runs fio with the plugin preloaded. fio's stdout is
//! consumed line by line on a separate task (see [`render_progress`]) while
//! the child runs, and the whole of it is kept for the outcome.

mod job_file;
mod progress;

pub use job_file::{
    BenchmarkRunConfig, FioJobFile, FioSection, IoMode, GLOBAL_SECTION, PERCENTILE_LIST,
    TEST_SECTION,
};
pub use progress::{render_progress, ProgressTarget, ERASE_PREVIOUS_LINE};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::command::{CommandRunner, CommandSpec};
use crate::error::{BenchError, BenchResult};
use crate::handles::{ContainerHandle, PoolHandle};

/// Lines buffered between the fio reader and the console renderer
const PROGRESS_BUFFER: usize = 64;

/// Result of a finished, successful fio run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BenchmarkOutcome {
    /// Rendered command line
    pub command: String,
    /// Exit code (always 0 for a returned outcome)
    pub exit_code: i32,
    /// Everything fio printed on stdout
    pub output: String,
    /// File fio wrote its formatted results to
    pub output_path: PathBuf,
}

/// Check that a pool and a container from that pool are both present
pub fn require_target<'a>(
    pool: Option<&'a PoolHandle>,
    container: Option<&'a ContainerHandle>,
) -> BenchResult<(&'a PoolHandle, &'a ContainerHandle)> {
    let pool = pool.ok_or(BenchError::NoPool)?;
    let container = container.ok_or(BenchError::NoContainer)?;
    if !container.belongs_to(pool) {
        return Err(BenchError::StaleContainer {
            container: container.uuid.clone(),
            container_pool: container.pool_uuid.clone(),
        });
    }
    Ok((pool, container))
}

/// Writes job files and runs fio
pub struct BenchmarkRunner {
    runner: Arc<dyn CommandRunner>,
    fio: PathBuf,
    plugin: PathBuf,
    progress: ProgressTarget,
}

impl BenchmarkRunner {
    /// Runner for the given fio binary and DAOS engine plugin
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        fio: impl Into<PathBuf>,
        plugin: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            fio: fio.into(),
            plugin: plugin.into(),
            progress: ProgressTarget::default(),
        }
    }

    /// Choose where live fio output is shown
    pub fn with_progress(mut self, progress: ProgressTarget) -> Self {
        self.progress = progress;
        self
    }

    /// Job file for `run` against the given pool and container
    pub fn job_file(
        &self,
        pool: Option<&PoolHandle>,
        container: Option<&ContainerHandle>,
        run: &BenchmarkRunConfig,
    ) -> BenchResult<FioJobFile> {
        let (pool, container) = require_target(pool, container)?;
        Ok(FioJobFile::for_run(&self.plugin, pool, container, run))
    }

    /// Write the job file for `run` to `path`
    pub async fn write_config(
        &self,
        path: &Path,
        pool: Option<&PoolHandle>,
        container: Option<&ContainerHandle>,
        run: &BenchmarkRunConfig,
    ) -> BenchResult<()> {
        let job = self.job_file(pool, container, run)?;
        job.write_to(path).await?;
        tracing::info!(
            path = %path.display(),
            mode = %run.mode,
            bs = %run.block_size,
            iodepth = run.queue_depth,
            "Wrote fio job file"
        );
        Ok(())
    }

    /// Run fio on `config_path`, writing results to `output_dir/output_file`
    ///
    /// A non-zero exit is returned as [`BenchError::BenchmarkExecutionFailed`]
    /// carrying the command line, exit code and the captured stdout verbatim.
    pub async fn run(
        &self,
        config_path: &Path,
        output_dir: &Path,
        output_file: &str,
    ) -> BenchResult<BenchmarkOutcome> {
        tokio::fs::create_dir_all(output_dir).await?;
        let output_path = output_dir.join(output_file);

        let command = CommandSpec::new(&self.fio)
            .env("LD_PRELOAD", self.plugin.display().to_string())
            .path_arg(config_path)
            .arg(format!("--output={}", output_path.display()))
            .arg("--eta=always");
        let rendered = command.display();

        tracing::info!(command = %rendered, "Running benchmark");

        let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
        let display = match self.progress {
            ProgressTarget::Console => {
                tokio::spawn(async move { render_progress(rx, std::io::stdout()).await })
            }
            ProgressTarget::Silent => {
                tokio::spawn(async move { render_progress(rx, std::io::sink()).await })
            }
        };

        let result = self.runner.stream(&command, tx).await;

        match display.await {
            Ok(Ok(lines)) => tracing::debug!(lines, "Progress display finished"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Progress display failed"),
            Err(e) => tracing::warn!(error = %e, "Progress display task aborted"),
        }

        let output = result.map_err(|e| BenchError::spawn(rendered.clone(), e))?;

        if !output.succeeded() {
            let code = output.code.unwrap_or(-1);
            tracing::error!(code, command = %rendered, "Benchmark failed");
            return Err(BenchError::BenchmarkExecutionFailed {
                command: rendered,
                code,
                output: output.stdout,
            });
        }

        tracing::info!(output_path = %output_path.display(), "Benchmark completed");
        Ok(BenchmarkOutcome {
            command: rendered,
            exit_code: 0,
            output: output.stdout,
            output_path,
        })
    }
}
