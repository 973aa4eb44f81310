//! Parameter sweep driver

use std::iter;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::SweepPoint;
use crate::error::{BenchResult, TeardownStatus};
use crate::fio::IoMode;

use super::executor::{Orchestrator, TeardownReport};

/// Format of the timestamp suffix on result directories
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Local wall-clock time formatted as a result directory suffix
pub fn sweep_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Everything needed to drive one sweep
#[derive(Debug, Clone, Serialize)]
pub struct SweepPlan {
    /// Points in execution order
    pub points: Vec<SweepPoint>,
    /// Parent of the per-point result directories
    pub output_root: PathBuf,
    /// Job file run at every point instead of generated ones
    pub custom_job_file: Option<PathBuf>,
    /// Recreate the pool for every point
    pub fresh_pool_per_point: bool,
    /// Suffix shared by every result directory of this sweep
    pub timestamp: String,
}

impl SweepPlan {
    /// `<output_root>/result_<label>_<timestamp>`
    pub fn result_dir(&self, point: &SweepPoint) -> PathBuf {
        self.output_root
            .join(format!("result_{}_{}", point.label(), self.timestamp))
    }
}

/// One fio invocation that exited cleanly
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedRun {
    /// Sweep point label
    pub label: String,
    /// Operation; `None` for a custom job file
    pub mode: Option<IoMode>,
    /// Whether this was the write pass before a read
    pub prefill: bool,
    /// Job file fio ran
    pub job_file: PathBuf,
    /// fio's formatted result file
    pub output_path: PathBuf,
    /// fio exit code
    pub exit_code: i32,
}

/// Result of a completed sweep
#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    /// Sweep timestamp
    pub timestamp: String,
    /// Number of sweep points
    pub points: usize,
    /// Every fio run, in order
    pub runs: Vec<CompletedRun>,
    /// Final teardown statuses
    pub teardown: TeardownReport,
}

impl Orchestrator {
    /// Run every point of `plan`, then tear the session down
    ///
    /// Teardown runs whether or not the sweep succeeded; a fatal error is
    /// returned only after every acquired resource has been released (or its
    /// release has been attempted).
    pub async fn run_sweep(&mut self, plan: &SweepPlan) -> BenchResult<SweepSummary> {
        tracing::info!(
            points = plan.points.len(),
            output_root = %plan.output_root.display(),
            custom_job_file = plan.custom_job_file.is_some(),
            "Starting sweep"
        );

        let mut runs = Vec::new();
        let result = self.drive_sweep(plan, &mut runs).await;
        let teardown = self.shutdown().await;

        match result {
            Ok(()) => {
                tracing::info!(runs = runs.len(), "Sweep completed");
                Ok(SweepSummary {
                    timestamp: plan.timestamp.clone(),
                    points: plan.points.len(),
                    runs,
                    teardown,
                })
            }
            Err(e) => {
                tracing::error!(error = %e, completed_runs = runs.len(), "Sweep aborted");
                Err(e)
            }
        }
    }

    async fn drive_sweep(
        &mut self,
        plan: &SweepPlan,
        runs: &mut Vec<CompletedRun>,
    ) -> BenchResult<()> {
        self.start_agent().await?;

        for (idx, point) in plan.points.iter().enumerate() {
            let label = point.label();
            tracing::info!(
                point = idx + 1,
                of = plan.points.len(),
                label = %label,
                mode = %point.mode,
                "Sweep point"
            );

            if self.session.pool.is_none() {
                self.create_pool().await?;
            }
            let request = self.session.settings.container.clone();
            self.create_container(&request).await?;

            let result_dir = plan.result_dir(point);

            match &plan.custom_job_file {
                Some(job_file) => {
                    let outcome = self
                        .run_benchmark(job_file, &result_dir, &format!("cconfig-{}", label))
                        .await?;
                    runs.push(CompletedRun {
                        label: label.clone(),
                        mode: None,
                        prefill: false,
                        job_file: job_file.clone(),
                        output_path: outcome.output_path,
                        exit_code: outcome.exit_code,
                    });
                }
                None => {
                    tokio::fs::create_dir_all(&result_dir).await?;
                    let run = point.run_config();
                    let passes = run
                        .mode
                        .prefill()
                        .map(|mode| (mode, true))
                        .into_iter()
                        .chain(iter::once((run.mode, false)));

                    for (mode, prefill) in passes {
                        let job_file = result_dir.join(format!("config{}_{}.fio", label, mode));
                        self.write_benchmark_config(&job_file, &run.with_mode(mode))
                            .await?;
                        let outcome = self
                            .run_benchmark(&job_file, &result_dir, &format!("{}-{}", mode, label))
                            .await?;
                        runs.push(CompletedRun {
                            label: label.clone(),
                            mode: Some(mode),
                            prefill,
                            job_file,
                            output_path: outcome.output_path,
                            exit_code: outcome.exit_code,
                        });
                    }
                }
            }

            if let TeardownStatus::Failed(notice) = self.destroy_container().await {
                // A container that cannot be destroyed must not block the next point
                tracing::warn!(notice = %notice, "Abandoning container");
                self.session.container = None;
            }

            if plan.fresh_pool_per_point {
                self.destroy_pool().await;
            }
        }

        Ok(())
    }
}
