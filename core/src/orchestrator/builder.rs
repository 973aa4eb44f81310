//! Builder pattern for Orchestrator construction

use std::sync::Arc;

use crate::command::CommandRunner;
use crate::error::{BenchError, BenchResult};
use crate::fio::ProgressTarget;
use crate::tools::ToolResolver;

use super::executor::Orchestrator;
use super::SessionSettings;

/// Builder for creating an Orchestrator with proper configuration
///
/// # Example
///
/// ```ignore
/// let orchestrator = OrchestratorBuilder::new()
///     .runner(Arc::new(SystemRunner::new()))
///     .resolver(ToolResolver::from_process_env()?)
///     .settings(SessionSettings::new("daos_control.yml", "4G", "40G"))
///     .build()?;
/// ```
pub struct OrchestratorBuilder {
    runner: Option<Arc<dyn CommandRunner>>,
    resolver: Option<ToolResolver>,
    settings: Option<SessionSettings>,
    progress: ProgressTarget,
}

impl OrchestratorBuilder {
    /// Create a new orchestrator builder
    pub fn new() -> Self {
        Self {
            runner: None,
            resolver: None,
            settings: None,
            progress: ProgressTarget::default(),
        }
    }

    /// Set the command execution backend
    pub fn runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Set the tool resolver
    pub fn resolver(mut self, resolver: ToolResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Set the session parameters
    pub fn settings(mut self, settings: SessionSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Set where fio progress is displayed
    pub fn progress(mut self, progress: ProgressTarget) -> Self {
        self.progress = progress;
        self
    }

    /// Build the orchestrator
    ///
    /// # Errors
    ///
    /// Returns an error if the runner, resolver or settings are not set, or
    /// if a pool size is empty.
    pub fn build(self) -> BenchResult<Orchestrator> {
        let runner = self
            .runner
            .ok_or_else(|| BenchError::missing_config("runner"))?;

        let resolver = self
            .resolver
            .ok_or_else(|| BenchError::missing_config("resolver"))?;

        let settings = self
            .settings
            .ok_or_else(|| BenchError::missing_config("settings"))?;

        if settings.scm_size.trim().is_empty() || settings.nvme_size.trim().is_empty() {
            return Err(BenchError::config("pool sizes must not be empty"));
        }

        Ok(Orchestrator::new(runner, resolver, settings, self.progress))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
