//! Orchestrator lifecycle operations

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::agent::AgentProcess;
use crate::command::CommandRunner;
use crate::container::{ContainerManager, ContainerRequest};
use crate::error::{BenchError, BenchResult, Notice, TeardownStatus};
use crate::fio::{
    require_target, BenchmarkOutcome, BenchmarkRunConfig, BenchmarkRunner, ProgressTarget,
};
use crate::handles::{AgentHandle, ContainerHandle, PoolHandle};
use crate::pool::PoolManager;
use crate::tools::{ToolPaths, ToolResolver};

use super::{Session, SessionSettings, SessionState};

/// Managers bound to the resolved tool paths
pub(crate) struct Toolkit {
    pub(crate) pools: PoolManager,
    pub(crate) containers: ContainerManager,
    pub(crate) agent: AgentProcess,
    pub(crate) bench: BenchmarkRunner,
}

/// Statuses of a full best-effort teardown
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    /// Container destroy
    pub container: TeardownStatus,
    /// Pool destroy
    pub pool: TeardownStatus,
    /// Agent stop
    pub agent: TeardownStatus,
}

impl TeardownReport {
    /// True when no teardown step failed
    pub fn is_clean(&self) -> bool {
        ![&self.container, &self.pool, &self.agent]
            .iter()
            .any(|status| matches!(status, TeardownStatus::Failed(_)))
    }
}

/// Orchestrator owns the session and sequences the resource managers
pub struct Orchestrator {
    /// Command execution backend shared by every manager
    pub(crate) runner: Arc<dyn CommandRunner>,

    /// Tool lookup, used once by [`Orchestrator::prepare`]
    pub(crate) resolver: ToolResolver,

    /// Handles and settings
    pub(crate) session: Session,

    /// Where fio progress goes
    pub(crate) progress: ProgressTarget,

    /// Managers, present once the session is prepared
    pub(crate) toolkit: Option<Toolkit>,
}

fn require_tools<'a>(
    toolkit: &'a Option<Toolkit>,
    session: &Session,
    operation: &'static str,
) -> BenchResult<&'a Toolkit> {
    toolkit.as_ref().ok_or(BenchError::InvalidTransition {
        operation,
        state: session.state(),
    })
}

impl Orchestrator {
    /// Create a new orchestrator
    ///
    /// Use `OrchestratorBuilder` for a more ergonomic construction.
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        resolver: ToolResolver,
        settings: SessionSettings,
        progress: ProgressTarget,
    ) -> Self {
        Self {
            runner,
            resolver,
            session: Session::new(settings),
            progress,
            toolkit: None,
        }
    }

    /// The session context
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    fn invalid(&self, operation: &'static str) -> BenchError {
        BenchError::InvalidTransition {
            operation,
            state: self.state(),
        }
    }

    /// Resolve every tool and bind the managers to them
    ///
    /// Idempotent once it has succeeded.
    pub fn prepare(&mut self) -> BenchResult<ToolPaths> {
        if let Some(tools) = &self.session.tools {
            return Ok(tools.clone());
        }

        let tools = self.resolver.resolve_all()?;
        let settings = &self.session.settings;

        self.toolkit = Some(Toolkit {
            pools: PoolManager::new(self.runner.clone(), &tools.dmg, &settings.control_config),
            containers: ContainerManager::new(self.runner.clone(), &tools.daos),
            agent: AgentProcess::new(self.runner.clone(), &tools.daos_agent, &settings.agent_config)
                .with_settle_delay(settings.settle_delay),
            bench: BenchmarkRunner::new(self.runner.clone(), &tools.fio, &tools.fio_plugin)
                .with_progress(self.progress),
        });
        self.session.tools = Some(tools.clone());

        tracing::info!(
            control_config = %self.session.settings.control_config.display(),
            "Session environment ready"
        );
        Ok(tools)
    }

    /// Start the agent, preparing the session first if needed
    pub async fn start_agent(&mut self) -> BenchResult<AgentHandle> {
        if let Some(agent) = self.session.agent {
            return Err(BenchError::AgentAlreadyRunning { pid: agent.pid });
        }

        match self.state() {
            SessionState::Unstarted => {
                self.prepare()?;
            }
            SessionState::EnvReady => {}
            _ => return Err(self.invalid("start agent")),
        }

        let toolkit = require_tools(&self.toolkit, &self.session, "start agent")?;
        let agent = toolkit.agent.start().await?;
        self.session.agent = Some(agent);
        Ok(agent)
    }

    /// Create the session pool and apply the reclaim mode
    ///
    /// The pool is recorded before the reclaim property is set, so a pool
    /// left unreclaimed by a failed property call is still torn down later.
    pub async fn create_pool(&mut self) -> BenchResult<PoolHandle> {
        if self.state() != SessionState::AgentRunning {
            return Err(self.invalid("create pool"));
        }

        let toolkit = require_tools(&self.toolkit, &self.session, "create pool")?;
        let settings = &self.session.settings;
        let pool = toolkit
            .pools
            .create_pool(&settings.scm_size, &settings.nvme_size)
            .await?;
        let reclaim_mode = settings.reclaim_mode;
        self.session.pool = Some(pool.clone());

        toolkit.pools.set_reclaim_mode(&pool, reclaim_mode).await?;
        Ok(pool)
    }

    /// Query the session pool; informational only
    pub async fn query_pool(&self) -> BenchResult<String> {
        let pool = self.session.pool.as_ref().ok_or(BenchError::NoPool)?;
        let toolkit = require_tools(&self.toolkit, &self.session, "query pool")?;
        toolkit.pools.query_pool(Some(pool)).await
    }

    /// Create a container in the session pool
    pub async fn create_container(
        &mut self,
        request: &ContainerRequest,
    ) -> BenchResult<ContainerHandle> {
        let pool = self.session.pool.as_ref().ok_or(BenchError::NoPool)?;
        if self.session.container.is_some() {
            return Err(self.invalid("create container"));
        }

        let toolkit = require_tools(&self.toolkit, &self.session, "create container")?;
        let container = toolkit.containers.create_container(Some(pool), request).await?;
        self.session.container = Some(container.clone());
        Ok(container)
    }

    /// Destroy the session container
    ///
    /// The handle is cleared only on success; after a failure it stays set.
    pub async fn destroy_container(&mut self) -> TeardownStatus {
        let status = match &self.toolkit {
            Some(toolkit) => {
                toolkit
                    .containers
                    .destroy_container(self.session.pool.as_ref(), self.session.container.as_ref())
                    .await
            }
            None => TeardownStatus::NothingToDo(Notice::NoContainerToDestroy),
        };

        if status.is_completed() {
            self.session.container = None;
        }
        status
    }

    /// Write the job file for `run` against the current pool and container
    pub async fn write_benchmark_config(
        &self,
        path: &Path,
        run: &BenchmarkRunConfig,
    ) -> BenchResult<()> {
        let (pool, container) =
            require_target(self.session.pool.as_ref(), self.session.container.as_ref())?;
        let toolkit = require_tools(&self.toolkit, &self.session, "write benchmark config")?;
        toolkit
            .bench
            .write_config(path, Some(pool), Some(container), run)
            .await
    }

    /// Run fio against the current container
    pub async fn run_benchmark(
        &self,
        config_path: &Path,
        output_dir: &Path,
        output_file: &str,
    ) -> BenchResult<BenchmarkOutcome> {
        require_target(self.session.pool.as_ref(), self.session.container.as_ref())?;
        let toolkit = require_tools(&self.toolkit, &self.session, "run benchmark")?;
        toolkit.bench.run(config_path, output_dir, output_file).await
    }

    /// Destroy the session pool
    ///
    /// The pool handle is cleared whatever the outcome, along with any
    /// container handle created in that pool. A failure is still reported
    /// through the returned notice.
    pub async fn destroy_pool(&mut self) -> TeardownStatus {
        let status = match &self.toolkit {
            Some(toolkit) => toolkit.pools.destroy_pool(self.session.pool.as_ref()).await,
            None => TeardownStatus::NothingToDo(Notice::NoPoolToDestroy),
        };

        if let Some(pool) = self.session.pool.take() {
            if self
                .session
                .container
                .as_ref()
                .is_some_and(|container| container.belongs_to(&pool))
            {
                tracing::warn!(pool_uuid = %pool.uuid, "Container released with its pool");
                self.session.container = None;
            }
        }
        status
    }

    /// Kill the agent
    pub async fn stop_agent(&mut self) -> TeardownStatus {
        let status = match &self.toolkit {
            Some(toolkit) => toolkit.agent.stop(self.session.agent.as_ref()).await,
            None => TeardownStatus::NothingToDo(Notice::NoAgentRunning),
        };

        match status {
            TeardownStatus::Completed | TeardownStatus::NothingToDo(_) => {
                self.session.mark_agent_stopped()
            }
            TeardownStatus::Failed(_) => {}
        }
        status
    }

    /// Release every held resource: container, then pool, then agent
    pub async fn shutdown(&mut self) -> TeardownReport {
        let container = self.destroy_container().await;
        let pool = self.destroy_pool().await;
        let agent = self.stop_agent().await;

        let report = TeardownReport {
            container,
            pool,
            agent,
        };
        if report.is_clean() {
            tracing::info!("Session torn down");
        } else {
            tracing::warn!(
                container = %report.container,
                pool = %report.pool,
                agent = %report.agent,
                "Session teardown incomplete"
            );
        }
        report
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("session", &self.session)
            .field("state", &self.state())
            .field("progress", &self.progress)
            .finish()
    }
}
