//! Session orchestration
//!
//! The [`Orchestrator`] sequences the resource managers into one benchmark
//! session:
//! - resolve the tool set (env ready)
//! - start the agent, then create the pool
//! - per sweep point: create a container, write job files, run fio, destroy
//!   the container
//! - destroy the pool and stop the agent
//!
//! Every handle lives in the [`Session`], and the session state is derived
//! from which handles are held. Out-of-order calls are rejected at the
//! orchestrator boundary before any external command runs.
//!
//! # Example
//!
//! ```ignore
//! use daos_bench_core::{OrchestratorBuilder, SystemRunner, ToolResolver};
//!
//! let mut orchestrator = OrchestratorBuilder::new()
//!     .runner(Arc::new(SystemRunner::new()))
//!     .resolver(ToolResolver::from_process_env()?)
//!     .settings(config.session_settings(&cwd))
//!     .build()?;
//!
//! let summary = orchestrator.run_sweep(&config.sweep_plan(&cwd, timestamp)).await?;
//! ```

mod builder;
mod executor;
mod sweep;

pub use builder::OrchestratorBuilder;
pub use executor::{Orchestrator, TeardownReport};
pub use sweep::{sweep_timestamp, CompletedRun, SweepPlan, SweepSummary, TIMESTAMP_FORMAT};

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::agent::DEFAULT_SETTLE_DELAY;
use crate::container::ContainerRequest;
use crate::handles::{AgentHandle, ContainerHandle, PoolHandle, ReclaimMode};
use crate::tools::ToolPaths;

/// Lifecycle position of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    /// Nothing done yet
    Unstarted,
    /// Tools resolved
    EnvReady,
    /// Agent started, no pool
    AgentRunning,
    /// Pool created, no container
    PoolReady,
    /// Container created in the current pool
    ContainerReady,
    /// Agent stopped; the session is over
    AgentStopped,
}

impl SessionState {
    /// Kebab-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unstarted => "unstarted",
            Self::EnvReady => "env-ready",
            Self::AgentRunning => "agent-running",
            Self::PoolReady => "pool-ready",
            Self::ContainerReady => "container-ready",
            Self::AgentStopped => "agent-stopped",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed parameters of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Control-plane config for `dmg -o`
    pub control_config: PathBuf,
    /// Agent config for `daos_agent -o`
    pub agent_config: PathBuf,
    /// SCM tier size
    pub scm_size: String,
    /// NVMe tier size
    pub nvme_size: String,
    /// Reclaim property applied to every new pool
    pub reclaim_mode: ReclaimMode,
    /// Wait after the agent starts
    pub settle_delay: Duration,
    /// Container parameters used by the sweep
    pub container: ContainerRequest,
}

impl SessionSettings {
    /// Settings with one config file for both `dmg` and the agent
    pub fn new(
        control_config: impl Into<PathBuf>,
        scm_size: impl Into<String>,
        nvme_size: impl Into<String>,
    ) -> Self {
        let control_config = control_config.into();
        Self {
            agent_config: control_config.clone(),
            control_config,
            scm_size: scm_size.into(),
            nvme_size: nvme_size.into(),
            reclaim_mode: ReclaimMode::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            container: ContainerRequest::default(),
        }
    }

    /// Set the reclaim mode
    pub fn with_reclaim_mode(mut self, mode: ReclaimMode) -> Self {
        self.reclaim_mode = mode;
        self
    }

    /// Set the agent settle delay
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}

/// Mutable context of one orchestration run
///
/// Owned exclusively by the orchestrator.
#[derive(Debug, Clone)]
pub struct Session {
    /// Fixed parameters
    pub settings: SessionSettings,
    /// Resolved tool paths, once prepared
    pub tools: Option<ToolPaths>,
    /// Current pool
    pub pool: Option<PoolHandle>,
    /// Current container
    pub container: Option<ContainerHandle>,
    /// Running agent
    pub agent: Option<AgentHandle>,
    agent_stopped: bool,
}

impl Session {
    /// Fresh session with no tools and no handles
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            tools: None,
            pool: None,
            container: None,
            agent: None,
            agent_stopped: false,
        }
    }

    /// State derived from the handles held
    pub fn state(&self) -> SessionState {
        if self.container.is_some() {
            SessionState::ContainerReady
        } else if self.pool.is_some() {
            SessionState::PoolReady
        } else if self.agent.is_some() {
            SessionState::AgentRunning
        } else if self.agent_stopped {
            SessionState::AgentStopped
        } else if self.tools.is_some() {
            SessionState::EnvReady
        } else {
            SessionState::Unstarted
        }
    }

    pub(crate) fn mark_agent_stopped(&mut self) {
        self.agent = None;
        self.agent_stopped = true;
    }
}
