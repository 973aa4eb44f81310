//! Background DAOS client agent

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::command::{CommandRunner, CommandSpec};
use crate::error::{BenchError, BenchResult, Notice, TeardownStatus};
use crate::handles::AgentHandle;

/// Time given to a fresh agent before pools or containers are touched
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(3);

/// Starts and kills the `daos_agent` process for a session
pub struct AgentProcess {
    runner: Arc<dyn CommandRunner>,
    daos_agent: PathBuf,
    agent_config: PathBuf,
    settle_delay: Duration,
}

impl AgentProcess {
    /// Agent launcher using `agent_config` as its `-o` config file
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        daos_agent: impl Into<PathBuf>,
        agent_config: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            daos_agent: daos_agent.into(),
            agent_config: agent_config.into(),
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Override the post-spawn settle delay
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Spawn the agent detached, then wait out the settle delay
    ///
    /// Returning only after the delay makes this call the synchronization
    /// point for everything that talks to the agent.
    pub async fn start(&self) -> BenchResult<AgentHandle> {
        let command = CommandSpec::new(&self.daos_agent)
            .arg("-o")
            .path_arg(&self.agent_config);

        let pid = self
            .runner
            .spawn_detached(&command)
            .await
            .map_err(|e| BenchError::AgentStartFailed {
                command: command.display(),
                reason: e.to_string(),
            })?;

        tracing::info!(pid, "Started daos agent");

        if !self.settle_delay.is_zero() {
            tracing::debug!(delay = ?self.settle_delay, "Waiting for agent to settle");
            tokio::time::sleep(self.settle_delay).await;
        }

        Ok(AgentHandle { pid })
    }

    /// Kill the agent unconditionally
    ///
    /// No graceful shutdown is attempted; in-flight agent work is aborted.
    pub async fn stop(&self, agent: Option<&AgentHandle>) -> TeardownStatus {
        let Some(agent) = agent else {
            tracing::warn!("No known agent running for this session");
            return TeardownStatus::NothingToDo(Notice::NoAgentRunning);
        };

        tracing::info!(pid = agent.pid, "Stopping daos agent");

        match self.runner.kill(agent.pid).await {
            Ok(()) => TeardownStatus::Completed,
            Err(e) => {
                tracing::warn!(pid = agent.pid, error = %e, "Could not stop daos agent");
                TeardownStatus::Failed(Notice::AgentStopFailed {
                    pid: agent.pid,
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Invocation, MockRunner};

    fn agent(runner: Arc<MockRunner>) -> AgentProcess {
        AgentProcess::new(runner, "/opt/daos/bin/daos_agent", "/etc/daos/daos_agent.yml")
            .with_settle_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_start_records_pid() {
        let runner = Arc::new(MockRunner::new());
        let handle = agent(runner.clone()).start().await.unwrap();

        assert_eq!(handle.pid, 4242);
        assert_eq!(runner.command_args(), vec!["-o /etc/daos/daos_agent.yml"]);
    }

    #[tokio::test]
    async fn test_start_failure() {
        let runner = Arc::new(MockRunner::new());
        runner.fail_launch("daos_agent.yml");

        let err = agent(runner).start().await.unwrap_err();
        assert!(matches!(err, BenchError::AgentStartFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_waits_for_settle_delay() {
        let runner = Arc::new(MockRunner::new());
        let agent = AgentProcess::new(runner, "daos_agent", "agent.yml")
            .with_settle_delay(Duration::from_secs(3));

        let started = tokio::time::Instant::now();
        agent.start().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_stop_kills_recorded_pid() {
        let runner = Arc::new(MockRunner::new());
        let agent = agent(runner.clone());
        let handle = agent.start().await.unwrap();

        assert_eq!(agent.stop(Some(&handle)).await, TeardownStatus::Completed);
        assert_eq!(runner.calls().last(), Some(&Invocation::Kill(handle.pid)));
    }

    #[tokio::test]
    async fn test_stop_without_agent() {
        let runner = Arc::new(MockRunner::new());
        let status = agent(runner.clone()).stop(None).await;

        assert_eq!(status, TeardownStatus::NothingToDo(Notice::NoAgentRunning));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stop_failure_is_reported() {
        let runner = Arc::new(MockRunner::new());
        runner.fail_kill(std::io::ErrorKind::PermissionDenied);

        let status = agent(runner).stop(Some(&AgentHandle { pid: 77 })).await;
        assert!(matches!(
            status,
            TeardownStatus::Failed(Notice::AgentStopFailed { pid: 77, .. })
        ));
    }
}
