//! Error types for daos-bench-core
//!
//! Fatal conditions are [`BenchError`] values and abort the current sweep.
//! Teardown never fails hard: destroy/stop operations report a
//! [`TeardownStatus`] carrying a [`Notice`] instead.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::orchestrator::SessionState;

/// Core error type
#[derive(Error, Debug)]
pub enum BenchError {
    /// A required executable could not be found on the search path
    #[error("required tool `{tool}` not found on search path")]
    ToolNotFound {
        /// Tool name that was looked up
        tool: String,
    },

    /// The environment definition file could not be sourced
    #[error("failed to load environment file {}: {reason}", path.display())]
    EnvLoadFailed {
        /// Path of the environment file
        path: PathBuf,
        /// Why loading failed
        reason: String,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A required builder field was never set
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// Operation not permitted in the current session state
    #[error("cannot {operation} while session is {state}")]
    InvalidTransition {
        /// Operation that was attempted
        operation: &'static str,
        /// State the session was in
        state: SessionState,
    },

    /// Operation needs a pool but none has been created
    #[error("no pool has been created for this session")]
    NoPool,

    /// Operation needs a container but none has been created
    #[error("no container has been created for this session")]
    NoContainer,

    /// Container handle refers to a pool that is no longer the session's pool
    #[error("container {container} belongs to pool {container_pool}, which is no longer active")]
    StaleContainer {
        /// Container UUID
        container: String,
        /// Pool UUID recorded when the container was created
        container_pool: String,
    },

    /// An agent is already running for this session
    #[error("agent already running with pid {pid}")]
    AgentAlreadyRunning {
        /// Process id of the running agent
        pid: u32,
    },

    /// The agent process could not be started
    #[error("failed to start agent `{command}`: {reason}")]
    AgentStartFailed {
        /// Rendered command line
        command: String,
        /// Why the start failed
        reason: String,
    },

    /// Pool creation command exited unsuccessfully
    #[error("pool create failed (exit code {code:?}): `{command}`")]
    PoolCreateFailed {
        /// Rendered command line
        command: String,
        /// Exit code, if the process exited normally
        code: Option<i32>,
        /// Captured command output
        output: String,
    },

    /// Pool creation output did not contain a UUID
    #[error("could not find pool UUID in pool create output")]
    PoolParseFailed {
        /// Output that was scanned
        output: String,
    },

    /// Reclaim property could not be applied to a freshly created pool
    #[error("failed to set reclaim mode on pool {pool_uuid} (exit code {code:?}): `{command}`")]
    PoolPropertyFailed {
        /// Pool left in the unreclaimed state
        pool_uuid: String,
        /// Rendered command line
        command: String,
        /// Exit code, if the process exited normally
        code: Option<i32>,
        /// Captured command output
        output: String,
    },

    /// Container creation command exited unsuccessfully
    #[error("container create failed (exit code {code:?}): `{command}`")]
    ContainerCreateFailed {
        /// Rendered command line
        command: String,
        /// Exit code, if the process exited normally
        code: Option<i32>,
        /// Captured command output
        output: String,
    },

    /// Benchmark tool exited with a non-zero status
    #[error("benchmark failed with exit code {code}: `{command}`")]
    BenchmarkExecutionFailed {
        /// Rendered command line
        command: String,
        /// Exit code (-1 when killed by a signal)
        code: i32,
        /// Captured standard output
        output: String,
    },

    /// A process could not be launched at all
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// Rendered command line
        command: String,
        /// Underlying launch error
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Runner configuration could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl BenchError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a missing-configuration error
    pub fn missing_config(field: impl Into<String>) -> Self {
        Self::MissingConfig(field.into())
    }

    /// Create a launch error for the given command line
    pub fn spawn(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            command: command.into(),
            source,
        }
    }
}

/// Result type alias
pub type BenchResult<T> = std::result::Result<T, BenchError>;

/// Non-fatal condition reported by a teardown operation
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// Pool destroy requested with no pool
    #[error("no pool created for this session, nothing to destroy")]
    NoPoolToDestroy,

    /// Container destroy requested with no container
    #[error("no container to destroy for this session")]
    NoContainerToDestroy,

    /// Agent stop requested with no agent
    #[error("no known agent running for this session")]
    NoAgentRunning,

    /// Pool destroy command failed
    #[error("could not destroy pool {pool_uuid}: {reason}")]
    PoolDestroyFailed {
        /// Pool UUID
        pool_uuid: String,
        /// Exit status or launch error
        reason: String,
    },

    /// Container destroy command failed
    #[error("could not destroy container {container_uuid}: {reason}")]
    ContainerDestroyFailed {
        /// Container UUID
        container_uuid: String,
        /// Exit status, launch error, or missing pool
        reason: String,
    },

    /// Agent could not be signalled
    #[error("could not stop agent pid {pid}: {reason}")]
    AgentStopFailed {
        /// Process id
        pid: u32,
        /// Signal delivery error
        reason: String,
    },
}

/// Outcome of a destroy/stop operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "notice", rename_all = "snake_case")]
pub enum TeardownStatus {
    /// The resource was released
    Completed,
    /// There was nothing to release
    NothingToDo(Notice),
    /// The release was attempted and failed
    Failed(Notice),
}

impl TeardownStatus {
    /// True when the resource was released
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// The notice attached to a skipped or failed teardown
    pub fn notice(&self) -> Option<&Notice> {
        match self {
            Self::Completed => None,
            Self::NothingToDo(notice) | Self::Failed(notice) => Some(notice),
        }
    }
}

impl std::fmt::Display for TeardownStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::NothingToDo(notice) => write!(f, "skipped: {}", notice),
            Self::Failed(notice) => write!(f, "failed: {}", notice),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_benchmark_failure_message_carries_command_and_code() {
        let err = BenchError::BenchmarkExecutionFailed {
            command: "fio job.fio".into(),
            code: 1,
            output: "boom".into(),
        };
        assert_eq!(
            err.to_string(),
            "benchmark failed with exit code 1: `fio job.fio`"
        );
    }

    #[test]
    fn test_teardown_status_notice() {
        assert!(TeardownStatus::Completed.notice().is_none());
        assert!(TeardownStatus::Completed.is_completed());

        let skipped = TeardownStatus::NothingToDo(Notice::NoPoolToDestroy);
        assert_eq!(skipped.notice(), Some(&Notice::NoPoolToDestroy));
        assert!(!skipped.is_completed());
        assert!(skipped.to_string().starts_with("skipped:"));
    }

    #[test]
    fn test_teardown_status_json() {
        let json = serde_json::to_value(TeardownStatus::Failed(Notice::AgentStopFailed {
            pid: 7,
            reason: "EPERM".into(),
        }))
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["notice"]["kind"], "agent_stop_failed");
        assert_eq!(json["notice"]["pid"], 7);

        let json = serde_json::to_value(TeardownStatus::Completed).unwrap();
        assert_eq!(json["status"], "completed");
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = BenchError::InvalidTransition {
            operation: "create pool",
            state: SessionState::EnvReady,
        };
        assert_eq!(
            err.to_string(),
            "cannot create pool while session is env-ready"
        );
    }
}
