//! daos-bench-core: Resource lifecycle orchestration for DAOS fio benchmarks
//!
//! This crate drives a benchmark session against a DAOS deployment:
//!
//! - Tool lookup and environment loading
//! - Pool, container and client agent lifecycle
//! - fio job file generation and monitored fio runs
//! - The session orchestrator and parameter sweep driver
//! - Error handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod agent;
pub mod command;
pub mod config;
pub mod container;
pub mod env;
pub mod error;
pub mod fio;
pub mod handles;
pub mod orchestrator;
pub mod pool;
pub mod tools;

pub use agent::AgentProcess;
pub use command::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use config::{ConfigError, ContainerDefaults, RunnerConfig, SweepPoint};
pub use container::{ContainerManager, ContainerRequest};
pub use env::EnvFile;
pub use error::*;
pub use fio::{
    BenchmarkOutcome, BenchmarkRunConfig, BenchmarkRunner, FioJobFile, IoMode, ProgressTarget,
};
pub use handles::*;
pub use orchestrator::{
    sweep_timestamp, CompletedRun, Orchestrator, OrchestratorBuilder, Session, SessionSettings,
    SessionState, SweepPlan, SweepSummary, TeardownReport,
};
pub use pool::PoolManager;
pub use tools::{ToolPaths, ToolResolver};

#[cfg(test)]
mod test_support;
