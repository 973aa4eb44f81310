//! Executable lookup for the DAOS and fio tool set

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;

use crate::error::{BenchError, BenchResult};

/// fio benchmark binary
pub const FIO: &str = "fio";
/// DAOS fio engine plugin, loaded as an external ioengine and via `LD_PRELOAD`
pub const FIO_PLUGIN: &str = "daos_fio_async";
/// DAOS container tool
pub const DAOS: &str = "daos";
/// DAOS management tool
pub const DMG: &str = "dmg";
/// DAOS client agent
pub const DAOS_AGENT: &str = "daos_agent";

/// Every tool a session resolves
pub const ALL: [&str; 5] = [FIO, FIO_PLUGIN, DAOS, DMG, DAOS_AGENT];

/// Resolved absolute paths of every tool a session needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    /// `fio`
    pub fio: PathBuf,
    /// `daos_fio_async`
    pub fio_plugin: PathBuf,
    /// `daos`
    pub daos: PathBuf,
    /// `dmg`
    pub dmg: PathBuf,
    /// `daos_agent`
    pub daos_agent: PathBuf,
}

/// Locates executables on a search path, caching each answer
#[derive(Debug, Clone)]
pub struct ToolResolver {
    search_path: Option<OsString>,
    cwd: PathBuf,
    resolved: HashMap<String, PathBuf>,
}

impl ToolResolver {
    /// Resolver over the given `PATH`-style search path
    ///
    /// `None` falls back to the process `PATH`.
    pub fn new(search_path: Option<OsString>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            search_path,
            cwd: cwd.into(),
            resolved: HashMap::new(),
        }
    }

    /// Resolver over the current process `PATH` and working directory
    pub fn from_process_env() -> BenchResult<Self> {
        Ok(Self::new(std::env::var_os("PATH"), std::env::current_dir()?))
    }

    /// Pin a tool to an explicit path, bypassing the search
    pub fn with_override(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.resolved.insert(name.into(), path.into());
        self
    }

    /// Absolute path of `name`
    ///
    /// A missing tool is a configuration error, not a transient failure, so
    /// there is no retry.
    pub fn resolve(&mut self, name: &str) -> BenchResult<PathBuf> {
        if let Some(path) = self.resolved.get(name) {
            return Ok(path.clone());
        }

        let search_path = self
            .search_path
            .clone()
            .or_else(|| std::env::var_os("PATH"));
        let path = which::which_in(name, search_path, &self.cwd).map_err(|e| {
            tracing::error!(tool = name, error = %e, "Tool lookup failed");
            BenchError::ToolNotFound {
                tool: name.to_string(),
            }
        })?;

        tracing::debug!(tool = name, path = %path.display(), "Resolved tool");
        self.resolved.insert(name.to_string(), path.clone());
        Ok(path)
    }

    /// Resolve the full tool set, failing on the first missing tool
    pub fn resolve_all(&mut self) -> BenchResult<ToolPaths> {
        let tools = ToolPaths {
            fio: self.resolve(FIO)?,
            fio_plugin: self.resolve(FIO_PLUGIN)?,
            daos: self.resolve(DAOS)?,
            dmg: self.resolve(DMG)?,
            daos_agent: self.resolve(DAOS_AGENT)?,
        };

        tracing::info!(
            fio = %tools.fio.display(),
            fio_plugin = %tools.fio_plugin.display(),
            daos = %tools.daos.display(),
            dmg = %tools.dmg.display(),
            daos_agent = %tools.daos_agent.display(),
            "Test tools resolved"
        );

        Ok(tools)
    }
}
