//! Loading of shell-style environment definition files
//!
//! DAOS installs ship an env file (`PATH`, `LD_LIBRARY_PATH`, `CRT_*` ...)
//! that must be sourced before any tool can be found. The file is sourced in
//! `bash` and the resulting environment is captured as a map; nothing is
//! exported into this process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::error::{BenchError, BenchResult};

/// Sources `$1` with auto-export on and dumps the environment NUL-separated.
const SOURCE_SCRIPT: &str = "set -a; . \"$1\" >/dev/null; exec env -0";

/// A shell environment definition file
#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
}

impl EnvFile {
    /// Wrap the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the definition file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Source the file and return the complete resulting environment
    pub async fn load(&self) -> BenchResult<HashMap<String, String>> {
        tracing::info!(path = %self.path.display(), "Loading env file");

        if !self.path.is_file() {
            return Err(self.failed("file does not exist"));
        }

        let output = Command::new("bash")
            .arg("-c")
            .arg(SOURCE_SCRIPT)
            .arg("bash")
            .arg(&self.path)
            .output()
            .await
            .map_err(|e| self.failed(format!("could not run bash: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failed(format!(
                "bash exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let environment = parse_env_dump(&output.stdout);
        tracing::debug!(variables = environment.len(), "Environment loaded");
        Ok(environment)
    }

    fn failed(&self, reason: impl Into<String>) -> BenchError {
        BenchError::EnvLoadFailed {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

/// Parse `env -0` output into a map
///
/// Entries without `=` are skipped; values may themselves contain `=` and
/// newlines.
pub fn parse_env_dump(dump: &[u8]) -> HashMap<String, String> {
    dump.split(|b| *b == 0)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let entry = String::from_utf8_lossy(entry);
            let (key, value) = entry.split_once('=')?;
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}
