//! Runner configuration
//!
//! A runner file is YAML. The key names of the older `key: value` runner
//! format (`num_jobs`, `iosizes`, `agg_mode` ...) are accepted as aliases so
//! existing files keep working after a `.yaml` rename.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::container::ContainerRequest;
use crate::error::{BenchError, BenchResult};
use crate::fio::{BenchmarkRunConfig, IoMode};
use crate::handles::ReclaimMode;
use crate::orchestrator::{SessionSettings, SweepPlan};
use crate::tools;

/// Full runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Shell environment file to source before resolving tools
    #[serde(default, alias = "env_file_with_path")]
    pub env_file: Option<PathBuf>,

    /// Control-plane config passed to `dmg -o`
    #[serde(alias = "control_config_file")]
    pub control_config: PathBuf,

    /// Agent config passed to `daos_agent -o`; defaults to the control config
    #[serde(default, alias = "agent_config_file")]
    pub agent_config: Option<PathBuf>,

    /// SCM tier size for `dmg pool create -s`
    pub scm_size: String,

    /// NVMe tier size for `dmg pool create -n`
    pub nvme_size: String,

    /// Pool reclaim property
    #[serde(default, alias = "agg_mode")]
    pub reclaim_mode: ReclaimMode,

    /// `numjobs` values
    #[serde(alias = "num_jobs", deserialize_with = "numbers")]
    pub jobs: Vec<u32>,

    /// Container chunk sizes in bytes (`daos_chsz`)
    #[serde(alias = "chunk_size", deserialize_with = "numbers")]
    pub chunk_sizes: Vec<u64>,

    /// Per-job transfer sizes (`size`)
    #[serde(alias = "data_size", deserialize_with = "sizes")]
    pub data_sizes: Vec<String>,

    /// `iodepth` values
    #[serde(alias = "iodepth", deserialize_with = "numbers")]
    pub queue_depths: Vec<u32>,

    /// Block sizes (`bs`)
    #[serde(alias = "iosizes", deserialize_with = "sizes")]
    pub block_sizes: Vec<String>,

    /// Operations to run at every point
    #[serde(alias = "io_operations")]
    pub operations: Vec<IoMode>,

    /// Hand-written job file run at every point instead of generated ones
    #[serde(default, alias = "custom_config")]
    pub custom_job_file: Option<PathBuf>,

    /// Directory that receives the `result_*` directories
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Seconds to wait after starting the agent
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,

    /// Destroy and recreate the pool between sweep points
    #[serde(default)]
    pub fresh_pool_per_point: bool,

    /// Container creation defaults
    #[serde(default)]
    pub container: ContainerDefaults,

    /// Tool name to path overrides that bypass the search path
    #[serde(default)]
    pub tools: BTreeMap<String, PathBuf>,
}

/// Container parameters shared by every sweep point
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDefaults {
    /// Container type
    #[serde(default)]
    pub fs_type: Option<String>,
    /// DAOS system name
    #[serde(default)]
    pub system_name: Option<String>,
    /// Container-level chunk size
    #[serde(default)]
    pub chunk_size: Option<u64>,
}

impl From<&ContainerDefaults> for ContainerRequest {
    fn from(defaults: &ContainerDefaults) -> Self {
        ContainerRequest {
            uuid: None,
            fs_type: defaults.fs_type.clone(),
            chunk_size: defaults.chunk_size,
            system_name: defaults.system_name.clone(),
        }
    }
}

fn default_output_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_settle_delay_secs() -> u64 {
    3
}

/// A list entry written either as a YAML number or a string
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(u64),
    Text(String),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Int(n) => n.to_string(),
            Scalar::Text(s) => s.trim().to_string(),
        }
    }
}

fn sizes<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Scalar>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(Scalar::into_string).collect())
}

fn numbers<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let raw = Vec::<Scalar>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|value| {
            let text = value.into_string();
            text.parse()
                .map_err(|_| serde::de::Error::custom(format!("expected a number, got `{}`", text)))
        })
        .collect()
}

impl RunnerConfig {
    /// Parse a runner file from YAML text
    pub fn from_yaml(text: &str) -> BenchResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read, parse and validate the runner file at `path`
    pub fn from_file(path: &Path) -> BenchResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            BenchError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, empty) in [
            ("num_jobs", self.jobs.is_empty()),
            ("chunk_size", self.chunk_sizes.is_empty()),
            ("data_size", self.data_sizes.is_empty()),
            ("iodepth", self.queue_depths.is_empty()),
            ("iosizes", self.block_sizes.is_empty()),
            ("io_operations", self.operations.is_empty()),
        ] {
            if empty {
                return Err(ConfigError::EmptySweep(name));
            }
        }

        if self.jobs.contains(&0) {
            return Err(ConfigError::ZeroValue("num_jobs"));
        }
        if self.queue_depths.contains(&0) {
            return Err(ConfigError::ZeroValue("iodepth"));
        }
        if self.chunk_sizes.contains(&0) {
            return Err(ConfigError::ZeroValue("chunk_size"));
        }
        if self.container.chunk_size == Some(0) {
            return Err(ConfigError::ZeroValue("container.chunk_size"));
        }

        for (name, value) in [("scm_size", &self.scm_size), ("nvme_size", &self.nvme_size)] {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyPoolSize(name));
            }
        }

        for (name, value) in [("data_size", &self.data_sizes), ("iosizes", &self.block_sizes)] {
            if value.iter().any(|v| v.is_empty()) {
                return Err(ConfigError::EmptyValue(name));
            }
        }

        if let Some(name) = self.tools.keys().find(|name| !tools::ALL.contains(&name.as_str())) {
            return Err(ConfigError::UnknownTool(name.clone()));
        }

        Ok(())
    }

    /// Custom job file, treating an empty path as unset
    pub fn custom_job_file(&self) -> Option<&Path> {
        self.custom_job_file
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    /// Every sweep point, nested jobs > chunk > data size > depth > bs > op
    pub fn sweep_points(&self) -> Vec<SweepPoint> {
        let mut points = Vec::new();
        for &jobs in &self.jobs {
            for &chunk_size in &self.chunk_sizes {
                for data_size in &self.data_sizes {
                    for &queue_depth in &self.queue_depths {
                        for block_size in &self.block_sizes {
                            for &mode in &self.operations {
                                points.push(SweepPoint {
                                    jobs,
                                    chunk_size,
                                    data_size: data_size.clone(),
                                    queue_depth,
                                    block_size: block_size.clone(),
                                    mode,
                                });
                            }
                        }
                    }
                }
            }
        }
        points
    }

    /// Session parameters, with relative paths resolved against `cwd`
    pub fn session_settings(&self, cwd: &Path) -> SessionSettings {
        let control_config = resolve(cwd, &self.control_config);
        let agent_config = self
            .agent_config
            .as_deref()
            .map(|path| resolve(cwd, path))
            .unwrap_or_else(|| control_config.clone());

        SessionSettings {
            control_config,
            agent_config,
            scm_size: self.scm_size.clone(),
            nvme_size: self.nvme_size.clone(),
            reclaim_mode: self.reclaim_mode,
            settle_delay: Duration::from_secs(self.settle_delay_secs),
            container: ContainerRequest::from(&self.container),
        }
    }

    /// Sweep plan for a run started at `timestamp`
    pub fn sweep_plan(&self, cwd: &Path, timestamp: impl Into<String>) -> SweepPlan {
        SweepPlan {
            points: self.sweep_points(),
            output_root: resolve(cwd, &self.output_root),
            custom_job_file: self.custom_job_file().map(|path| resolve(cwd, path)),
            fresh_pool_per_point: self.fresh_pool_per_point,
            timestamp: timestamp.into(),
        }
    }

    /// Environment file resolved against `cwd`
    pub fn env_file(&self, cwd: &Path) -> Option<PathBuf> {
        self.env_file
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
            .map(|path| resolve(cwd, path))
    }

    /// Tool overrides resolved against `cwd`
    pub fn tool_overrides(&self, cwd: &Path) -> impl Iterator<Item = (&str, PathBuf)> + '_ {
        let cwd = cwd.to_path_buf();
        self.tools
            .iter()
            .map(move |(name, path)| (name.as_str(), resolve(&cwd, path)))
    }
}

fn resolve(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// One combination of sweep parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepPoint {
    /// `numjobs`
    pub jobs: u32,
    /// `daos_chsz`
    pub chunk_size: u64,
    /// Per-job `size`
    pub data_size: String,
    /// `iodepth`
    pub queue_depth: u32,
    /// `bs`
    pub block_size: String,
    /// `rw`
    pub mode: IoMode,
}

impl SweepPoint {
    /// `<jobs>_<chunk>_<size>_<depth>_<bs>`, shared by every operation at the point
    pub fn label(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}",
            self.jobs, self.chunk_size, self.data_size, self.queue_depth, self.block_size
        )
    }

    /// fio parameters for this point
    pub fn run_config(&self) -> BenchmarkRunConfig {
        BenchmarkRunConfig {
            block_size: self.block_size.clone(),
            queue_depth: self.queue_depth,
            chunk_size: self.chunk_size,
            jobs: self.jobs,
            mode: self.mode,
            transfer_size: self.data_size.clone(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A sweep dimension has no values
    #[error("Empty sweep list: `{0}` needs at least one value")]
    EmptySweep(&'static str),

    /// A count that must be positive is zero
    #[error("Invalid value: `{0}` must be at least 1")]
    ZeroValue(&'static str),

    /// A pool tier size is blank
    #[error("Invalid pool size: `{0}` is empty")]
    EmptyPoolSize(&'static str),

    /// A size list contains a blank entry
    #[error("Invalid size: `{0}` contains an empty entry")]
    EmptyValue(&'static str),

    /// An override names a tool that is never used
    #[error("Unknown tool override: `{0}`")]
    UnknownTool(String),
}

impl From<ConfigError> for BenchError {
    fn from(e: ConfigError) -> Self {
        BenchError::config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY_KEYS: &str = r#"
env_file_with_path: test_files/env-daos
control_config_file: test_files/daos_control.yml
agent_config_file: test_files/daos_agent.yml
num_jobs: ["16", "32"]
data_size: ["1G"]
scm_size: 100G
nvme_size: 500G
iodepth: ["16"]
chunk_size: ["1048576"]
agg_mode: disabled
iosizes: ["4096", "1M"]
io_operations: [randwrite, randread]
custom_config: ""
"#;

    fn config() -> RunnerConfig {
        RunnerConfig::from_yaml(LEGACY_KEYS).unwrap()
    }

    #[test]
    fn test_legacy_keys_are_accepted() {
        let config = config();
        assert_eq!(config.jobs, vec![16, 32]);
        assert_eq!(config.chunk_sizes, vec![1_048_576]);
        assert_eq!(config.block_sizes, vec!["4096", "1M"]);
        assert_eq!(config.reclaim_mode, ReclaimMode::Disabled);
        assert_eq!(config.operations, vec![IoMode::RandWrite, IoMode::RandRead]);
        assert!(config.custom_job_file().is_none());
        assert_eq!(config.settle_delay_secs, 3);
        assert_eq!(config.output_root, PathBuf::from("."));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_numbers_may_be_unquoted() {
        let config = RunnerConfig::from_yaml(
            r#"
control_config: /etc/daos/daos_control.yml
scm_size: 4G
nvme_size: 40G
jobs: [1]
chunk_sizes: [2097152]
data_sizes: [2G]
queue_depths: [8, 16]
block_sizes: [4096]
operations: [write]
reclaim_mode: lazy
"#,
        )
        .unwrap();
        assert_eq!(config.queue_depths, vec![8, 16]);
        assert_eq!(config.block_sizes, vec!["4096"]);
        assert_eq!(config.reclaim_mode, ReclaimMode::Lazy);
    }

    #[test]
    fn test_non_numeric_job_count_is_rejected() {
        let text = LEGACY_KEYS.replace(r#"num_jobs: ["16", "32"]"#, r#"num_jobs: ["many"]"#);
        let err = RunnerConfig::from_yaml(&text).unwrap_err();
        assert!(err.to_string().contains("many"));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = config();
        config.queue_depths.clear();
        assert!(matches!(config.validate(), Err(ConfigError::EmptySweep("iodepth"))));

        let mut config = self::config();
        config.jobs = vec![0];
        assert!(matches!(config.validate(), Err(ConfigError::ZeroValue("num_jobs"))));

        let mut config = self::config();
        config.nvme_size = " ".into();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyPoolSize("nvme_size"))));

        let mut config = self::config();
        config.tools.insert("mpirun".into(), "/usr/bin/mpirun".into());
        assert!(matches!(config.validate(), Err(ConfigError::UnknownTool(_))));
    }

    #[test]
    fn test_sweep_order_and_labels() {
        let points = config().sweep_points();
        assert_eq!(points.len(), 8);

        let labels: Vec<_> = points.iter().map(|p| (p.label(), p.mode)).collect();
        assert_eq!(labels[0], ("16_1048576_1G_16_4096".to_string(), IoMode::RandWrite));
        assert_eq!(labels[1], ("16_1048576_1G_16_4096".to_string(), IoMode::RandRead));
        assert_eq!(labels[2], ("16_1048576_1G_16_1M".to_string(), IoMode::RandWrite));
        assert_eq!(labels[4].0, "32_1048576_1G_16_4096");
    }

    #[test]
    fn test_point_run_config() {
        let point = &config().sweep_points()[1];
        let run = point.run_config();
        assert_eq!(run.jobs, 16);
        assert_eq!(run.transfer_size, "1G");
        assert_eq!(run.block_size, "4096");
        assert_eq!(run.mode, IoMode::RandRead);
    }

    #[test]
    fn test_paths_resolve_against_cwd() {
        let cwd = Path::new("/work");
        let config = config();

        let settings = config.session_settings(cwd);
        assert_eq!(settings.control_config, PathBuf::from("/work/test_files/daos_control.yml"));
        assert_eq!(settings.agent_config, PathBuf::from("/work/test_files/daos_agent.yml"));
        assert_eq!(settings.settle_delay, Duration::from_secs(3));
        assert_eq!(config.env_file(cwd), Some(PathBuf::from("/work/test_files/env-daos")));

        let plan = config.sweep_plan(cwd, "2024-01-01_00-00-00");
        assert_eq!(plan.output_root, PathBuf::from("/work/."));
        assert!(plan.custom_job_file.is_none());
    }

    #[test]
    fn test_demo_runner_file() {
        let config = RunnerConfig::from_yaml(include_str!("../../demos/runner.yaml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.sweep_points().len(), 8);
        assert_eq!(config.container.fs_type.as_deref(), Some("POSIX"));
        assert!(config.tools.is_empty());
    }

    #[test]
    fn test_agent_config_defaults_to_control_config() {
        let mut config = config();
        config.agent_config = None;
        let settings = config.session_settings(Path::new("/work"));
        assert_eq!(settings.agent_config, settings.control_config);
    }
}
