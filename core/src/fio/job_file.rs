//! fio job file generation and parsing

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};
use crate::handles::{ContainerHandle, PoolHandle};

/// Name of the shared-options section
pub const GLOBAL_SECTION: &str = "global";

/// Name of the single job section written for a sweep point
pub const TEST_SECTION: &str = "test1";

/// Latency percentiles reported by every run
pub const PERCENTILE_LIST: &str = "99.0:99.9:99.99:99.999:99.9999:100";

/// fio `rw=` operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoMode {
    /// Sequential read
    Read,
    /// Sequential write
    Write,
    /// Random read
    RandRead,
    /// Random write
    RandWrite,
}

impl IoMode {
    /// fio spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::RandRead => "randread",
            Self::RandWrite => "randwrite",
        }
    }

    /// Write mode that must populate the container before this mode can run
    pub fn prefill(&self) -> Option<IoMode> {
        match self {
            Self::Read => Some(Self::Write),
            Self::RandRead => Some(Self::RandWrite),
            Self::Write | Self::RandWrite => None,
        }
    }
}

impl std::fmt::Display for IoMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IoMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "randread" => Ok(Self::RandRead),
            "randwrite" => Ok(Self::RandWrite),
            other => Err(format!("unsupported rw mode: {}", other)),
        }
    }
}

/// Parameters of one sweep point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkRunConfig {
    /// `bs=`, e.g. `4096` or `1M`
    pub block_size: String,
    /// `iodepth=`
    pub queue_depth: u32,
    /// `daos_chsz=` in bytes
    pub chunk_size: u64,
    /// `numjobs=`
    pub jobs: u32,
    /// `rw=`
    pub mode: IoMode,
    /// `size=` per job, e.g. `1G`
    pub transfer_size: String,
}

impl BenchmarkRunConfig {
    /// Same point with a different operation
    pub fn with_mode(&self, mode: IoMode) -> Self {
        Self {
            mode,
            ..self.clone()
        }
    }
}

/// One `[name]` block of a job file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FioSection {
    /// Section name without brackets
    pub name: String,
    /// `key=value` options in file order
    pub options: Vec<(String, String)>,
}

impl FioSection {
    /// Empty section
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Vec::new(),
        }
    }

    fn option(mut self, key: &str, value: impl ToString) -> Self {
        self.options.push((key.to_string(), value.to_string()));
        self
    }

    /// Value of `key`; the last occurrence wins as in fio
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// An fio job file: a global section followed by job sections
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FioJobFile {
    /// Sections in file order
    pub sections: Vec<FioSection>,
}

impl FioJobFile {
    /// Job file for one run against a DAOS container
    pub fn for_run(
        plugin: &Path,
        pool: &PoolHandle,
        container: &ContainerHandle,
        run: &BenchmarkRunConfig,
    ) -> Self {
        let global = FioSection::new(GLOBAL_SECTION)
            .option("ioengine", format!("external:{}", plugin.display()))
            .option("daos_pool", &pool.uuid)
            .option("daos_cont", &container.uuid)
            .option("daos_svcl", pool.svc_list())
            .option("daos_chsz", run.chunk_size)
            .option("group_reporting", 1)
            .option("verify", 0)
            .option("direct", 0)
            .option("iodepth", run.queue_depth)
            .option("percentile_list", PERCENTILE_LIST)
            .option("numa_cpu_nodes", 0)
            .option("numa_mem_policy", "bind:0");

        let test = FioSection::new(TEST_SECTION)
            .option("numjobs", run.jobs)
            .option("rw", run.mode)
            .option("bs", &run.block_size)
            .option("size", &run.transfer_size);

        Self {
            sections: vec![global, test],
        }
    }

    /// Section named `name`
    pub fn section(&self, name: &str) -> Option<&FioSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Serialize in fio's ini syntax
    pub fn render(&self) -> String {
        self.sections
            .iter()
            .map(|section| {
                let mut block = format!("[{}]\n", section.name);
                for (key, value) in &section.options {
                    if value.is_empty() {
                        block.push_str(&format!("{}\n", key));
                    } else {
                        block.push_str(&format!("{}={}\n", key, value));
                    }
                }
                block
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parse fio's ini syntax
    ///
    /// Blank lines and `;`/`#` comments are ignored. Options must appear
    /// inside a section.
    pub fn parse(text: &str) -> BenchResult<Self> {
        let mut sections: Vec<FioSection> = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                sections.push(FioSection::new(name.trim()));
                continue;
            }

            let section = sections.last_mut().ok_or_else(|| {
                BenchError::config(format!(
                    "job file line {}: option outside of a section: {}",
                    idx + 1,
                    line
                ))
            })?;

            let (key, value) = line.split_once('=').unwrap_or((line, ""));
            section
                .options
                .push((key.trim().to_string(), value.trim().to_string()));
        }

        Ok(Self { sections })
    }

    /// Recover the sweep point a job file was generated from
    pub fn run_config(&self) -> BenchResult<BenchmarkRunConfig> {
        let global = self
            .section(GLOBAL_SECTION)
            .ok_or_else(|| BenchError::config("job file has no [global] section"))?;
        let job = self
            .sections
            .iter()
            .find(|s| s.name != GLOBAL_SECTION)
            .ok_or_else(|| BenchError::config("job file has no job section"))?;

        Ok(BenchmarkRunConfig {
            block_size: required(job, "bs")?.to_string(),
            queue_depth: parse_number(global, "iodepth")?,
            chunk_size: parse_number(global, "daos_chsz")?,
            jobs: parse_number(job, "numjobs")?,
            mode: required(job, "rw")?.parse().map_err(BenchError::Config)?,
            transfer_size: required(job, "size")?.to_string(),
        })
    }

    /// Write the rendered file to `path`
    pub async fn write_to(&self, path: &Path) -> BenchResult<()> {
        tokio::fs::write(path, self.render()).await?;
        Ok(())
    }

    /// Read and parse the file at `path`
    pub async fn read_from(path: &Path) -> BenchResult<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::parse(&text)
    }
}

fn required<'a>(section: &'a FioSection, key: &str) -> BenchResult<&'a str> {
    section.get(key).ok_or_else(|| {
        BenchError::config(format!("[{}] is missing `{}`", section.name, key))
    })
}

fn parse_number<T: std::str::FromStr>(section: &FioSection, key: &str) -> BenchResult<T> {
    let value = required(section, key)?;
    value.parse().map_err(|_| {
        BenchError::config(format!("[{}] `{}` is not a number: {}", section.name, key, value))
    })
}
