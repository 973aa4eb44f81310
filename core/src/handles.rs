//! In-memory records of provisioned resources
//!
//! A handle exists only while its resource is believed to exist. Absence is a
//! valid state and is modelled with `Option` at every use site.

use serde::{Deserialize, Serialize};

/// A created storage pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolHandle {
    /// Pool UUID as reported by `dmg pool create`
    pub uuid: String,
    /// Service replica ranks, in reported order
    pub replicas: Vec<String>,
}

impl PoolHandle {
    /// Create a handle from a UUID and replica list
    pub fn new(uuid: impl Into<String>, replicas: Vec<String>) -> Self {
        Self {
            uuid: uuid.into(),
            replicas,
        }
    }

    /// Replica descriptor in the `--svc` form, e.g. `0,1,2`
    pub fn svc_list(&self) -> String {
        self.replicas.join(",")
    }
}

/// A container created inside a pool
///
/// The pool is referenced by value (UUID and replicas at creation time), not
/// by a live reference, so a container can outlive knowledge of its pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// Container UUID
    pub uuid: String,
    /// DAOS system name the container was created under
    pub system_name: String,
    /// Container type, e.g. `POSIX`
    pub fs_type: String,
    /// Chunk size requested at creation, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u64>,
    /// UUID of the owning pool
    pub pool_uuid: String,
    /// Replica descriptor of the owning pool at creation time
    pub pool_replicas: Vec<String>,
}

impl ContainerHandle {
    /// Whether this container was created in `pool`
    pub fn belongs_to(&self, pool: &PoolHandle) -> bool {
        self.pool_uuid == pool.uuid
    }

    /// `--svc` form of the owning pool's replicas
    pub fn svc_list(&self) -> String {
        self.pool_replicas.join(",")
    }
}

/// A detached background agent
///
/// Only the pid is kept: start and stop can be far apart in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentHandle {
    /// Process id of the agent
    pub pid: u32,
}

/// Pool space reclamation (aggregation) policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReclaimMode {
    /// Aggregation disabled
    #[default]
    Disabled,
    /// Aggregate only when the pool is idle
    Lazy,
    /// Aggregate on a time basis
    Time,
}

impl ReclaimMode {
    /// Value passed to `dmg pool set-prop -v=`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Lazy => "lazy",
            Self::Time => "time",
        }
    }
}

impl std::fmt::Display for ReclaimMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReclaimMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" => Ok(Self::Disabled),
            "lazy" => Ok(Self::Lazy),
            "time" => Ok(Self::Time),
            other => Err(format!("unknown reclaim mode: {}", other)),
        }
    }
}
