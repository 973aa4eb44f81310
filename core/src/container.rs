//! Container lifecycle through the `daos` tool

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::command::{CommandRunner, CommandSpec};
use crate::error::{BenchError, BenchResult, Notice, TeardownStatus};
use crate::handles::{ContainerHandle, PoolHandle};

/// Container type used when none is requested
pub const DEFAULT_FS_TYPE: &str = "POSIX";

/// DAOS system name used when none is requested
pub const DEFAULT_SYSTEM_NAME: &str = "daos_server";

/// Optional parameters for a new container
///
/// Every `None` falls back to a default: a fresh time-ordered UUID,
/// [`DEFAULT_FS_TYPE`], [`DEFAULT_SYSTEM_NAME`], and no explicit chunk size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRequest {
    /// Container UUID to use
    #[serde(default)]
    pub uuid: Option<String>,
    /// Container type, e.g. `POSIX`
    #[serde(default)]
    pub fs_type: Option<String>,
    /// Chunk size in bytes
    #[serde(default)]
    pub chunk_size: Option<u64>,
    /// DAOS system name
    #[serde(default)]
    pub system_name: Option<String>,
}

/// Creates and destroys containers scoped to a pool
pub struct ContainerManager {
    runner: Arc<dyn CommandRunner>,
    daos: PathBuf,
}

impl ContainerManager {
    /// Manager invoking the given `daos` binary
    pub fn new(runner: Arc<dyn CommandRunner>, daos: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            daos: daos.into(),
        }
    }

    /// Create a container in `pool`
    ///
    /// Fails with [`BenchError::NoPool`] before running anything when there is
    /// no pool.
    pub async fn create_container(
        &self,
        pool: Option<&PoolHandle>,
        request: &ContainerRequest,
    ) -> BenchResult<ContainerHandle> {
        let pool = pool.ok_or(BenchError::NoPool)?;

        let container = ContainerHandle {
            uuid: request
                .uuid
                .clone()
                .unwrap_or_else(|| Uuid::now_v7().to_string()),
            system_name: request
                .system_name
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_NAME.to_string()),
            fs_type: request
                .fs_type
                .clone()
                .unwrap_or_else(|| DEFAULT_FS_TYPE.to_string()),
            chunk_size: request.chunk_size,
            pool_uuid: pool.uuid.clone(),
            pool_replicas: pool.replicas.clone(),
        };

        tracing::info!(
            pool_uuid = %pool.uuid,
            container_uuid = %container.uuid,
            fs_type = %container.fs_type,
            "Creating container"
        );

        let mut command = CommandSpec::new(&self.daos)
            .args(["cont", "create"])
            .arg(format!("--pool={}", pool.uuid))
            .arg(format!("--svc={}", pool.svc_list()))
            .arg(format!("--sys-name={}", container.system_name))
            .arg(format!("--cont={}", container.uuid))
            .arg(format!("--type={}", container.fs_type));
        if let Some(chunk_size) = container.chunk_size {
            command = command.arg(format!("--chunk-size={}", chunk_size));
        }

        let output = self
            .runner
            .output(&command)
            .await
            .map_err(|e| BenchError::spawn(command.display(), e))?;

        if !output.succeeded() {
            tracing::error!(
                container_uuid = %container.uuid,
                code = ?output.code,
                "Could not create container"
            );
            return Err(BenchError::ContainerCreateFailed {
                command: command.display(),
                code: output.code,
                output: output.combined(),
            });
        }

        tracing::info!(
            container_uuid = %container.uuid,
            output = %output.combined().trim(),
            "Container created"
        );
        Ok(container)
    }

    /// Destroy `container`, reporting rather than raising failures
    ///
    /// The caller keeps its handle unless [`TeardownStatus::Completed`] comes
    /// back, so a failed destroy leaves the last known container observable.
    pub async fn destroy_container(
        &self,
        pool: Option<&PoolHandle>,
        container: Option<&ContainerHandle>,
    ) -> TeardownStatus {
        let Some(container) = container else {
            tracing::warn!("No container to destroy for this session");
            return TeardownStatus::NothingToDo(Notice::NoContainerToDestroy);
        };

        let pool = match pool {
            Some(pool) if container.belongs_to(pool) => pool,
            Some(pool) => {
                return self.refuse(
                    container,
                    format!(
                        "container belongs to pool {}, session pool is {}",
                        container.pool_uuid, pool.uuid
                    ),
                )
            }
            None => {
                return self.refuse(
                    container,
                    format!("pool {} is no longer active", container.pool_uuid),
                )
            }
        };

        tracing::info!(container_uuid = %container.uuid, "Destroying container");

        let command = CommandSpec::new(&self.daos)
            .args(["cont", "destroy"])
            .arg(format!("--cont={}", container.uuid))
            .arg(format!("--svc={}", container.svc_list()))
            .arg(format!("--pool={}", pool.uuid));

        match self.runner.output(&command).await {
            Ok(output) if output.succeeded() => {
                tracing::info!(
                    container_uuid = %container.uuid,
                    output = %output.combined().trim(),
                    "Container destroyed"
                );
                TeardownStatus::Completed
            }
            Ok(output) => self.refuse(
                container,
                format!("exit code {:?}: {}", output.code, output.combined().trim()),
            ),
            Err(e) => self.refuse(container, e.to_string()),
        }
    }

    fn refuse(&self, container: &ContainerHandle, reason: String) -> TeardownStatus {
        tracing::warn!(
            container_uuid = %container.uuid,
            reason = %reason,
            "Could not destroy container"
        );
        TeardownStatus::Failed(Notice::ContainerDestroyFailed {
            container_uuid: container.uuid.clone(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use crate::test_support::MockRunner;

    fn manager(runner: Arc<MockRunner>) -> ContainerManager {
        ContainerManager::new(runner, "/opt/daos/bin/daos")
    }

    fn pool() -> PoolHandle {
        PoolHandle::new("abc-123", vec!["1".into()])
    }

    #[tokio::test]
    async fn test_create_with_defaults() {
        let runner = Arc::new(MockRunner::new());
        let container = manager(runner.clone())
            .create_container(Some(&pool()), &ContainerRequest::default())
            .await
            .unwrap();

        assert!(Uuid::parse_str(&container.uuid).is_ok());
        assert_eq!(container.fs_type, "POSIX");
        assert_eq!(container.system_name, "daos_server");
        assert_eq!(container.pool_uuid, "abc-123");
        assert_eq!(
            runner.command_args(),
            vec![format!(
                "cont create --pool=abc-123 --svc=1 --sys-name=daos_server --cont={} --type=POSIX",
                container.uuid
            )]
        );
    }

    #[tokio::test]
    async fn test_generated_uuids_are_unique() {
        let runner = Arc::new(MockRunner::new());
        let manager = manager(runner);
        let first = manager
            .create_container(Some(&pool()), &ContainerRequest::default())
            .await
            .unwrap();
        let second = manager
            .create_container(Some(&pool()), &ContainerRequest::default())
            .await
            .unwrap();
        assert_ne!(first.uuid, second.uuid);
    }

    #[tokio::test]
    async fn test_chunk_size_only_when_requested() {
        let runner = Arc::new(MockRunner::new());
        let request = ContainerRequest {
            uuid: Some("c0ffee".into()),
            fs_type: Some("HDF5".into()),
            chunk_size: Some(1_048_576),
            system_name: Some("daos_io".into()),
        };
        manager(runner.clone())
            .create_container(Some(&pool()), &request)
            .await
            .unwrap();

        assert_eq!(
            runner.command_args(),
            vec![
                "cont create --pool=abc-123 --svc=1 --sys-name=daos_io --cont=c0ffee \
                 --type=HDF5 --chunk-size=1048576"
            ]
        );
    }

    #[tokio::test]
    async fn test_create_without_pool_makes_no_call() {
        let runner = Arc::new(MockRunner::new());
        let err = manager(runner.clone())
            .create_container(None, &ContainerRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, BenchError::NoPool));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_failure() {
        let runner = Arc::new(MockRunner::new());
        runner.respond("cont create", CommandOutput::failure(1, "DER_EXIST"));

        let err = manager(runner)
            .create_container(Some(&pool()), &ContainerRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::ContainerCreateFailed { code: Some(1), .. }));
    }

    #[tokio::test]
    async fn test_destroy_paths() {
        let runner = Arc::new(MockRunner::new());
        let manager = manager(runner.clone());
        let pool = pool();
        let container = manager
            .create_container(Some(&pool), &ContainerRequest::default())
            .await
            .unwrap();

        assert_eq!(
            manager.destroy_container(Some(&pool), None).await,
            TeardownStatus::NothingToDo(Notice::NoContainerToDestroy)
        );

        // Pool gone: refused without calling out
        let calls_before = runner.calls().len();
        let status = manager.destroy_container(None, Some(&container)).await;
        assert!(matches!(status, TeardownStatus::Failed(Notice::ContainerDestroyFailed { .. })));
        assert_eq!(runner.calls().len(), calls_before);

        let status = manager.destroy_container(Some(&pool), Some(&container)).await;
        assert_eq!(status, TeardownStatus::Completed);
        assert!(runner.ran(&format!(
            "cont destroy --cont={} --svc=1 --pool=abc-123",
            container.uuid
        )));
    }

    #[tokio::test]
    async fn test_destroy_failure_reports_container() {
        let runner = Arc::new(MockRunner::new());
        runner.respond("cont destroy", CommandOutput::failure(1, "DER_BUSY"));
        let pool = pool();
        let manager = manager(runner);
        let container = manager
            .create_container(Some(&pool), &ContainerRequest::default())
            .await
            .unwrap();

        match manager.destroy_container(Some(&pool), Some(&container)).await {
            TeardownStatus::Failed(Notice::ContainerDestroyFailed {
                container_uuid,
                reason,
            }) => {
                assert_eq!(container_uuid, container.uuid);
                assert!(reason.contains("DER_BUSY"));
            }
            other => panic!("unexpected status: {other}"),
        }
    }
}
