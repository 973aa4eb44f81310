//! Storage pool lifecycle through `dmg`

use std::path::PathBuf;
use std::sync::Arc;

use crate::command::{CommandRunner, CommandSpec};
use crate::error::{BenchError, BenchResult, Notice, TeardownStatus};
use crate::handles::{PoolHandle, ReclaimMode};

/// Creates, queries and destroys pools with the management tool
pub struct PoolManager {
    runner: Arc<dyn CommandRunner>,
    dmg: PathBuf,
    control_config: PathBuf,
}

impl PoolManager {
    /// Manager invoking `dmg` with the given control-plane config file
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        dmg: impl Into<PathBuf>,
        control_config: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            dmg: dmg.into(),
            control_config: control_config.into(),
        }
    }

    fn dmg(&self) -> CommandSpec {
        CommandSpec::new(&self.dmg)
            .arg("-o")
            .path_arg(&self.control_config)
    }

    /// Create a pool with the given SCM and NVMe sizes and parse its identity
    ///
    /// The reclaim property is applied separately with
    /// [`PoolManager::set_reclaim_mode`] so the caller can track the pool
    /// before that step can fail.
    pub async fn create_pool(&self, scm_size: &str, nvme_size: &str) -> BenchResult<PoolHandle> {
        tracing::info!(scm_size, nvme_size, "Creating pool");

        let command = self
            .dmg()
            .args(["pool", "create"])
            .arg(format!("-s={}", scm_size))
            .arg(format!("-n={}", nvme_size));

        let output = self
            .runner
            .output(&command)
            .await
            .map_err(|e| BenchError::spawn(command.display(), e))?;

        if !output.succeeded() {
            tracing::error!(code = ?output.code, "Could not create pool");
            return Err(BenchError::PoolCreateFailed {
                command: command.display(),
                code: output.code,
                output: output.combined(),
            });
        }

        let pool = parse_pool_create_output(&output.combined())?;
        tracing::info!(
            pool_uuid = %pool.uuid,
            replicas = %pool.svc_list(),
            "Pool created"
        );
        Ok(pool)
    }

    /// Apply the space reclamation policy to `pool`
    pub async fn set_reclaim_mode(&self, pool: &PoolHandle, mode: ReclaimMode) -> BenchResult<()> {
        tracing::info!(pool_uuid = %pool.uuid, mode = %mode, "Setting reclaim mode");

        let command = self
            .dmg()
            .args(["pool", "set-prop"])
            .arg(format!("--pool={}", pool.uuid))
            .arg("-n=reclaim")
            .arg(format!("-v={}", mode));

        let output = self
            .runner
            .output(&command)
            .await
            .map_err(|e| BenchError::spawn(command.display(), e))?;

        if !output.succeeded() {
            tracing::error!(pool_uuid = %pool.uuid, code = ?output.code, "Pool left unreclaimed");
            return Err(BenchError::PoolPropertyFailed {
                pool_uuid: pool.uuid.clone(),
                command: command.display(),
                code: output.code,
                output: output.combined(),
            });
        }

        Ok(())
    }

    /// Destroy `pool`, tolerating failure
    ///
    /// The exit status is not checked strictly: a non-zero exit is logged with
    /// the command output and the pool still counts as released. Only a
    /// command that could not be launched at all is reported as
    /// [`Notice::PoolDestroyFailed`].
    pub async fn destroy_pool(&self, pool: Option<&PoolHandle>) -> TeardownStatus {
        let Some(pool) = pool else {
            tracing::warn!("No pool created for this session");
            return TeardownStatus::NothingToDo(Notice::NoPoolToDestroy);
        };

        tracing::info!(pool_uuid = %pool.uuid, "Destroying pool");

        let command = self
            .dmg()
            .args(["pool", "destroy"])
            .arg(format!("--pool={}", pool.uuid));

        match self.runner.output(&command).await {
            Ok(output) => {
                if output.succeeded() {
                    tracing::info!(
                        pool_uuid = %pool.uuid,
                        output = %output.combined().trim(),
                        "Pool destroyed"
                    );
                } else {
                    tracing::warn!(
                        pool_uuid = %pool.uuid,
                        code = ?output.code,
                        output = %output.combined().trim(),
                        "Pool destroy exited non-zero"
                    );
                }
                TeardownStatus::Completed
            }
            Err(e) => {
                tracing::warn!(pool_uuid = %pool.uuid, error = %e, "Could not run pool destroy");
                TeardownStatus::Failed(Notice::PoolDestroyFailed {
                    pool_uuid: pool.uuid.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Query pool status for diagnostics
    ///
    /// The output is logged and returned as-is; it never feeds back into
    /// session state.
    pub async fn query_pool(&self, pool: Option<&PoolHandle>) -> BenchResult<String> {
        let pool = pool.ok_or(BenchError::NoPool)?;
        tracing::info!(pool_uuid = %pool.uuid, "Querying pool");

        let command = self
            .dmg()
            .args(["pool", "query"])
            .arg(format!("--pool={}", pool.uuid));

        let output = self
            .runner
            .output(&command)
            .await
            .map_err(|e| BenchError::spawn(command.display(), e))?;

        if !output.succeeded() {
            tracing::warn!(pool_uuid = %pool.uuid, code = ?output.code, "Pool query failed");
        }
        let text = output.combined();
        tracing::info!("{}", text.trim());
        Ok(text)
    }
}

/// Extract the pool UUID and replica ranks from `dmg pool create` output
///
/// Tokens are whitespace-delimited; the token after a case-insensitive
/// `UUID:` is the UUID and the token after `replicas:` is the replica
/// descriptor. Trailing commas are stripped. A missing replica token yields an
/// empty replica list; a missing UUID is an error.
pub fn parse_pool_create_output(output: &str) -> BenchResult<PoolHandle> {
    let tokens: Vec<&str> = output.split_whitespace().collect();

    let uuid = value_after(&tokens, "uuid:").ok_or_else(|| BenchError::PoolParseFailed {
        output: output.to_string(),
    })?;

    let replicas = match value_after(&tokens, "replicas:") {
        Some(descriptor) => descriptor
            .split(',')
            .filter(|rank| !rank.is_empty())
            .map(str::to_string)
            .collect(),
        None => {
            tracing::warn!(pool_uuid = uuid, "No replicas reported for pool");
            Vec::new()
        }
    };

    Ok(PoolHandle::new(uuid, replicas))
}

fn value_after<'a>(tokens: &[&'a str], label: &str) -> Option<&'a str> {
    tokens
        .iter()
        .position(|token| token.eq_ignore_ascii_case(label))
        .and_then(|idx| tokens.get(idx + 1).copied())
        .map(|value| value.trim_end_matches(','))
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use crate::test_support::{MockRunner, POOL_CREATE_OUTPUT};

    fn manager(runner: Arc<MockRunner>) -> PoolManager {
        PoolManager::new(runner, "/opt/daos/bin/dmg", "/etc/daos/daos_control.yml")
    }

    #[test]
    fn test_parse_uuid_and_replicas() {
        let pool = parse_pool_create_output(POOL_CREATE_OUTPUT).unwrap();
        assert_eq!(pool.uuid, "abc-123");
        assert_eq!(pool.replicas, vec!["1".to_string()]);
    }

    #[test]
    fn test_parse_is_order_and_case_independent() {
        let pool = parse_pool_create_output("replicas: 0,1,2, uuid: 5e1f-77,").unwrap();
        assert_eq!(pool.uuid, "5e1f-77");
        assert_eq!(pool.replicas, vec!["0", "1", "2"]);

        let pool = parse_pool_create_output("Service REPLICAS: 3 UUID: a-b").unwrap();
        assert_eq!(pool.uuid, "a-b");
        assert_eq!(pool.replicas, vec!["3"]);
    }

    #[test]
    fn test_parse_without_uuid_fails() {
        let err = parse_pool_create_output("Service replicas: 1").unwrap_err();
        assert!(matches!(err, BenchError::PoolParseFailed { .. }));

        // Label with nothing after it
        let err = parse_pool_create_output("Service replicas: 1 UUID:").unwrap_err();
        assert!(matches!(err, BenchError::PoolParseFailed { .. }));
    }

    #[test]
    fn test_parse_without_replicas() {
        let pool = parse_pool_create_output("UUID: abc-123,").unwrap();
        assert_eq!(pool.uuid, "abc-123");
        assert!(pool.replicas.is_empty());
    }

    #[tokio::test]
    async fn test_create_pool_command_line() {
        let runner = Arc::new(MockRunner::with_pool());
        let pool = manager(runner.clone()).create_pool("4G", "40G").await.unwrap();

        assert_eq!(pool.uuid, "abc-123");
        assert_eq!(
            runner.command_args(),
            vec!["-o /etc/daos/daos_control.yml pool create -s=4G -n=40G"]
        );
    }

    #[tokio::test]
    async fn test_create_pool_non_zero_exit() {
        let runner = Arc::new(MockRunner::new());
        runner.respond("pool create", CommandOutput::failure(1, "DER_NOSPACE"));

        let err = manager(runner).create_pool("4G", "40G").await.unwrap_err();
        match err {
            BenchError::PoolCreateFailed { code, output, .. } => {
                assert_eq!(code, Some(1));
                assert_eq!(output, "DER_NOSPACE");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_set_reclaim_mode_failure() {
        let runner = Arc::new(MockRunner::new());
        runner.respond("set-prop", CommandOutput::failure(2, "bad prop"));
        let pool = PoolHandle::new("abc-123", vec!["1".into()]);

        let err = manager(runner.clone())
            .set_reclaim_mode(&pool, ReclaimMode::Disabled)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BenchError::PoolPropertyFailed { ref pool_uuid, .. } if pool_uuid == "abc-123"
        ));
        assert!(runner.ran("pool set-prop --pool=abc-123 -n=reclaim -v=disabled"));
    }

    #[tokio::test]
    async fn test_destroy_without_pool_makes_no_call() {
        let runner = Arc::new(MockRunner::new());
        let status = manager(runner.clone()).destroy_pool(None).await;

        assert_eq!(status, TeardownStatus::NothingToDo(Notice::NoPoolToDestroy));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_destroy_non_zero_exit_is_not_escalated() {
        let runner = Arc::new(MockRunner::new());
        runner.respond("pool destroy", CommandOutput::failure(1, "busy"));
        let pool = PoolHandle::new("abc-123", vec!["1".into()]);

        let status = manager(runner.clone()).destroy_pool(Some(&pool)).await;
        assert_eq!(status, TeardownStatus::Completed);
        assert!(runner.ran("pool destroy --pool=abc-123"));
    }

    #[tokio::test]
    async fn test_destroy_launch_failure_is_reported() {
        let runner = Arc::new(MockRunner::new());
        runner.fail_launch("pool destroy");
        let pool = PoolHandle::new("abc-123", vec!["1".into()]);

        let status = manager(runner).destroy_pool(Some(&pool)).await;
        assert!(matches!(
            status,
            TeardownStatus::Failed(Notice::PoolDestroyFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_query_requires_pool() {
        let runner = Arc::new(MockRunner::new());
        let err = manager(runner.clone()).query_pool(None).await.unwrap_err();
        assert!(matches!(err, BenchError::NoPool));
        assert!(runner.calls().is_empty());

        runner.respond("pool query", CommandOutput::success("Pool abc-123, ntarget=8"));
        let pool = PoolHandle::new("abc-123", vec!["1".into()]);
        let text = manager(runner).query_pool(Some(&pool)).await.unwrap();
        assert!(text.contains("ntarget=8"));
    }
}
