// Remote Task Launcher
// Launches one-shot remote tasks and polls them to a terminal state

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};

/// Errors from launching or awaiting a remote task
#[derive(Debug, Error)]
pub enum RemoteTaskError {
    /// The remote API rejected the launch request. Fatal to the enclosing step.
    #[error("remote task launch rejected: {0}")]
    Launch(String),

    /// The task did not reach a terminal state within the wait budget.
    /// The remote task itself is left running.
    #[error("remote task '{arn}' did not stop within {max_wait:?}")]
    Timeout { arn: String, max_wait: Duration },

    /// The status poll failed or returned a malformed response
    #[error("remote task status poll failed: {0}")]
    Poll(String),
}

/// Network placement for a launched task. Identifiers are passed through
/// to the remote API untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkConfig {
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub assign_public_ip: bool,
}

/// Inputs for launching a one-shot remote task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLaunchSpec {
    /// Cluster to launch into
    pub cluster: String,
    /// Task definition identifier
    pub task_definition: String,
    /// Network placement
    pub network: NetworkConfig,
    /// Command override for the one-shot invocation
    pub command_override: Vec<String>,
}

/// Remote task lifecycle as observed through polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteTaskStatus {
    Pending,
    Running,
    Stopped,
}

/// One observation of a remote task's state, as reported by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteTaskState {
    pub status: RemoteTaskStatus,
    /// Present once the task has stopped
    pub exit_code: Option<i32>,
}

/// Handle to a launched remote task. Mutated only by the launcher.
#[derive(Debug, Clone)]
pub struct RemoteTask {
    pub arn: String,
    pub launched_at: Instant,
    pub status: RemoteTaskStatus,
    pub exit_code: Option<i32>,
}

/// The cloud orchestration boundary: submit a one-shot task, observe its
/// state. The engine never implements this; tests and dry runs script it.
#[async_trait]
pub trait RemoteTaskApi: Send + Sync {
    /// Submit a task; returns its ARN on acceptance
    async fn run_task(&self, spec: &TaskLaunchSpec) -> Result<String, RemoteTaskError>;

    /// Report the current state of a previously submitted task
    async fn describe_task(&self, arn: &str) -> Result<RemoteTaskState, RemoteTaskError>;
}

/// Two-phase launch-and-await over the remote API. Launchers hold no
/// per-task state, so independent instances may poll concurrently.
#[derive(Clone)]
pub struct RemoteTaskLauncher {
    api: Arc<dyn RemoteTaskApi>,
}

impl RemoteTaskLauncher {
    pub fn new(api: Arc<dyn RemoteTaskApi>) -> Self {
        Self { api }
    }

    /// Launch a one-shot task. Returns immediately with a Pending handle.
    pub async fn launch(&self, spec: &TaskLaunchSpec) -> Result<RemoteTask, RemoteTaskError> {
        let arn = self.api.run_task(spec).await?;
        Ok(RemoteTask {
            arn,
            launched_at: Instant::now(),
            status: RemoteTaskStatus::Pending,
            exit_code: None,
        })
    }

    /// Poll on a fixed interval until the task stops or `max_wait` elapses.
    /// Blocks only the calling job instance. On timeout the remote task is
    /// left running; the engine does not assume it can stop it.
    pub async fn await_terminal(
        &self,
        task: &mut RemoteTask,
        poll_interval: Duration,
        max_wait: Duration,
    ) -> Result<i32, RemoteTaskError> {
        let deadline = Instant::now() + max_wait;

        loop {
            let state = self.api.describe_task(&task.arn).await?;
            task.status = state.status;
            task.exit_code = state.exit_code;

            if state.status == RemoteTaskStatus::Stopped {
                return state.exit_code.ok_or_else(|| {
                    RemoteTaskError::Poll(format!(
                        "task '{}' stopped without reporting an exit code",
                        task.arn
                    ))
                });
            }

            if Instant::now() >= deadline {
                return Err(RemoteTaskError::Timeout {
                    arn: task.arn.clone(),
                    max_wait,
                });
            }

            sleep(poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::scripted::{ScriptedRemoteTasks, TaskScript};

    fn spec(cluster: &str) -> TaskLaunchSpec {
        TaskLaunchSpec {
            cluster: cluster.to_string(),
            task_definition: "migrate:7".to_string(),
            network: NetworkConfig::default(),
            command_override: vec!["migrate".to_string(), "up".to_string()],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_terminal_returns_zero_exit() {
        let api = Arc::new(ScriptedRemoteTasks::new().with_script(
            "apps-dev",
            TaskScript::Stops {
                polls_until_stopped: 2,
                exit_code: 0,
            },
        ));
        let launcher = RemoteTaskLauncher::new(api);

        let mut task = launcher.launch(&spec("apps-dev")).await.unwrap();
        assert_eq!(task.status, RemoteTaskStatus::Pending);

        let exit = launcher
            .await_terminal(&mut task, Duration::from_millis(50), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(exit, 0);
        assert_eq!(task.status, RemoteTaskStatus::Stopped);
        assert_eq!(task.exit_code, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_terminal_surfaces_nonzero_exit() {
        let api = Arc::new(ScriptedRemoteTasks::new().with_script(
            "apps-uat",
            TaskScript::Stops {
                polls_until_stopped: 1,
                exit_code: 137,
            },
        ));
        let launcher = RemoteTaskLauncher::new(api);

        let mut task = launcher.launch(&spec("apps-uat")).await.unwrap();
        let exit = launcher
            .await_terminal(&mut task, Duration::from_millis(50), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(exit, 137);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_terminal_times_out() {
        let api =
            Arc::new(ScriptedRemoteTasks::new().with_script("apps-prod", TaskScript::NeverStops));
        let launcher = RemoteTaskLauncher::new(api);

        let mut task = launcher.launch(&spec("apps-prod")).await.unwrap();
        let err = launcher
            .await_terminal(
                &mut task,
                Duration::from_millis(50),
                Duration::from_millis(200),
            )
            .await
            .unwrap_err();

        match err {
            RemoteTaskError::Timeout { arn, max_wait } => {
                assert_eq!(arn, task.arn);
                assert_eq!(max_wait, Duration::from_millis(200));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        // The handle never reached a terminal state
        assert_ne!(task.status, RemoteTaskStatus::Stopped);
    }

    #[tokio::test]
    async fn test_launch_rejection() {
        let api = Arc::new(ScriptedRemoteTasks::new().with_script(
            "apps-dev",
            TaskScript::RejectLaunch("subnet not found".to_string()),
        ));
        let launcher = RemoteTaskLauncher::new(api);

        let err = launcher.launch(&spec("apps-dev")).await.unwrap_err();
        match err {
            RemoteTaskError::Launch(reason) => assert!(reason.contains("subnet not found")),
            other => panic!("expected launch error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_without_exit_code_is_a_poll_error() {
        let api = Arc::new(ScriptedRemoteTasks::new().with_script(
            "apps-dev",
            TaskScript::StopsSilently {
                polls_until_stopped: 1,
            },
        ));
        let launcher = RemoteTaskLauncher::new(api);

        let mut task = launcher.launch(&spec("apps-dev")).await.unwrap();
        let err = launcher
            .await_terminal(&mut task, Duration::from_millis(50), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, RemoteTaskError::Poll(_)));
    }

    #[tokio::test]
    async fn test_unknown_arn_is_a_poll_error() {
        let api = Arc::new(ScriptedRemoteTasks::new());
        let launcher = RemoteTaskLauncher::new(api);

        let mut task = RemoteTask {
            arn: "arn:sim:task/nowhere/0".to_string(),
            launched_at: Instant::now(),
            status: RemoteTaskStatus::Pending,
            exit_code: None,
        };
        let err = launcher
            .await_terminal(&mut task, Duration::from_millis(10), Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, RemoteTaskError::Poll(_)));
    }
}
