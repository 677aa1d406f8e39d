// Scripted Collaborators
// Programmable doubles for the collaborator and remote-task boundaries,
// used by the test suite and by simulated CLI runs

use crate::collab::{CallOutcome, Collaborator};
use crate::execution::context::InstanceContext;
use crate::model::{CallKind, CollaboratorCall, Environment};
use crate::remote::{
    RemoteTaskApi, RemoteTaskError, RemoteTaskState, RemoteTaskStatus, TaskLaunchSpec,
};

use std::collections::HashMap;
use tokio::sync::Mutex;

/// One recorded collaborator invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRecord {
    pub job: String,
    pub environment: Option<Environment>,
    pub kind: CallKind,
}

/// Collaborator double: every call succeeds unless scripted otherwise.
/// Records invocations so tests can assert on side-effect ordering.
#[derive(Default)]
pub struct ScriptedCollaborator {
    fail_any: HashMap<CallKind, String>,
    fail_scoped: HashMap<(CallKind, Environment), String>,
    log: Mutex<Vec<InvocationRecord>>,
}

impl ScriptedCollaborator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail this call kind in every environment
    pub fn with_failure(mut self, kind: CallKind, diagnostics: impl Into<String>) -> Self {
        self.fail_any.insert(kind, diagnostics.into());
        self
    }

    /// Fail this call kind only for instances bound to the given environment
    pub fn with_scoped_failure(
        mut self,
        kind: CallKind,
        environment: impl Into<Environment>,
        diagnostics: impl Into<String>,
    ) -> Self {
        self.fail_scoped
            .insert((kind, environment.into()), diagnostics.into());
        self
    }

    /// Invocations observed so far, in call order
    pub async fn invocations(&self) -> Vec<InvocationRecord> {
        self.log.lock().await.clone()
    }

    fn scripted_failure(&self, kind: CallKind, environment: Option<&Environment>) -> Option<&str> {
        if let Some(env) = environment {
            if let Some(diag) = self.fail_scoped.get(&(kind, env.clone())) {
                return Some(diag);
            }
        }
        self.fail_any.get(&kind).map(String::as_str)
    }
}

#[async_trait::async_trait]
impl Collaborator for ScriptedCollaborator {
    async fn invoke(&self, call: &CollaboratorCall, ctx: &InstanceContext) -> CallOutcome {
        let kind = call.kind();
        self.log.lock().await.push(InvocationRecord {
            job: ctx.job_name().to_string(),
            environment: ctx.environment().cloned(),
            kind,
        });

        match self.scripted_failure(kind, ctx.environment()) {
            Some(diagnostics) => CallOutcome::failed(diagnostics),
            None => CallOutcome::succeeded(format!("{} ok", kind).into_bytes()),
        }
    }
}

/// Behavior of a scripted remote task, keyed by cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskScript {
    /// Observed Running for this many polls, then Stopped with the exit code
    Stops {
        polls_until_stopped: u32,
        exit_code: i32,
    },
    /// Stops but never reports an exit code (protocol fault)
    StopsSilently { polls_until_stopped: u32 },
    /// Never reaches a terminal state
    NeverStops,
    /// The launch request itself is rejected
    RejectLaunch(String),
}

impl Default for TaskScript {
    fn default() -> Self {
        TaskScript::Stops {
            polls_until_stopped: 1,
            exit_code: 0,
        }
    }
}

#[derive(Debug)]
struct LaunchedTask {
    script: TaskScript,
    polls_seen: u32,
}

#[derive(Debug, Default)]
struct ScriptState {
    launched: HashMap<String, LaunchedTask>,
    counter: u64,
}

/// Remote-task API double. Launch behavior is scripted per cluster; the
/// default script stops after one poll with exit code 0.
#[derive(Default)]
pub struct ScriptedRemoteTasks {
    scripts: HashMap<String, TaskScript>,
    state: Mutex<ScriptState>,
}

impl ScriptedRemoteTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the behavior of tasks launched into the given cluster
    pub fn with_script(mut self, cluster: impl Into<String>, script: TaskScript) -> Self {
        self.scripts.insert(cluster.into(), script);
        self
    }

    /// Number of tasks launched so far
    pub async fn launch_count(&self) -> u64 {
        self.state.lock().await.counter
    }
}

#[async_trait::async_trait]
impl RemoteTaskApi for ScriptedRemoteTasks {
    async fn run_task(&self, spec: &TaskLaunchSpec) -> Result<String, RemoteTaskError> {
        let script = self
            .scripts
            .get(&spec.cluster)
            .cloned()
            .unwrap_or_default();

        if let TaskScript::RejectLaunch(reason) = &script {
            return Err(RemoteTaskError::Launch(reason.clone()));
        }

        let mut state = self.state.lock().await;
        state.counter += 1;
        let arn = format!("arn:sim:task/{}/{}", spec.cluster, state.counter);
        state.launched.insert(
            arn.clone(),
            LaunchedTask {
                script,
                polls_seen: 0,
            },
        );
        Ok(arn)
    }

    async fn describe_task(&self, arn: &str) -> Result<RemoteTaskState, RemoteTaskError> {
        let mut state = self.state.lock().await;
        let task = state
            .launched
            .get_mut(arn)
            .ok_or_else(|| RemoteTaskError::Poll(format!("unknown task '{}'", arn)))?;

        task.polls_seen += 1;
        let observed = match &task.script {
            TaskScript::Stops {
                polls_until_stopped,
                exit_code,
            } => {
                if task.polls_seen >= *polls_until_stopped {
                    RemoteTaskState {
                        status: RemoteTaskStatus::Stopped,
                        exit_code: Some(*exit_code),
                    }
                } else {
                    RemoteTaskState {
                        status: RemoteTaskStatus::Running,
                        exit_code: None,
                    }
                }
            }
            TaskScript::StopsSilently {
                polls_until_stopped,
            } => {
                if task.polls_seen >= *polls_until_stopped {
                    RemoteTaskState {
                        status: RemoteTaskStatus::Stopped,
                        exit_code: None,
                    }
                } else {
                    RemoteTaskState {
                        status: RemoteTaskStatus::Running,
                        exit_code: None,
                    }
                }
            }
            TaskScript::NeverStops => RemoteTaskState {
                status: RemoteTaskStatus::Running,
                exit_code: None,
            },
            // Rejected launches never produce a task to describe
            TaskScript::RejectLaunch(_) => {
                return Err(RemoteTaskError::Poll(format!(
                    "task '{}' was never launched",
                    arn
                )))
            }
        };

        Ok(observed)
    }
}
