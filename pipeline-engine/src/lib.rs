// Pipeline Engine Library
// Job-graph orchestration: matrix fan-out, conditional steps, secret-scoped
// contexts, and remote task launch-and-await

pub mod collab;
pub mod config;
pub mod execution;
pub mod model;
pub mod remote;
pub mod secrets;

// Re-export commonly used types
pub use config::{ConfigError, RunnerConfig};

pub use collab::{CallOutcome, Collaborator, ScriptedCollaborator, ScriptedRemoteTasks, TaskScript};

pub use execution::{
    progress_channel, EventSender, ExecutionEvent, GraphError, GraphErrorKind, InstanceContext,
    JobGraph, JobInstance, JobNode, MatrixExpander, PipelineRunner, ProgressReceiver,
    ProgressSender, StepExecutor,
};

pub use model::{
    BuildSpec, CallKind, CollaboratorCall, Condition, DeploySpec, Environment, EventKind,
    InstanceSummary, Job, JobInstanceResult, JobRef, JobStatus, Pipeline, PushSpec, RunResult,
    RunStatus, RunSummary, RunTrigger, ScanSpec, Step, StepResult, StepStatus, TaskWaitSpec,
    TestSpec, TriggerFilter,
};

pub use remote::{
    NetworkConfig, RemoteTask, RemoteTaskApi, RemoteTaskError, RemoteTaskLauncher,
    RemoteTaskState, RemoteTaskStatus, TaskLaunchSpec,
};

pub use secrets::{SecretProvider, SecretResolutionError, SecretValue, StaticSecrets};
