// Execution Events
// Progress reporting and event types for pipeline runs

use crate::model::{Environment, EventKind, JobStatus, RunStatus, StepStatus};

use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for execution progress events
pub type ProgressSender = mpsc::UnboundedSender<ExecutionEvent>;

/// Receiver for execution progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted during a pipeline run.
/// Secret values never appear in events.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// A run was accepted and started
    RunStarted {
        pipeline_name: String,
        branch: String,
        event: EventKind,
        total_jobs: usize,
    },

    /// The trigger was ineligible; no instances were created
    RunSkipped {
        pipeline_name: String,
        branch: String,
        reason: String,
    },

    /// The run reached its terminal status
    RunCompleted {
        pipeline_name: String,
        status: RunStatus,
        duration: Duration,
    },

    /// A job instance started executing
    JobStarted {
        job_name: String,
        environment: Option<Environment>,
        total_steps: usize,
    },

    /// A job instance reached a terminal status
    JobCompleted {
        job_name: String,
        environment: Option<Environment>,
        status: JobStatus,
        duration: Duration,
    },

    /// A job instance was skipped (failed dependencies)
    JobSkipped {
        job_name: String,
        environment: Option<Environment>,
        reason: String,
    },

    /// A step started executing
    StepStarted {
        job_name: String,
        environment: Option<Environment>,
        step_name: String,
        step_index: usize,
    },

    /// Collaborator output from a step
    StepOutput {
        job_name: String,
        environment: Option<Environment>,
        step_name: String,
        step_index: usize,
        output: String,
    },

    /// A step finished
    StepCompleted {
        job_name: String,
        environment: Option<Environment>,
        step_name: String,
        step_index: usize,
        status: StepStatus,
        duration: Duration,
        exit_code: Option<i32>,
    },

    /// A step was skipped (condition false, or an earlier step failed)
    StepSkipped {
        job_name: String,
        environment: Option<Environment>,
        step_name: String,
        step_index: usize,
        reason: String,
    },

    /// A remote task was launched
    TaskLaunched {
        job_name: String,
        environment: Option<Environment>,
        arn: String,
    },

    /// A remote task reached its terminal state
    TaskStopped {
        job_name: String,
        environment: Option<Environment>,
        arn: String,
        exit_code: Option<i32>,
    },

    /// An execution error occurred
    Error {
        message: String,
        job_name: Option<String>,
        environment: Option<Environment>,
    },
}

impl ExecutionEvent {
    /// Create a run started event
    pub fn run_started(
        pipeline_name: impl Into<String>,
        branch: impl Into<String>,
        event: EventKind,
        total_jobs: usize,
    ) -> Self {
        Self::RunStarted {
            pipeline_name: pipeline_name.into(),
            branch: branch.into(),
            event,
            total_jobs,
        }
    }

    /// Create a run skipped event
    pub fn run_skipped(
        pipeline_name: impl Into<String>,
        branch: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::RunSkipped {
            pipeline_name: pipeline_name.into(),
            branch: branch.into(),
            reason: reason.into(),
        }
    }

    /// Create a run completed event
    pub fn run_completed(
        pipeline_name: impl Into<String>,
        status: RunStatus,
        duration: Duration,
    ) -> Self {
        Self::RunCompleted {
            pipeline_name: pipeline_name.into(),
            status,
            duration,
        }
    }

    /// Create a job started event
    pub fn job_started(
        job_name: impl Into<String>,
        environment: Option<Environment>,
        total_steps: usize,
    ) -> Self {
        Self::JobStarted {
            job_name: job_name.into(),
            environment,
            total_steps,
        }
    }

    /// Create a job completed event
    pub fn job_completed(
        job_name: impl Into<String>,
        environment: Option<Environment>,
        status: JobStatus,
        duration: Duration,
    ) -> Self {
        Self::JobCompleted {
            job_name: job_name.into(),
            environment,
            status,
            duration,
        }
    }

    /// Create a job skipped event
    pub fn job_skipped(
        job_name: impl Into<String>,
        environment: Option<Environment>,
        reason: impl Into<String>,
    ) -> Self {
        Self::JobSkipped {
            job_name: job_name.into(),
            environment,
            reason: reason.into(),
        }
    }

    /// Create a step started event
    pub fn step_started(
        job_name: impl Into<String>,
        environment: Option<Environment>,
        step_name: impl Into<String>,
        step_index: usize,
    ) -> Self {
        Self::StepStarted {
            job_name: job_name.into(),
            environment,
            step_name: step_name.into(),
            step_index,
        }
    }

    /// Create a step output event
    pub fn step_output(
        job_name: impl Into<String>,
        environment: Option<Environment>,
        step_name: impl Into<String>,
        step_index: usize,
        output: impl Into<String>,
    ) -> Self {
        Self::StepOutput {
            job_name: job_name.into(),
            environment,
            step_name: step_name.into(),
            step_index,
            output: output.into(),
        }
    }

    /// Create a step completed event
    pub fn step_completed(
        job_name: impl Into<String>,
        environment: Option<Environment>,
        step_name: impl Into<String>,
        step_index: usize,
        status: StepStatus,
        duration: Duration,
        exit_code: Option<i32>,
    ) -> Self {
        Self::StepCompleted {
            job_name: job_name.into(),
            environment,
            step_name: step_name.into(),
            step_index,
            status,
            duration,
            exit_code,
        }
    }

    /// Create a step skipped event
    pub fn step_skipped(
        job_name: impl Into<String>,
        environment: Option<Environment>,
        step_name: impl Into<String>,
        step_index: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self::StepSkipped {
            job_name: job_name.into(),
            environment,
            step_name: step_name.into(),
            step_index,
            reason: reason.into(),
        }
    }

    /// Create a task launched event
    pub fn task_launched(
        job_name: impl Into<String>,
        environment: Option<Environment>,
        arn: impl Into<String>,
    ) -> Self {
        Self::TaskLaunched {
            job_name: job_name.into(),
            environment,
            arn: arn.into(),
        }
    }

    /// Create a task stopped event
    pub fn task_stopped(
        job_name: impl Into<String>,
        environment: Option<Environment>,
        arn: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::TaskStopped {
            job_name: job_name.into(),
            environment,
            arn: arn.into(),
            exit_code,
        }
    }

    /// Create an error event
    pub fn error(
        message: impl Into<String>,
        job_name: Option<String>,
        environment: Option<Environment>,
    ) -> Self {
        Self::Error {
            message: message.into(),
            job_name,
            environment,
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: ExecutionEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: ExecutionEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: ExecutionEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}
