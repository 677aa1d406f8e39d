// Matrix Expansion
// Fans a job template out into one instance per environment axis value

use crate::model::{Environment, JobRef, JobStatus};

use std::sync::Arc;
use std::time::Instant;

/// One concrete execution of a job, possibly one of several matrix siblings.
/// Siblings share the job definition and nothing else.
#[derive(Debug, Clone)]
pub struct JobInstance {
    /// The job this instance executes
    pub job: JobRef,
    /// Environment binding; `None` for non-matrix jobs
    pub environment: Option<Environment>,
    /// Lifecycle status, owned by the runner for the duration of the run
    pub status: JobStatus,
    pub started_at: Option<Instant>,
    pub ended_at: Option<Instant>,
}

impl JobInstance {
    fn new(job: JobRef, environment: Option<Environment>) -> Self {
        Self {
            job,
            environment,
            status: JobStatus::Pending,
            started_at: None,
            ended_at: None,
        }
    }

    /// Display label, e.g. `deploy[uat]`
    pub fn label(&self) -> String {
        match &self.environment {
            Some(env) => format!("{}[{}]", self.job.name, env),
            None => self.job.name.clone(),
        }
    }

    pub(crate) fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Instant::now());
    }

    pub(crate) fn mark_terminal(&mut self, status: JobStatus) {
        self.status = status;
        self.ended_at = Some(Instant::now());
    }
}

/// Matrix expander for job templates
pub struct MatrixExpander;

impl MatrixExpander {
    /// One Pending instance per axis value, each with its own environment
    /// binding. A job with no matrix expands to a single unbound instance.
    pub fn expand(job: &JobRef) -> Vec<JobInstance> {
        if job.matrix.is_empty() {
            return vec![JobInstance::new(Arc::clone(job), None)];
        }

        job.matrix
            .iter()
            .map(|env| JobInstance::new(Arc::clone(job), Some(env.clone())))
            .collect()
    }
}
