// Pipeline Data Model
// Types describing pipelines, jobs, steps, triggers, and their results

use crate::remote::TaskLaunchSpec;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Triggers
// =============================================================================

/// The kind of source-control event that produced a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    PullRequest,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Push => write!(f, "push"),
            EventKind::PullRequest => write!(f, "pull_request"),
        }
    }
}

/// A single trigger event, consumed once to decide whether a run happens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTrigger {
    /// Branch the event occurred on
    pub branch: String,
    /// Event kind (push or pull request)
    pub event: EventKind,
}

impl RunTrigger {
    pub fn new(branch: impl Into<String>, event: EventKind) -> Self {
        Self {
            branch: branch.into(),
            event,
        }
    }
}

/// Branch allow-list controlling which trigger events start a run
#[derive(Debug, Clone, Default)]
pub struct TriggerFilter {
    /// Branches eligible to run; an empty list allows nothing
    pub branches: Vec<String>,
}

impl TriggerFilter {
    pub fn branches<I, S>(branches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            branches: branches.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether a trigger's branch is on the allow-list
    pub fn allows(&self, trigger: &RunTrigger) -> bool {
        self.branches.iter().any(|b| b == &trigger.branch)
    }
}

// =============================================================================
// Environments and conditions
// =============================================================================

/// A deployment environment name (a matrix axis value)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Environment(String);

impl Environment {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Environment {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Predicate guarding a step, evaluated against the instance's environment
/// binding. There is deliberately no expression grammar here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// True when the instance is bound to exactly this environment
    EnvironmentIs(Environment),
    /// True when the instance is bound to one of these environments
    EnvironmentIn(Vec<Environment>),
    /// Negation
    Not(Box<Condition>),
}

impl Condition {
    /// Evaluate against an instance's environment binding.
    /// An unbound instance satisfies no environment predicate.
    pub fn evaluate(&self, environment: Option<&Environment>) -> bool {
        match self {
            Condition::EnvironmentIs(env) => environment == Some(env),
            Condition::EnvironmentIn(envs) => {
                environment.is_some_and(|e| envs.contains(e))
            }
            Condition::Not(inner) => !inner.evaluate(environment),
        }
    }
}

// =============================================================================
// Collaborator calls
// =============================================================================

/// Inputs for a vulnerability scan call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSpec {
    /// Repository snapshot to scan (path or ref)
    pub target: String,
}

/// Inputs for a test-runner call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSpec {
    /// Repository snapshot the tests run against
    pub target: String,
}

/// Inputs for an image build call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    /// Build context directory
    pub context_dir: String,
    /// Tag to apply to the built image
    pub tag: String,
}

/// Inputs for an image push call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSpec {
    /// Image reference to push
    pub image: String,
    /// Target registry
    pub registry: String,
}

/// Inputs for a service deployment call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploySpec {
    /// Cluster identifier
    pub cluster: String,
    /// Service identifier
    pub service: String,
}

/// Inputs for awaiting a previously launched remote task.
/// `None` fields fall back to the runner configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskWaitSpec {
    pub poll_interval: Option<Duration>,
    pub max_wait: Option<Duration>,
}

/// An invocation of an external collaborator, tagged by operation.
/// The engine sequences these; it never implements them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorCall {
    ScanCode(ScanSpec),
    ScanDependencies(ScanSpec),
    ScanInfra(ScanSpec),
    RunTests(TestSpec),
    BuildImage(BuildSpec),
    PushImage(PushSpec),
    DeployService(DeploySpec),
    RunRemoteTask(TaskLaunchSpec),
    WaitForRemoteTask(TaskWaitSpec),
}

impl CollaboratorCall {
    /// The operation kind, used for dispatch and scripting
    pub fn kind(&self) -> CallKind {
        match self {
            CollaboratorCall::ScanCode(_) => CallKind::ScanCode,
            CollaboratorCall::ScanDependencies(_) => CallKind::ScanDependencies,
            CollaboratorCall::ScanInfra(_) => CallKind::ScanInfra,
            CollaboratorCall::RunTests(_) => CallKind::RunTests,
            CollaboratorCall::BuildImage(_) => CallKind::BuildImage,
            CollaboratorCall::PushImage(_) => CallKind::PushImage,
            CollaboratorCall::DeployService(_) => CallKind::DeployService,
            CollaboratorCall::RunRemoteTask(_) => CallKind::RunRemoteTask,
            CollaboratorCall::WaitForRemoteTask(_) => CallKind::WaitForRemoteTask,
        }
    }
}

/// Discriminant for collaborator calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    ScanCode,
    ScanDependencies,
    ScanInfra,
    RunTests,
    BuildImage,
    PushImage,
    DeployService,
    RunRemoteTask,
    WaitForRemoteTask,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallKind::ScanCode => "scan_code",
            CallKind::ScanDependencies => "scan_dependencies",
            CallKind::ScanInfra => "scan_infra",
            CallKind::RunTests => "run_tests",
            CallKind::BuildImage => "build_image",
            CallKind::PushImage => "push_image",
            CallKind::DeployService => "deploy_service",
            CallKind::RunRemoteTask => "run_remote_task",
            CallKind::WaitForRemoteTask => "wait_for_remote_task",
        };
        write!(f, "{}", name)
    }
}

// =============================================================================
// Pipeline structure
// =============================================================================

/// A single step within a job
#[derive(Debug, Clone)]
pub struct Step {
    /// Step name
    pub name: String,
    /// Optional guard; a false condition skips the step without side effects
    pub condition: Option<Condition>,
    /// The collaborator operation this step performs
    pub call: CollaboratorCall,
}

impl Step {
    pub fn new(name: impl Into<String>, call: CollaboratorCall) -> Self {
        Self {
            name: name.into(),
            condition: None,
            call,
        }
    }

    /// Guard this step with a condition
    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// A named unit of work with declared dependencies and ordered steps
#[derive(Debug, Clone)]
pub struct Job {
    /// Job name, unique within a pipeline
    pub name: String,
    /// Names of jobs that must succeed before this one starts
    pub depends_on: Vec<String>,
    /// Matrix axis values; empty means a single unbound instance
    pub matrix: Vec<Environment>,
    /// Names of secrets resolved at instance start
    pub secrets: Vec<String>,
    /// Ordered steps
    pub steps: Vec<Step>,
}

impl Job {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            matrix: Vec::new(),
            secrets: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Declare upstream dependencies
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Declare matrix axis values (one instance per environment)
    pub fn matrix<I, E>(mut self, environments: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Environment>,
    {
        self.matrix = environments.into_iter().map(Into::into).collect();
        self
    }

    /// Declare a secret to resolve before the first step runs
    pub fn secret(mut self, name: impl Into<String>) -> Self {
        self.secrets.push(name.into());
        self
    }

    /// Append a step
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }
}

/// A complete pipeline definition: trigger filter plus jobs
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,
    /// Branch allow-list gating runs
    pub trigger: TriggerFilter,
    /// Jobs, in declaration order (execution order comes from the graph)
    pub jobs: Vec<Job>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, trigger: TriggerFilter) -> Self {
        Self {
            name: name.into(),
            trigger,
            jobs: Vec::new(),
        }
    }

    /// Append a job definition
    pub fn job(mut self, job: Job) -> Self {
        self.jobs.push(job);
        self
    }
}

// =============================================================================
// Statuses and results
// =============================================================================

/// Lifecycle status of a step within a job instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

/// Lifecycle status of a job instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

/// Terminal status of a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
    /// The trigger was ineligible; no instances were created
    Skipped,
}

/// Result of one step
#[derive(Debug, Clone)]
pub struct StepResult {
    pub step_name: String,
    pub status: StepStatus,
    /// Collaborator output, lossily decoded for reporting
    pub output: String,
    /// Failure diagnostics, when the step failed
    pub diagnostics: Option<String>,
    /// Exit code, where the underlying operation reports one
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl StepResult {
    /// A step recorded as skipped without having run
    pub fn skipped(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Skipped,
            output: String::new(),
            diagnostics: None,
            exit_code: None,
            duration: Duration::ZERO,
        }
    }
}

/// Result of one job instance
#[derive(Debug, Clone)]
pub struct JobInstanceResult {
    pub job_name: String,
    pub environment: Option<Environment>,
    pub status: JobStatus,
    pub steps: Vec<StepResult>,
    /// First failure's diagnostics, when the instance failed
    pub diagnostics: Option<String>,
    pub duration: Duration,
}

impl JobInstanceResult {
    /// Display label, e.g. `deploy[uat]`
    pub fn label(&self) -> String {
        match &self.environment {
            Some(env) => format!("{}[{}]", self.job_name, env),
            None => self.job_name.clone(),
        }
    }

    /// The first failed step of this instance, if any
    pub fn first_failed_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }
}

/// Result of a whole run: terminal status for every instantiated instance
#[derive(Debug, Clone)]
pub struct RunResult {
    pub pipeline_name: String,
    pub status: RunStatus,
    pub instances: Vec<JobInstanceResult>,
    pub duration: Duration,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Process exit code: 0 only for a succeeded run
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Succeeded => 0,
            _ => 1,
        }
    }

    /// First failing instance and its first failed step, if the run failed
    pub fn first_failure(&self) -> Option<(&JobInstanceResult, Option<&StepResult>)> {
        self.instances
            .iter()
            .find(|i| i.status == JobStatus::Failed)
            .map(|i| (i, i.first_failed_step()))
    }

    /// Serializable summary for machine-readable reporting
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            pipeline: self.pipeline_name.clone(),
            status: self.status,
            duration_ms: self.duration.as_millis() as u64,
            instances: self
                .instances
                .iter()
                .map(|i| InstanceSummary {
                    job: i.job_name.clone(),
                    environment: i.environment.as_ref().map(|e| e.to_string()),
                    status: i.status,
                    duration_ms: i.duration.as_millis() as u64,
                    failed_step: i.first_failed_step().map(|s| s.step_name.clone()),
                    diagnostics: i.diagnostics.clone(),
                })
                .collect(),
        }
    }
}

/// Machine-readable run summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub pipeline: String,
    pub status: RunStatus,
    pub duration_ms: u64,
    pub instances: Vec<InstanceSummary>,
}

/// Machine-readable instance summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub job: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    pub status: JobStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

/// Shared handle to a job definition, cloned into each matrix instance
pub type JobRef = Arc<Job>;
