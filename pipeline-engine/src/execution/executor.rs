// Pipeline Runner
// Tier-by-tier orchestration with matrix fan-out and fail-fast propagation

use crate::collab::Collaborator;
use crate::config::RunnerConfig;
use crate::execution::context::InstanceContext;
use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::execution::graph::{GraphError, JobGraph};
use crate::execution::matrix::{JobInstance, MatrixExpander};
use crate::model::{
    CollaboratorCall, JobInstanceResult, JobStatus, Pipeline, RunResult, RunStatus, RunTrigger,
    Step, StepResult, StepStatus,
};
use crate::remote::{RemoteTask, RemoteTaskApi, RemoteTaskLauncher};
use crate::secrets::SecretProvider;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Executes one job instance's steps strictly in declared order.
/// Fail-fast within the instance: a failed step skips the remainder and
/// fails the instance.
#[derive(Clone)]
pub struct StepExecutor {
    pipeline_name: String,
    config: RunnerConfig,
    secrets: Arc<dyn SecretProvider>,
    collaborator: Arc<dyn Collaborator>,
    launcher: RemoteTaskLauncher,
    events: Option<ProgressSender>,
}

impl StepExecutor {
    pub fn new(
        pipeline_name: impl Into<String>,
        config: RunnerConfig,
        secrets: Arc<dyn SecretProvider>,
        collaborator: Arc<dyn Collaborator>,
        remote: Arc<dyn RemoteTaskApi>,
        events: Option<ProgressSender>,
    ) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            config,
            secrets,
            collaborator,
            launcher: RemoteTaskLauncher::new(remote),
            events,
        }
    }

    /// Run one instance to a terminal status
    pub async fn execute_instance(&self, mut instance: JobInstance) -> JobInstanceResult {
        let start = Instant::now();
        let job = Arc::clone(&instance.job);
        let environment = instance.environment.clone();

        self.events.send_event(ExecutionEvent::job_started(
            &job.name,
            environment.clone(),
            job.steps.len(),
        ));
        instance.mark_running();

        // Secrets resolve before any side-effecting step runs; a failure
        // here fails the instance with every step unrun.
        let ctx = match InstanceContext::resolve(
            self.secrets.as_ref(),
            &self.pipeline_name,
            &job,
            environment.clone(),
        ) {
            Ok(ctx) => ctx,
            Err(e) => {
                let message = e.to_string();
                self.events.send_event(ExecutionEvent::error(
                    &message,
                    Some(job.name.clone()),
                    environment.clone(),
                ));
                instance.mark_terminal(JobStatus::Failed);
                let result = JobInstanceResult {
                    job_name: job.name.clone(),
                    environment: environment.clone(),
                    status: JobStatus::Failed,
                    steps: job.steps.iter().map(|s| StepResult::skipped(&s.name)).collect(),
                    diagnostics: Some(message),
                    duration: start.elapsed(),
                };
                self.events.send_event(ExecutionEvent::job_completed(
                    &job.name,
                    environment,
                    JobStatus::Failed,
                    result.duration,
                ));
                return result;
            }
        };

        let mut steps = Vec::with_capacity(job.steps.len());
        let mut failure: Option<String> = None;
        // Handle carried between a launch step and a later wait step
        let mut pending_task: Option<RemoteTask> = None;

        for (index, step) in job.steps.iter().enumerate() {
            if failure.is_some() {
                self.events.send_event(ExecutionEvent::step_skipped(
                    &job.name,
                    environment.clone(),
                    &step.name,
                    index,
                    "an earlier step failed",
                ));
                steps.push(StepResult::skipped(&step.name));
                continue;
            }

            if let Some(condition) = &step.condition {
                if !ctx.evaluate(condition) {
                    self.events.send_event(ExecutionEvent::step_skipped(
                        &job.name,
                        environment.clone(),
                        &step.name,
                        index,
                        "condition evaluated to false",
                    ));
                    steps.push(StepResult::skipped(&step.name));
                    continue;
                }
            }

            self.events.send_event(ExecutionEvent::step_started(
                &job.name,
                environment.clone(),
                &step.name,
                index,
            ));

            let result = self.execute_step(step, index, &ctx, &mut pending_task).await;

            self.events.send_event(ExecutionEvent::step_completed(
                &job.name,
                environment.clone(),
                &step.name,
                index,
                result.status,
                result.duration,
                result.exit_code,
            ));

            if result.status == StepStatus::Failed {
                failure = Some(
                    result
                        .diagnostics
                        .clone()
                        .unwrap_or_else(|| format!("step '{}' failed", step.name)),
                );
            }
            steps.push(result);
        }

        let status = if failure.is_some() {
            JobStatus::Failed
        } else {
            JobStatus::Succeeded
        };
        instance.mark_terminal(status);

        let duration = start.elapsed();
        self.events.send_event(ExecutionEvent::job_completed(
            &job.name,
            environment.clone(),
            status,
            duration,
        ));

        JobInstanceResult {
            job_name: job.name.clone(),
            environment,
            status,
            steps,
            diagnostics: failure,
            duration,
        }
    }

    /// Execute a single step's collaborator call
    async fn execute_step(
        &self,
        step: &Step,
        index: usize,
        ctx: &InstanceContext,
        pending_task: &mut Option<RemoteTask>,
    ) -> StepResult {
        let start = Instant::now();

        match &step.call {
            CollaboratorCall::RunRemoteTask(spec) => {
                match self.launcher.launch(spec).await {
                    Ok(task) => {
                        self.events.send_event(ExecutionEvent::task_launched(
                            ctx.job_name(),
                            ctx.environment().cloned(),
                            &task.arn,
                        ));
                        let result = StepResult {
                            step_name: step.name.clone(),
                            status: StepStatus::Succeeded,
                            output: task.arn.clone(),
                            diagnostics: None,
                            exit_code: None,
                            duration: start.elapsed(),
                        };
                        *pending_task = Some(task);
                        result
                    }
                    Err(e) => StepResult {
                        step_name: step.name.clone(),
                        status: StepStatus::Failed,
                        output: String::new(),
                        diagnostics: Some(e.to_string()),
                        exit_code: None,
                        duration: start.elapsed(),
                    },
                }
            }

            CollaboratorCall::WaitForRemoteTask(wait) => match pending_task.take() {
                None => StepResult {
                    step_name: step.name.clone(),
                    status: StepStatus::Failed,
                    output: String::new(),
                    diagnostics: Some(
                        "no remote task was launched in this job instance".to_string(),
                    ),
                    exit_code: None,
                    duration: start.elapsed(),
                },
                Some(mut task) => {
                    let interval = wait.poll_interval.unwrap_or(self.config.poll_interval());
                    let max_wait = wait.max_wait.unwrap_or(self.config.max_task_wait());

                    match self.launcher.await_terminal(&mut task, interval, max_wait).await {
                        Ok(exit_code) => {
                            self.events.send_event(ExecutionEvent::task_stopped(
                                ctx.job_name(),
                                ctx.environment().cloned(),
                                &task.arn,
                                Some(exit_code),
                            ));
                            if exit_code == 0 {
                                StepResult {
                                    step_name: step.name.clone(),
                                    status: StepStatus::Succeeded,
                                    output: String::new(),
                                    diagnostics: None,
                                    exit_code: Some(0),
                                    duration: start.elapsed(),
                                }
                            } else {
                                StepResult {
                                    step_name: step.name.clone(),
                                    status: StepStatus::Failed,
                                    output: String::new(),
                                    diagnostics: Some(format!(
                                        "remote task '{}' exited with code {}",
                                        task.arn, exit_code
                                    )),
                                    exit_code: Some(exit_code),
                                    duration: start.elapsed(),
                                }
                            }
                        }
                        Err(e) => StepResult {
                            step_name: step.name.clone(),
                            status: StepStatus::Failed,
                            output: String::new(),
                            diagnostics: Some(e.to_string()),
                            exit_code: None,
                            duration: start.elapsed(),
                        },
                    }
                }
            },

            call => {
                let outcome = self.collaborator.invoke(call, ctx).await;
                let output = String::from_utf8_lossy(&outcome.output).to_string();

                if !output.is_empty() {
                    self.events.send_event(ExecutionEvent::step_output(
                        ctx.job_name(),
                        ctx.environment().cloned(),
                        &step.name,
                        index,
                        &output,
                    ));
                }

                if outcome.success {
                    StepResult {
                        step_name: step.name.clone(),
                        status: StepStatus::Succeeded,
                        output,
                        diagnostics: None,
                        exit_code: None,
                        duration: start.elapsed(),
                    }
                } else {
                    let diagnostics = if outcome.diagnostics.is_empty() {
                        format!("collaborator reported failure for '{}'", step.call.kind())
                    } else {
                        outcome.diagnostics
                    };
                    StepResult {
                        step_name: step.name.clone(),
                        status: StepStatus::Failed,
                        output,
                        diagnostics: Some(diagnostics),
                        exit_code: None,
                        duration: start.elapsed(),
                    }
                }
            }
        }
    }
}

/// Top-level driver: gates on the trigger, walks the job graph tier by
/// tier, fans matrix jobs out concurrently, and aggregates fail-fast
/// status. The runner is the only writer of run state.
pub struct PipelineRunner {
    pipeline: Pipeline,
    graph: JobGraph,
    config: RunnerConfig,
    secrets: Arc<dyn SecretProvider>,
    collaborator: Arc<dyn Collaborator>,
    remote: Arc<dyn RemoteTaskApi>,
    events: Option<ProgressSender>,
}

impl PipelineRunner {
    /// Build a runner, validating the pipeline's job graph
    pub fn new(
        pipeline: Pipeline,
        secrets: Arc<dyn SecretProvider>,
        collaborator: Arc<dyn Collaborator>,
        remote: Arc<dyn RemoteTaskApi>,
    ) -> Result<Self, GraphError> {
        let graph = JobGraph::from_pipeline(&pipeline)?;
        Ok(Self {
            pipeline,
            graph,
            config: RunnerConfig::default(),
            secrets,
            collaborator,
            remote,
            events: None,
        })
    }

    /// Set runner configuration
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.events = Some(tx);
        self
    }

    /// The validated job graph
    pub fn graph(&self) -> &JobGraph {
        &self.graph
    }

    /// Execute one run for the given trigger
    pub async fn run(&self, trigger: RunTrigger) -> RunResult {
        let start = Instant::now();
        let pipeline_name = self.pipeline.name.clone();

        if !self.pipeline.trigger.allows(&trigger) {
            self.events.send_event(ExecutionEvent::run_skipped(
                &pipeline_name,
                &trigger.branch,
                format!("branch '{}' is not on the trigger allow-list", trigger.branch),
            ));
            return RunResult {
                pipeline_name,
                status: RunStatus::Skipped,
                instances: Vec::new(),
                duration: start.elapsed(),
            };
        }

        self.events.send_event(ExecutionEvent::run_started(
            &pipeline_name,
            &trigger.branch,
            trigger.event,
            self.graph.len(),
        ));

        let limiter = (self.config.max_parallel_instances > 0)
            .then(|| Arc::new(Semaphore::new(self.config.max_parallel_instances)));
        let executor = StepExecutor::new(
            &pipeline_name,
            self.config.clone(),
            Arc::clone(&self.secrets),
            Arc::clone(&self.collaborator),
            Arc::clone(&self.remote),
            self.events.clone(),
        );

        let mut job_statuses: HashMap<String, JobStatus> = HashMap::new();
        let mut instances: Vec<JobInstanceResult> = Vec::new();

        for tier in self.graph.tiers() {
            let mut join_set: JoinSet<JobInstanceResult> = JoinSet::new();
            let mut dispatched: Vec<String> = Vec::new();

            for node in tier {
                let job_name = node.job.name.clone();

                if !dependencies_succeeded(&job_statuses, &node.dependencies) {
                    // Skipped cascade: dependents of a failure never start
                    for instance in MatrixExpander::expand(&node.job) {
                        self.events.send_event(ExecutionEvent::job_skipped(
                            &job_name,
                            instance.environment.clone(),
                            "dependencies did not succeed",
                        ));
                        instances.push(JobInstanceResult {
                            job_name: job_name.clone(),
                            environment: instance.environment,
                            status: JobStatus::Skipped,
                            steps: Vec::new(),
                            diagnostics: None,
                            duration: std::time::Duration::ZERO,
                        });
                    }
                    job_statuses.insert(job_name, JobStatus::Skipped);
                    continue;
                }

                dispatched.push(job_name);
                for instance in MatrixExpander::expand(&node.job) {
                    let executor = executor.clone();
                    let limiter = limiter.clone();
                    join_set.spawn(async move {
                        let _permit = match limiter {
                            Some(l) => l.acquire_owned().await.ok(),
                            None => None,
                        };
                        executor.execute_instance(instance).await
                    });
                }
            }

            // Tier barrier: dependents never observe a partially completed
            // dependency.
            let mut tier_results: Vec<JobInstanceResult> = Vec::new();
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(result) => tier_results.push(result),
                    Err(e) => {
                        self.events.send_event(ExecutionEvent::error(
                            format!("job instance task failed to join: {}", e),
                            None,
                            None,
                        ));
                    }
                }
            }

            // One idempotent terminal status per job, recorded by the runner
            for job_name in dispatched {
                let failed = tier_results
                    .iter()
                    .filter(|r| r.job_name == job_name)
                    .any(|r| r.status == JobStatus::Failed);
                job_statuses.insert(
                    job_name,
                    if failed {
                        JobStatus::Failed
                    } else {
                        JobStatus::Succeeded
                    },
                );
            }
            instances.extend(tier_results);
        }

        let status = if instances.iter().all(|i| i.status == JobStatus::Succeeded) {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };
        let duration = start.elapsed();

        self.events.send_event(ExecutionEvent::run_completed(
            &pipeline_name,
            status,
            duration,
        ));

        RunResult {
            pipeline_name,
            status,
            instances,
            duration,
        }
    }
}

/// All listed dependencies reached Succeeded
fn dependencies_succeeded(statuses: &HashMap<String, JobStatus>, deps: &[String]) -> bool {
    deps.iter()
        .all(|dep| statuses.get(dep) == Some(&JobStatus::Succeeded))
}
