use crate::delivery;
use crate::output;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, ValueEnum};
use color_eyre::Result;

use pipeline_engine::{
    progress_channel, CallKind, Environment, EventKind, ExecutionEvent, JobStatus, PipelineRunner,
    RunStatus, RunTrigger, RunnerConfig, ScriptedCollaborator, ScriptedRemoteTasks, StepStatus,
    TaskScript,
};

/// Execute a simulated delivery run
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Branch the trigger event occurred on
    #[arg(long, short = 'b', default_value = "dev")]
    pub branch: String,

    /// Trigger event kind
    #[arg(long, value_enum, default_value_t = TriggerEvent::Push)]
    pub event: TriggerEvent,

    /// Fail a collaborator call kind everywhere (can be repeated,
    /// e.g. --fail scan_code)
    #[arg(long = "fail", value_name = "CALL")]
    pub fail: Vec<String>,

    /// Exit code for an environment's migration task (can be repeated,
    /// format: env=code)
    #[arg(long = "migration-exit", value_name = "ENV=CODE")]
    pub migration_exit: Vec<String>,

    /// Make an environment's migration task never stop (can be repeated)
    #[arg(long = "migration-hangs", value_name = "ENV")]
    pub migration_hangs: Vec<String>,

    /// Runner configuration YAML file
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TriggerEvent {
    Push,
    PullRequest,
}

impl From<TriggerEvent> for EventKind {
    fn from(event: TriggerEvent) -> Self {
        match event {
            TriggerEvent::Push => EventKind::Push,
            TriggerEvent::PullRequest => EventKind::PullRequest,
        }
    }
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => RunnerConfig::from_file(path)
            .map_err(|e| color_eyre::eyre::eyre!("config error: {}", e))?,
        // Simulated runs poll fast and give up quickly
        None => RunnerConfig {
            poll_interval_secs: 1,
            max_task_wait_secs: 30,
            ..RunnerConfig::default()
        },
    };

    // Scripted collaborator, with failures injected from --fail flags
    let mut collaborator = ScriptedCollaborator::new();
    for name in &args.fail {
        let kind = parse_call_kind(name)?;
        collaborator = collaborator.with_failure(kind, format!("injected failure for {}", kind));
    }

    // Scripted remote tasks: default clean migrations, overridden per flag
    let mut tasks = ScriptedRemoteTasks::new();
    for entry in &args.migration_exit {
        let (environment, code) = entry.split_once('=').ok_or_else(|| {
            color_eyre::eyre::eyre!("invalid --migration-exit '{}'. Expected env=code", entry)
        })?;
        let exit_code: i32 = code
            .parse()
            .map_err(|_| color_eyre::eyre::eyre!("invalid exit code '{}'", code))?;
        tasks = tasks.with_script(
            delivery::cluster_for(environment),
            TaskScript::Stops {
                polls_until_stopped: 2,
                exit_code,
            },
        );
    }
    for environment in &args.migration_hangs {
        tasks = tasks.with_script(delivery::cluster_for(environment), TaskScript::NeverStops);
    }

    let (tx, mut rx) = progress_channel();
    let runner = PipelineRunner::new(
        delivery::pipeline(),
        Arc::new(delivery::secrets()),
        Arc::new(collaborator),
        Arc::new(tasks),
    )
    .map_err(|e| color_eyre::eyre::eyre!("invalid pipeline: {}", e))?
    .with_config(config)
    .with_progress(tx);

    let trigger = RunTrigger::new(args.branch.clone(), args.event.into());
    let exec_handle = tokio::spawn(async move { runner.run(trigger).await });

    // Render events in the foreground while the run executes
    while let Some(event) = rx.recv().await {
        render_event(&event);
    }

    let result = exec_handle.await?;

    if let Some((instance, step)) = result.first_failure() {
        let detail = instance
            .diagnostics
            .as_deref()
            .unwrap_or("no diagnostics recorded");
        match step {
            Some(step) => output::failure(&format!(
                "first failure: {} step '{}': {}",
                instance.label(),
                step.step_name,
                detail
            )),
            None => output::failure(&format!("first failure: {}: {}", instance.label(), detail)),
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result.summary())?);
    }

    if result.exit_code() != 0 {
        std::process::exit(result.exit_code());
    }

    Ok(())
}

fn parse_call_kind(name: &str) -> Result<CallKind> {
    let kind = match name {
        "scan_code" => CallKind::ScanCode,
        "scan_dependencies" => CallKind::ScanDependencies,
        "scan_infra" => CallKind::ScanInfra,
        "run_tests" => CallKind::RunTests,
        "build_image" => CallKind::BuildImage,
        "push_image" => CallKind::PushImage,
        "deploy_service" => CallKind::DeployService,
        _ => color_eyre::eyre::bail!(
            "unknown call kind '{}'. Expected one of: scan_code, scan_dependencies, \
             scan_infra, run_tests, build_image, push_image, deploy_service",
            name
        ),
    };
    Ok(kind)
}

fn label(job_name: &str, environment: &Option<Environment>) -> String {
    match environment {
        Some(env) => format!("{}[{}]", job_name, env),
        None => job_name.to_string(),
    }
}

fn render_event(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::RunStarted {
            pipeline_name,
            branch,
            event,
            total_jobs,
        } => {
            output::header(&format!(
                "Pipeline '{}' triggered by {} on '{}' ({} jobs)",
                pipeline_name, event, branch, total_jobs
            ));
        }

        ExecutionEvent::RunSkipped { branch, reason, .. } => {
            output::warning(&format!("run skipped for branch '{}': {}", branch, reason));
        }

        ExecutionEvent::RunCompleted {
            status, duration, ..
        } => {
            eprintln!();
            match status {
                RunStatus::Succeeded => output::success(&format!(
                    "Pipeline succeeded in {:.2}s",
                    duration.as_secs_f64()
                )),
                RunStatus::Failed => output::failure(&format!(
                    "Pipeline failed after {:.2}s",
                    duration.as_secs_f64()
                )),
                RunStatus::Skipped => output::warning("Pipeline skipped"),
            }
        }

        ExecutionEvent::JobStarted {
            job_name,
            environment,
            total_steps,
        } => {
            eprintln!(
                "    Job '{}' ({} steps)",
                label(job_name, environment),
                total_steps
            );
        }

        ExecutionEvent::JobCompleted {
            job_name,
            environment,
            status,
            duration,
        } => {
            let line = format!(
                "    Job '{}' {:?} ({:.2}s)",
                label(job_name, environment),
                status,
                duration.as_secs_f64()
            );
            if *status == JobStatus::Succeeded {
                output::dim_success(&line);
            } else {
                output::dim_failure(&line);
            }
        }

        ExecutionEvent::JobSkipped {
            job_name,
            environment,
            reason,
        } => {
            output::warning(&format!(
                "    Job '{}' skipped: {}",
                label(job_name, environment),
                reason
            ));
        }

        ExecutionEvent::StepStarted {
            step_name,
            step_index,
            ..
        } => {
            eprintln!("      [step {}] {}", step_index + 1, step_name);
        }

        ExecutionEvent::StepOutput { output, .. } => {
            for line in output.lines() {
                output::step_output(line);
            }
        }

        ExecutionEvent::StepCompleted {
            status,
            duration,
            exit_code,
            ..
        } => {
            let symbol = match status {
                StepStatus::Succeeded => "OK",
                StepStatus::Failed => "FAIL",
                StepStatus::Skipped => "SKIP",
                _ => "DONE",
            };
            let exit_info = match exit_code {
                Some(code) if *code != 0 => format!(" (exit code: {})", code),
                _ => String::new(),
            };
            let line = format!(
                "        {} ({:.2}s){}",
                symbol,
                duration.as_secs_f64(),
                exit_info
            );
            match status {
                StepStatus::Succeeded => output::dim_success(&line),
                StepStatus::Failed => output::dim_failure(&line),
                _ => output::dim(&line),
            }
        }

        ExecutionEvent::StepSkipped {
            step_name, reason, ..
        } => {
            output::dim(&format!("        SKIP {} ({})", step_name, reason));
        }

        ExecutionEvent::TaskLaunched {
            environment, arn, ..
        } => {
            output::info(&format!(
                "migration task launched for {}: {}",
                environment
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                arn
            ));
        }

        ExecutionEvent::TaskStopped { arn, exit_code, .. } => {
            output::info(&format!(
                "migration task stopped: {} (exit code: {})",
                arn,
                exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "unknown".to_string())
            ));
        }

        ExecutionEvent::Error {
            message,
            job_name,
            environment,
        } => match job_name {
            Some(job) => output::error(&format!(
                "{}: {}",
                label(job, environment),
                message
            )),
            None => output::error(message),
        },
    }
}
