// End-to-end runs of a three-job delivery pipeline against scripted
// collaborators: scan -> security -> deploy fanned out over dev/uat/prod,
// with a launch-and-await database migration per environment.

use pipeline_engine::{
    progress_channel, BuildSpec, CollaboratorCall, Condition, DeploySpec, EventKind,
    ExecutionEvent, Job, JobStatus, NetworkConfig, Pipeline, PipelineRunner, PushSpec, RunStatus,
    RunTrigger, ScanSpec, ScriptedCollaborator, ScriptedRemoteTasks, StaticSecrets, Step,
    TaskLaunchSpec, TaskScript, TaskWaitSpec, TestSpec, TriggerFilter,
};

use std::sync::Arc;
use std::time::Duration;

const ENVIRONMENTS: [&str; 3] = ["dev", "uat", "prod"];

fn cluster_for(environment: &str) -> String {
    format!("apps-{}", environment)
}

fn migration_launch(environment: &str) -> Step {
    Step::new(
        format!("launch-migrations-{}", environment),
        CollaboratorCall::RunRemoteTask(TaskLaunchSpec {
            cluster: cluster_for(environment),
            task_definition: "api-migrate".to_string(),
            network: NetworkConfig {
                subnets: vec!["subnet-a".to_string(), "subnet-b".to_string()],
                security_groups: vec!["sg-apps".to_string()],
                assign_public_ip: false,
            },
            command_override: vec!["migrate".to_string(), "up".to_string()],
        }),
    )
    .when(Condition::EnvironmentIs(environment.into()))
}

/// The pipeline under test: scan, security (depends on scan), deploy
/// (depends on both, matrix over three environments).
fn delivery_pipeline() -> Pipeline {
    let mut deploy = Job::new("deploy")
        .depends_on(["scan", "security"])
        .matrix(ENVIRONMENTS)
        .secret("db-url")
        .step(Step::new(
            "deploy-service",
            CollaboratorCall::DeployService(DeploySpec {
                cluster: "apps".to_string(),
                service: "api".to_string(),
            }),
        ));
    for environment in ENVIRONMENTS {
        deploy = deploy.step(migration_launch(environment));
    }
    deploy = deploy.step(Step::new(
        "await-migrations",
        CollaboratorCall::WaitForRemoteTask(TaskWaitSpec {
            poll_interval: Some(Duration::from_millis(100)),
            max_wait: Some(Duration::from_secs(30)),
        }),
    ));

    Pipeline::new("delivery", TriggerFilter::branches(["main", "dev", "uat"]))
        .job(
            Job::new("scan")
                .step(Step::new(
                    "scan-code",
                    CollaboratorCall::ScanCode(ScanSpec {
                        target: "HEAD".to_string(),
                    }),
                ))
                .step(Step::new(
                    "scan-dependencies",
                    CollaboratorCall::ScanDependencies(ScanSpec {
                        target: "HEAD".to_string(),
                    }),
                )),
        )
        .job(
            Job::new("security")
                .depends_on(["scan"])
                .secret("registry-token")
                .step(Step::new(
                    "scan-infra",
                    CollaboratorCall::ScanInfra(ScanSpec {
                        target: "infra/".to_string(),
                    }),
                ))
                .step(Step::new(
                    "unit-tests",
                    CollaboratorCall::RunTests(TestSpec {
                        target: "HEAD".to_string(),
                    }),
                ))
                .step(Step::new(
                    "build-image",
                    CollaboratorCall::BuildImage(BuildSpec {
                        context_dir: ".".to_string(),
                        tag: "api:latest".to_string(),
                    }),
                ))
                .step(Step::new(
                    "push-image",
                    CollaboratorCall::PushImage(PushSpec {
                        image: "api:latest".to_string(),
                        registry: "registry.example.com".to_string(),
                    }),
                )),
        )
        .job(deploy)
}

fn delivery_secrets() -> StaticSecrets {
    let mut secrets = StaticSecrets::new().with_secret("registry-token", "tok-registry");
    for environment in ENVIRONMENTS {
        secrets = secrets.with_scoped_secret(
            environment,
            "db-url",
            format!("postgres://{}/api", environment),
        );
    }
    secrets
}

fn runner(tasks: ScriptedRemoteTasks) -> PipelineRunner {
    PipelineRunner::new(
        delivery_pipeline(),
        Arc::new(delivery_secrets()),
        Arc::new(ScriptedCollaborator::new()),
        Arc::new(tasks),
    )
    .unwrap()
}

fn instance_status(result: &pipeline_engine::RunResult, job: &str, env: Option<&str>) -> JobStatus {
    result
        .instances
        .iter()
        .find(|i| {
            i.job_name == job
                && i.environment.as_ref().map(|e| e.as_str()) == env
        })
        .unwrap_or_else(|| panic!("no instance for {} {:?}", job, env))
        .status
}

#[tokio::test(start_paused = true)]
async fn uat_migration_failure_fails_the_run_but_not_its_siblings() {
    // dev and prod migrations stop cleanly; uat's exits 1
    let tasks = ScriptedRemoteTasks::new()
        .with_script(
            cluster_for("dev"),
            TaskScript::Stops {
                polls_until_stopped: 2,
                exit_code: 0,
            },
        )
        .with_script(
            cluster_for("uat"),
            TaskScript::Stops {
                polls_until_stopped: 2,
                exit_code: 1,
            },
        )
        .with_script(
            cluster_for("prod"),
            TaskScript::Stops {
                polls_until_stopped: 3,
                exit_code: 0,
            },
        );
    let runner = runner(tasks);

    let result = runner.run(RunTrigger::new("dev", EventKind::Push)).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.exit_code(), 1);
    assert_eq!(result.instances.len(), 5);

    assert_eq!(instance_status(&result, "scan", None), JobStatus::Succeeded);
    assert_eq!(
        instance_status(&result, "security", None),
        JobStatus::Succeeded
    );
    assert_eq!(
        instance_status(&result, "deploy", Some("dev")),
        JobStatus::Succeeded
    );
    assert_eq!(
        instance_status(&result, "deploy", Some("uat")),
        JobStatus::Failed
    );
    assert_eq!(
        instance_status(&result, "deploy", Some("prod")),
        JobStatus::Succeeded
    );

    // The failing instance names the migration exit in its diagnostics
    let (failing, failed_step) = result.first_failure().unwrap();
    assert_eq!(failing.label(), "deploy[uat]");
    let failed_step = failed_step.unwrap();
    assert_eq!(failed_step.step_name, "await-migrations");
    assert_eq!(failed_step.exit_code, Some(1));
    assert!(failed_step
        .diagnostics
        .as_deref()
        .unwrap()
        .contains("exited with code 1"));
}

#[tokio::test(start_paused = true)]
async fn clean_run_succeeds_and_launches_one_migration_per_environment() {
    let tasks = ScriptedRemoteTasks::new();
    let runner = runner(tasks);

    let result = runner.run(RunTrigger::new("main", EventKind::Push)).await;

    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(result.exit_code(), 0);
    assert_eq!(result.instances.len(), 5);
    assert!(result.instances.iter().all(|i| i.status == JobStatus::Succeeded));

    // In every deploy instance exactly one launch step ran; the other two
    // were condition-skipped
    for environment in ENVIRONMENTS {
        let instance = result
            .instances
            .iter()
            .find(|i| i.environment.as_ref().map(|e| e.as_str()) == Some(environment))
            .unwrap();
        let ran: Vec<_> = instance
            .steps
            .iter()
            .filter(|s| {
                s.step_name.starts_with("launch-migrations")
                    && s.status == pipeline_engine::StepStatus::Succeeded
            })
            .collect();
        assert_eq!(ran.len(), 1);
        assert_eq!(
            ran[0].step_name,
            format!("launch-migrations-{}", environment)
        );
    }
}

#[tokio::test]
async fn disallowed_branch_creates_no_instances() {
    let runner = runner(ScriptedRemoteTasks::new());

    let result = runner
        .run(RunTrigger::new("feature/x", EventKind::Push))
        .await;

    assert_eq!(result.status, RunStatus::Skipped);
    assert!(result.instances.is_empty());
    assert_ne!(result.exit_code(), 0);
}

#[tokio::test(start_paused = true)]
async fn rejected_launch_fails_only_its_environment() {
    let tasks = ScriptedRemoteTasks::new().with_script(
        cluster_for("prod"),
        TaskScript::RejectLaunch("quota exceeded".to_string()),
    );
    let runner = runner(tasks);

    let result = runner.run(RunTrigger::new("uat", EventKind::Push)).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(
        instance_status(&result, "deploy", Some("dev")),
        JobStatus::Succeeded
    );
    assert_eq!(
        instance_status(&result, "deploy", Some("uat")),
        JobStatus::Succeeded
    );
    assert_eq!(
        instance_status(&result, "deploy", Some("prod")),
        JobStatus::Failed
    );

    let prod = result
        .instances
        .iter()
        .find(|i| i.environment.as_ref().map(|e| e.as_str()) == Some("prod"))
        .unwrap();
    assert!(prod
        .diagnostics
        .as_deref()
        .unwrap()
        .contains("quota exceeded"));
    // Fail-fast: the await step after the rejected launch never ran
    let await_step = prod
        .steps
        .iter()
        .find(|s| s.step_name == "await-migrations")
        .unwrap();
    assert_eq!(await_step.status, pipeline_engine::StepStatus::Skipped);
}

#[tokio::test(start_paused = true)]
async fn migration_timeout_fails_the_instance() {
    let tasks =
        ScriptedRemoteTasks::new().with_script(cluster_for("uat"), TaskScript::NeverStops);
    let runner = runner(tasks);

    let result = runner.run(RunTrigger::new("uat", EventKind::Push)).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(
        instance_status(&result, "deploy", Some("uat")),
        JobStatus::Failed
    );
    let uat = result
        .instances
        .iter()
        .find(|i| i.environment.as_ref().map(|e| e.as_str()) == Some("uat"))
        .unwrap();
    assert!(uat.diagnostics.as_deref().unwrap().contains("did not stop"));
}

#[tokio::test(start_paused = true)]
async fn events_narrate_the_run() {
    let (tx, mut rx) = progress_channel();
    let runner = PipelineRunner::new(
        delivery_pipeline(),
        Arc::new(delivery_secrets()),
        Arc::new(ScriptedCollaborator::new()),
        Arc::new(ScriptedRemoteTasks::new()),
    )
    .unwrap()
    .with_progress(tx);

    let result = runner.run(RunTrigger::new("dev", EventKind::Push)).await;
    assert_eq!(result.status, RunStatus::Succeeded);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert!(matches!(events.first(), Some(ExecutionEvent::RunStarted { .. })));
    assert!(matches!(
        events.last(),
        Some(ExecutionEvent::RunCompleted {
            status: RunStatus::Succeeded,
            ..
        })
    ));

    let launched = events
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::TaskLaunched { .. }))
        .count();
    let stopped = events
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::TaskStopped { .. }))
        .count();
    assert_eq!(launched, 3);
    assert_eq!(stopped, 3);

    // No event ever carries secret material
    for event in &events {
        let rendered = format!("{:?}", event);
        assert!(!rendered.contains("postgres://"));
        assert!(!rendered.contains("tok-registry"));
    }
}

#[tokio::test]
async fn scoped_db_secret_is_required_per_environment() {
    // Remove uat's scoped secret: its deploy instance must fail before any
    // side effects, while dev and prod proceed
    let mut secrets = StaticSecrets::new().with_secret("registry-token", "tok-registry");
    for environment in ["dev", "prod"] {
        secrets = secrets.with_scoped_secret(environment, "db-url", "postgres://x");
    }

    let collaborator = Arc::new(ScriptedCollaborator::new());
    let runner = PipelineRunner::new(
        delivery_pipeline(),
        Arc::new(secrets),
        Arc::clone(&collaborator) as Arc<dyn pipeline_engine::Collaborator>,
        Arc::new(ScriptedRemoteTasks::new()),
    )
    .unwrap();

    let result = runner.run(RunTrigger::new("dev", EventKind::Push)).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(
        instance_status(&result, "deploy", Some("uat")),
        JobStatus::Failed
    );
    assert_eq!(
        instance_status(&result, "deploy", Some("dev")),
        JobStatus::Succeeded
    );

    // uat's deploy-service call never happened
    let uat_calls = collaborator
        .invocations()
        .await
        .into_iter()
        .filter(|r| r.environment.as_ref().map(|e| e.as_str()) == Some("uat"))
        .count();
    assert_eq!(uat_calls, 0);
}
