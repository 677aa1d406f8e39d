// Built-in delivery pipeline
// Scan -> security -> deploy over dev/uat/prod, with a one-shot migration
// task launched and awaited per environment

use pipeline_engine::{
    BuildSpec, CollaboratorCall, Condition, DeploySpec, Job, NetworkConfig, Pipeline, PushSpec,
    ScanSpec, StaticSecrets, Step, TaskLaunchSpec, TaskWaitSpec, TestSpec, TriggerFilter,
};

pub const ENVIRONMENTS: [&str; 3] = ["dev", "uat", "prod"];

/// Cluster a given environment's one-shot tasks launch into
pub fn cluster_for(environment: &str) -> String {
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

/// The three-job delivery pipeline
pub fn pipeline() -> Pipeline {
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
        CollaboratorCall::WaitForRemoteTask(TaskWaitSpec::default()),
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

/// Simulated secret store: a global registry token plus a database URL
/// scoped to each environment
pub fn secrets() -> StaticSecrets {
    let mut secrets = StaticSecrets::new().with_secret("registry-token", "tok-registry");
    for environment in ENVIRONMENTS {
        secrets = secrets.with_scoped_secret(
            environment,
            "db-url",
            format!("postgres://{}.db.internal/api", environment),
        );
    }
    secrets
}
