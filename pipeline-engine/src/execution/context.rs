// Instance Context
// Immutable per-instance view of variables and resolved secrets

use crate::model::{Condition, Environment, Job};
use crate::secrets::{SecretProvider, SecretResolutionError, SecretValue};

use std::collections::HashMap;

/// Context for one job instance. Built once at instance start, before any
/// side-effecting step runs, and immutable for the instance's lifetime.
/// Secrets are dropped with the context, never archived.
#[derive(Debug, Clone)]
pub struct InstanceContext {
    pipeline_name: String,
    job_name: String,
    environment: Option<Environment>,
    variables: HashMap<String, String>,
    secrets: HashMap<String, SecretValue>,
}

impl InstanceContext {
    /// Resolve every secret the job declares, plus the environment's
    /// variables. A missing secret fails the instance here, before any
    /// collaborator is invoked.
    pub fn resolve(
        provider: &dyn SecretProvider,
        pipeline_name: &str,
        job: &Job,
        environment: Option<Environment>,
    ) -> Result<Self, SecretResolutionError> {
        let mut secrets = HashMap::new();
        for name in &job.secrets {
            let value = provider.resolve(environment.as_ref(), name)?;
            secrets.insert(name.clone(), value);
        }

        Ok(Self {
            pipeline_name: pipeline_name.to_string(),
            job_name: job.name.clone(),
            variables: provider.variables(environment.as_ref()),
            environment,
            secrets,
        })
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// The instance's environment binding, if any
    pub fn environment(&self) -> Option<&Environment> {
        self.environment.as_ref()
    }

    /// Look up a plain variable
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Look up a resolved secret
    pub fn secret(&self, name: &str) -> Option<&SecretValue> {
        self.secrets.get(name)
    }

    /// Evaluate a step condition against this context
    pub fn evaluate(&self, condition: &Condition) -> bool {
        condition.evaluate(self.environment.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::StaticSecrets;

    #[test]
    fn test_resolves_declared_secrets_per_environment() {
        let provider = StaticSecrets::new()
            .with_secret("registry-token", "tok-global")
            .with_scoped_secret("prod", "db-url", "postgres://prod")
            .with_scoped_secret("dev", "db-url", "postgres://dev")
            .with_scoped_variable("prod", "replicas", "3");

        let job = Job::new("deploy").secret("registry-token").secret("db-url");

        let ctx = InstanceContext::resolve(&provider, "delivery", &job, Some("prod".into()))
            .unwrap();

        assert_eq!(ctx.job_name(), "deploy");
        assert_eq!(ctx.environment().unwrap().as_str(), "prod");
        assert_eq!(ctx.secret("registry-token").unwrap().expose(), "tok-global");
        assert_eq!(ctx.secret("db-url").unwrap().expose(), "postgres://prod");
        assert_eq!(ctx.variable("replicas"), Some("3"));
    }

    #[test]
    fn test_missing_secret_fails_resolution() {
        let provider = StaticSecrets::new().with_scoped_secret("prod", "db-url", "x");
        let job = Job::new("deploy").secret("db-url");

        // uat has no scoped entry and there is no global fallback
        let err =
            InstanceContext::resolve(&provider, "delivery", &job, Some("uat".into())).unwrap_err();
        assert_eq!(err.name, "db-url");
    }

    #[test]
    fn test_condition_evaluation_uses_binding() {
        let provider = StaticSecrets::new();
        let job = Job::new("deploy");

        let prod = InstanceContext::resolve(&provider, "delivery", &job, Some("prod".into()))
            .unwrap();
        let unbound = InstanceContext::resolve(&provider, "delivery", &job, None).unwrap();

        let cond = Condition::EnvironmentIs("prod".into());
        assert!(prod.evaluate(&cond));
        assert!(!unbound.evaluate(&cond));
    }

    #[test]
    fn test_debug_output_masks_secrets() {
        let provider = StaticSecrets::new().with_secret("token", "s3cr3t");
        let job = Job::new("scan").secret("token");

        let ctx = InstanceContext::resolve(&provider, "delivery", &job, None).unwrap();
        let formatted = format!("{:?}", ctx);
        assert!(!formatted.contains("s3cr3t"));
    }
}
