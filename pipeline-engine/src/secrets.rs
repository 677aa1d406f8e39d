// Secret Provider
// Named secrets and per-environment variables, resolved at instance start

use crate::model::Environment;

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Secret material. The Debug representation is masked so secrets cannot
/// leak through logs, events, or panic messages.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The underlying material, for handing to a collaborator call
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretValue(***)")
    }
}

/// A secret could not be resolved for a job instance.
/// Fatal before any side-effecting step runs.
#[derive(Debug, Clone, Error)]
#[error("secret '{name}' could not be resolved: {reason}")]
pub struct SecretResolutionError {
    pub name: String,
    pub reason: String,
}

impl SecretResolutionError {
    pub fn not_found(name: impl Into<String>, scope: Option<&Environment>) -> Self {
        let reason = match scope {
            Some(env) => format!("not found in environment '{}' or globally", env),
            None => "not found".to_string(),
        };
        Self {
            name: name.into(),
            reason,
        }
    }

    pub fn denied(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Resolves named secrets and per-environment variables.
/// Read-only for the duration of a run and shared across concurrent
/// instances.
pub trait SecretProvider: Send + Sync {
    /// Resolve a named secret, preferring the environment scope when given
    fn resolve(
        &self,
        scope: Option<&Environment>,
        name: &str,
    ) -> Result<SecretValue, SecretResolutionError>;

    /// Plain (non-secret) variables for an environment
    fn variables(&self, _scope: Option<&Environment>) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// In-memory provider with global and environment-scoped entries.
/// Environment-scoped entries shadow global ones of the same name.
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    global: HashMap<String, SecretValue>,
    scoped: HashMap<Environment, HashMap<String, SecretValue>>,
    global_vars: HashMap<String, String>,
    scoped_vars: HashMap<Environment, HashMap<String, String>>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a globally visible secret
    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.global.insert(name.into(), SecretValue::new(value));
        self
    }

    /// Add a secret visible only to instances bound to the given environment
    pub fn with_scoped_secret(
        mut self,
        environment: impl Into<Environment>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.scoped
            .entry(environment.into())
            .or_default()
            .insert(name.into(), SecretValue::new(value));
        self
    }

    /// Add a globally visible plain variable
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.global_vars.insert(name.into(), value.into());
        self
    }

    /// Add a plain variable scoped to an environment
    pub fn with_scoped_variable(
        mut self,
        environment: impl Into<Environment>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.scoped_vars
            .entry(environment.into())
            .or_default()
            .insert(name.into(), value.into());
        self
    }
}

impl SecretProvider for StaticSecrets {
    fn resolve(
        &self,
        scope: Option<&Environment>,
        name: &str,
    ) -> Result<SecretValue, SecretResolutionError> {
        if let Some(env) = scope {
            if let Some(value) = self.scoped.get(env).and_then(|m| m.get(name)) {
                return Ok(value.clone());
            }
        }
        self.global
            .get(name)
            .cloned()
            .ok_or_else(|| SecretResolutionError::not_found(name, scope))
    }

    fn variables(&self, scope: Option<&Environment>) -> HashMap<String, String> {
        let mut vars = self.global_vars.clone();
        if let Some(env) = scope {
            if let Some(scoped) = self.scoped_vars.get(env) {
                for (k, v) in scoped {
                    vars.insert(k.clone(), v.clone());
                }
            }
        }
        vars
    }
}
