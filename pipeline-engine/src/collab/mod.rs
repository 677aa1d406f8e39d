// Collaborator Boundary
// The seam between the engine and the external tools it sequences

pub mod scripted;

// Re-export key types
pub use scripted::{ScriptedCollaborator, ScriptedRemoteTasks, TaskScript};

use crate::execution::context::InstanceContext;
use crate::model::CollaboratorCall;

/// Everything a collaborator reports back to the engine
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub success: bool,
    /// Raw output (report artifact, build log, ...)
    pub output: Vec<u8>,
    /// Human-readable diagnostics, surfaced on failure
    pub diagnostics: String,
}

impl CallOutcome {
    pub fn succeeded(output: impl Into<Vec<u8>>) -> Self {
        Self {
            success: true,
            output: output.into(),
            diagnostics: String::new(),
        }
    }

    pub fn failed(diagnostics: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Vec::new(),
            diagnostics: diagnostics.into(),
        }
    }
}

/// External implementation of scan/test/build/push/deploy operations.
/// The engine invokes it with resolved inputs (the instance context carries
/// the merged variables and secrets) and reacts only to the reported outcome.
/// Retry policy, if any, belongs to the implementation, never to the engine.
#[async_trait::async_trait]
pub trait Collaborator: Send + Sync {
    async fn invoke(&self, call: &CollaboratorCall, ctx: &InstanceContext) -> CallOutcome;
}
