// Execution Engine Module
// DAG construction, matrix expansion, instance context, and orchestration

pub mod context;
pub mod events;
pub mod executor;
pub mod graph;
pub mod matrix;

// Re-export key types
pub use context::InstanceContext;
pub use events::{progress_channel, EventSender, ExecutionEvent, ProgressReceiver, ProgressSender};
pub use executor::{PipelineRunner, StepExecutor};
pub use graph::{GraphError, GraphErrorKind, JobGraph, JobNode};
pub use matrix::{JobInstance, MatrixExpander};
