//! tekq core types: the PipelineRun object model, the policy document and the
//! mutator capability shared by the compiler, store and defaulter crates.

#![forbid(unsafe_code)]

pub mod config;
pub mod pipelinerun;

pub use config::{CelConfig, Config, ConfigError};
pub use pipelinerun::{Param, PipelineRef, PipelineRun, PipelineRunSpec, ShapeError};

/// Label carrying the Kueue LocalQueue a PipelineRun is submitted to.
pub const QUEUE_LABEL: &str = "kueue.x-k8s.io/queue-name";
/// Label carrying the Kueue WorkloadPriorityClass; written by `priority(...)`.
pub const PRIORITY_LABEL: &str = "kueue.x-k8s.io/priority-class";
/// `spec.managedBy` value handing a PipelineRun over to MultiKueue.
pub const MANAGED_BY_MULTIKUEUE: &str = "kueue.x-k8s.io/multikueue";
/// Tekton's `PipelineRunSpecStatusPending`.
pub const SPEC_STATUS_PENDING: &str = "PipelineRunPending";

/// Failure raised while a mutator evaluates one expression against one object.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to evaluate expression {expression:?}: {cause}")]
pub struct EvalError {
    pub expression: String,
    pub cause: String,
}

/// A unit of policy applied to a PipelineRun in place.
///
/// Implementations are immutable once built and shared across admission calls.
pub trait PipelineRunMutator: Send + Sync + std::fmt::Debug {
    fn mutate(&self, plr: &mut PipelineRun) -> Result<(), EvalError>;
}
