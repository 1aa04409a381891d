//! tekq webhook: the PipelineRun defaulter run on every admission call.
//!
//! Each call takes one snapshot of the store and uses it throughout, so a
//! concurrent reload never splits a request across two policies.

#![forbid(unsafe_code)]

pub mod mutate;

use std::sync::Arc;

use metrics::counter;
use serde::Deserialize;
use serde_json::Value as Json;
use tekq_core::pipelinerun::is_pipeline_run;
use tekq_core::{EvalError, PipelineRun, MANAGED_BY_MULTIKUEUE, QUEUE_LABEL, SPEC_STATUS_PENDING};
use tekq_store::ConfigStore;
use tracing::{debug, warn};

pub use mutate::{load_store, mutate_pipeline_run};

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    /// The object itself is unacceptable.
    #[error("{0}")]
    BadInput(String),
    #[error(transparent)]
    EvalFailed(#[from] EvalError),
    #[error("no defaulting policy is loaded")]
    Unavailable,
}

impl AdmissionError {
    /// HTTP status an admission response should carry.
    pub fn status_code(&self) -> u16 {
        match self {
            AdmissionError::BadInput(_) => 400,
            AdmissionError::EvalFailed(_) => 500,
            AdmissionError::Unavailable => 503,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            AdmissionError::BadInput(_) => "bad_input",
            AdmissionError::EvalFailed(_) => "eval_failed",
            AdmissionError::Unavailable => "unavailable",
        }
    }
}

#[derive(Clone)]
pub struct Defaulter {
    store: Arc<ConfigStore>,
}

impl Defaulter {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }

    /// Default `plr` in place. On `EvalFailed` the object keeps every change
    /// made before the failing expression.
    pub fn default(&self, plr: &mut PipelineRun) -> Result<(), AdmissionError> {
        let res = self.apply(plr);
        if let Err(e) = &res {
            counter!("tekq_admission_errors_total", 1u64, "reason" => e.reason());
            warn!(
                name = plr.metadata.name.as_deref().unwrap_or(""),
                namespace = plr.metadata.namespace.as_deref().unwrap_or(""),
                error = %e,
                "defaulting failed"
            );
        }
        res
    }

    /// Kind check and decode for a raw admission object, then [`Defaulter::default`].
    pub fn default_document(&self, doc: &Json) -> Result<PipelineRun, AdmissionError> {
        let api_version = doc.get("apiVersion").and_then(Json::as_str).unwrap_or_default();
        let kind = doc.get("kind").and_then(Json::as_str).unwrap_or_default();
        if !is_pipeline_run(api_version, kind) {
            let err = AdmissionError::BadInput(format!(
                "expected a PipelineRun object but got kind {kind:?} in {api_version:?}"
            ));
            counter!("tekq_admission_errors_total", 1u64, "reason" => err.reason());
            return Err(err);
        }
        let mut plr = PipelineRun::deserialize(doc).map_err(|e| {
            counter!("tekq_admission_errors_total", 1u64, "reason" => "bad_input");
            AdmissionError::BadInput(format!("failed to serialize pipelinerun: {e}"))
        })?;
        self.default(&mut plr)?;
        Ok(plr)
    }

    fn apply(&self, plr: &mut PipelineRun) -> Result<(), AdmissionError> {
        plr.validate_shape().map_err(|e| AdmissionError::BadInput(e.to_string()))?;
        let generation = self.store.snapshot().ok_or(AdmissionError::Unavailable)?;
        let config = &generation.config;

        plr.labels_mut()
            .entry(QUEUE_LABEL.to_string())
            .or_insert_with(|| config.queue_name.clone());

        // runs that already carry a status are left for their owner
        if plr.spec.status.is_empty() {
            if !config.is_multi_kueue {
                plr.spec.status = SPEC_STATUS_PENDING.to_string();
                if config.multi_kueue_override && plr.spec.managed_by.is_none() {
                    plr.spec.managed_by = Some(MANAGED_BY_MULTIKUEUE.to_string());
                }
            } else if plr.spec.managed_by.is_none() {
                plr.spec.managed_by = Some(MANAGED_BY_MULTIKUEUE.to_string());
            }
        }

        for mutator in &generation.mutators {
            mutator.mutate(plr)?;
        }
        debug!(
            name = plr.metadata.name.as_deref().unwrap_or(""),
            namespace = plr.metadata.namespace.as_deref().unwrap_or(""),
            mutators = generation.mutators.len(),
            "defaulted pipelinerun"
        );
        Ok(())
    }
}
