//! tekq store: the active policy generation, swapped atomically on reload.
//!
//! Readers load the current `Arc<Generation>` lock-free and keep it for the
//! whole admission call. A reload builds the next generation off to the side
//! and publishes it with a single pointer swap; any failure leaves the
//! previous generation serving.

#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwapOption;
use metrics::counter;
use tekq_cel::CompileError;
use tekq_core::{Config, ConfigError, PipelineRunMutator};
use tracing::{debug, info, warn};

/// One published `(config, mutators)` pair. Immutable once built.
#[derive(Debug)]
pub struct Generation {
    pub config: Config,
    pub mutators: Vec<Arc<dyn PipelineRunMutator>>,
}

impl Generation {
    /// Validate `config` and compile its expressions.
    pub fn build(config: Config) -> Result<Self, UpdateError> {
        config.validate().map_err(UpdateError::Invalid)?;
        let mut mutators: Vec<Arc<dyn PipelineRunMutator>> = Vec::new();
        if !config.expressions().is_empty() {
            mutators.push(Arc::new(tekq_cel::compile(config.expressions())?));
        }
        Ok(Self { config, mutators })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error(transparent)]
    ParseFailed(ConfigError),
    #[error("invalid config: {0}")]
    Invalid(ConfigError),
    #[error(transparent)]
    CompileFailed(#[from] CompileError),
}

/// Receives exactly one call per `update` outcome.
pub trait ReloadRecorder: Send + Sync {
    fn reload_succeeded(&self);
    fn reload_failed(&self);
}

/// Records reloads as `tekq_config_reload_total{result="success"|"failure"}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl ReloadRecorder for MetricsRecorder {
    fn reload_succeeded(&self) {
        counter!("tekq_config_reload_total", 1u64, "result" => "success");
    }

    fn reload_failed(&self) {
        counter!("tekq_config_reload_total", 1u64, "result" => "failure");
    }
}

pub struct ConfigStore {
    current: ArcSwapOption<Generation>,
    reload: Mutex<()>,
    recorder: Box<dyn ReloadRecorder>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    /// Empty store; `snapshot` returns `None` until the first good update.
    pub fn new() -> Self {
        Self::with_recorder(MetricsRecorder)
    }

    pub fn with_recorder(recorder: impl ReloadRecorder + 'static) -> Self {
        Self { current: ArcSwapOption::empty(), reload: Mutex::new(()), recorder: Box::new(recorder) }
    }

    /// The current generation. Two calls may observe different generations;
    /// one call always returns a consistent pair.
    pub fn snapshot(&self) -> Option<Arc<Generation>> {
        self.current.load_full()
    }

    /// Parse, validate and compile `raw`, then publish it. Reloads are
    /// serialized; readers are never blocked.
    pub fn update(&self, raw: &[u8]) -> Result<(), UpdateError> {
        let _reload = self.reload.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(bytes = raw.len(), "updating config");
        let built = Config::from_yaml(raw).map_err(UpdateError::ParseFailed).and_then(Generation::build);
        match built {
            Ok(next) => {
                info!(
                    queue = %next.config.queue_name,
                    multi_kueue = next.config.is_multi_kueue,
                    multi_kueue_override = next.config.multi_kueue_override,
                    expressions = next.config.expressions().len(),
                    "config updated"
                );
                self.current.store(Some(Arc::new(next)));
                self.recorder.reload_succeeded();
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "config reload rejected; keeping previous generation");
                self.recorder.reload_failed();
                Err(e)
            }
        }
    }
}
