//! Offline defaulting of PipelineRun files against a config directory.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::Value as Json;
use tekq_store::ConfigStore;
use tracing::info;

use crate::Defaulter;

/// File read from the config directory, matching the mounted ConfigMap key.
pub const CONFIG_FILE: &str = "config.yaml";

fn max_yaml_bytes() -> usize {
    std::env::var("TEKQ_MAX_YAML_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1_000_000)
}

fn read_bounded(path: &Path, what: &str) -> Result<Vec<u8>> {
    let raw = fs::read(path).with_context(|| format!("reading {what} {}", path.display()))?;
    let max = max_yaml_bytes();
    if raw.len() > max {
        bail!("{what} {} is {} bytes, limit is {max}", path.display(), raw.len());
    }
    Ok(raw)
}

/// Build a store from `<config_dir>/config.yaml`.
pub fn load_store(config_dir: impl AsRef<Path>) -> Result<Arc<ConfigStore>> {
    let dir = config_dir.as_ref();
    if dir.as_os_str().is_empty() {
        bail!("config directory is empty");
    }
    let path = dir.join(CONFIG_FILE);
    let raw = read_bounded(&path, "config")?;
    let store = ConfigStore::new();
    store.update(&raw).with_context(|| format!("loading config from {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Default the PipelineRun in `plr_file` and return it re-encoded as YAML.
pub fn mutate_pipeline_run(plr_file: impl AsRef<Path>, config_dir: impl AsRef<Path>) -> Result<Vec<u8>> {
    let plr_file = plr_file.as_ref();
    if plr_file.as_os_str().is_empty() {
        bail!("pipelinerun file is empty");
    }
    let raw = read_bounded(plr_file, "pipelinerun")?;
    let val: serde_yaml::Value = serde_yaml::from_slice(&raw).context("parsing PipelineRun YAML")?;
    let doc: Json = serde_json::to_value(val).context("converting YAML to JSON")?;

    let defaulter = Defaulter::new(load_store(config_dir)?);
    let plr = defaulter.default_document(&doc)?;
    info!(
        name = plr.metadata.name.as_deref().unwrap_or(""),
        file = %plr_file.display(),
        "mutated pipelinerun"
    );
    let out = serde_yaml::to_string(&plr).context("encoding PipelineRun YAML")?;
    Ok(out.into_bytes())
}
