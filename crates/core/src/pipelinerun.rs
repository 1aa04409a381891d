//! Tekton `PipelineRun` (tekton.dev/v1), reduced to the fields defaulting reads
//! or writes. Everything else in `spec` round-trips through `extra`.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

pub const API_GROUP: &str = "tekton.dev";
pub const KIND: &str = "PipelineRun";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PipelineRunSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Json>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_ref: Option<PipelineRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_spec: Option<Json>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Param>,
    /// Empty when unset; `PipelineRunPending` holds the run for Kueue admission.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_by: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

/// Run parameter; both fields are required on decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("invalid pipelinerun: expected exactly one, got neither: pipelineRef, pipelineSpec")]
    Neither,
    #[error("invalid pipelinerun: expected exactly one, got both: pipelineRef, pipelineSpec")]
    Both,
}

impl PipelineRun {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata.labels.as_ref()?.get(key).map(String::as_str)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.as_ref()?.get(key).map(String::as_str)
    }

    /// Labels map, created empty when absent.
    pub fn labels_mut(&mut self) -> &mut BTreeMap<String, String> {
        self.metadata.labels.get_or_insert_with(BTreeMap::new)
    }

    /// Annotations map, created empty when absent.
    pub fn annotations_mut(&mut self) -> &mut BTreeMap<String, String> {
        self.metadata.annotations.get_or_insert_with(BTreeMap::new)
    }

    /// A run names its pipeline by reference or embeds it inline, never both.
    pub fn validate_shape(&self) -> Result<(), ShapeError> {
        match (&self.spec.pipeline_ref, &self.spec.pipeline_spec) {
            (Some(_), Some(_)) => Err(ShapeError::Both),
            (None, None) => Err(ShapeError::Neither),
            _ => Ok(()),
        }
    }
}

/// True when `apiVersion`/`kind` identify a Tekton PipelineRun of any version.
pub fn is_pipeline_run(api_version: &str, kind: &str) -> bool {
    let group = api_version.split_once('/').map(|(g, _)| g).unwrap_or("");
    group == API_GROUP && kind == KIND
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_keeps_unknown_spec_fields() {
        let raw = serde_json::json!({
            "apiVersion": "tekton.dev/v1",
            "kind": "PipelineRun",
            "metadata": { "name": "build", "labels": { "app": "web" } },
            "spec": {
                "pipelineRef": { "name": "build-pipeline", "params": [] },
                "timeouts": { "pipeline": "1h" },
            }
        });
        let plr: PipelineRun = serde_json::from_value(raw).unwrap();
        assert_eq!(plr.label("app"), Some("web"));
        assert_eq!(plr.spec.pipeline_ref.as_ref().and_then(|r| r.name.as_deref()), Some("build-pipeline"));
        let back = serde_json::to_value(&plr).unwrap();
        assert_eq!(back["spec"]["timeouts"]["pipeline"], "1h");
        assert_eq!(back["spec"]["pipelineRef"]["params"], serde_json::json!([]));
        assert!(back["spec"].get("status").is_none());
    }

    #[test]
    fn params_require_name_and_value() {
        let raw = serde_json::json!({ "spec": { "pipelineSpec": { "params": [{}] }, "params": [{}] } });
        assert!(serde_json::from_value::<PipelineRun>(raw).is_err());
    }

    #[test]
    fn shape_requires_exactly_one_run_spec() {
        let mut plr = PipelineRun::default();
        assert_eq!(plr.validate_shape(), Err(ShapeError::Neither));
        plr.spec.pipeline_spec = Some(serde_json::json!({ "tasks": [] }));
        assert!(plr.validate_shape().is_ok());
        plr.spec.pipeline_ref = Some(PipelineRef { name: Some("p".into()), ..Default::default() });
        assert_eq!(plr.validate_shape(), Err(ShapeError::Both));
    }

    #[test]
    fn kind_check_accepts_any_tekton_version() {
        assert!(is_pipeline_run("tekton.dev/v1", "PipelineRun"));
        assert!(is_pipeline_run("tekton.dev/v1beta1", "PipelineRun"));
        assert!(!is_pipeline_run("tekton.dev/v1", "Pipeline"));
        assert!(!is_pipeline_run("v1", "PipelineRun"));
    }
}
