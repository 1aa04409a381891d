//! Policy document delivered by the config collaborator (YAML).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// LocalQueue stamped on PipelineRuns that lack the queue label.
    #[serde(default)]
    pub queue_name: String,
    #[serde(default)]
    pub multi_kueue_override: bool,
    #[serde(default)]
    pub is_multi_kueue: bool,
    #[serde(default)]
    pub cel: CelConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CelConfig {
    /// Mutation rules, applied in this order.
    #[serde(default)]
    pub expressions: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("queue name is not set")]
    MissingQueueName,
}

impl Config {
    /// Parse a raw document. A blank or `null` document yields the empty
    /// config, which then fails [`Config::validate`].
    pub fn from_yaml(raw: &[u8]) -> Result<Self, ConfigError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let doc: Option<Self> = serde_yaml::from_slice(raw)?;
        Ok(doc.unwrap_or_default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_name.is_empty() {
            return Err(ConfigError::MissingQueueName);
        }
        Ok(())
    }

    pub fn expressions(&self) -> &[String] {
        &self.cel.expressions
    }
}
