use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::{ArtifactFormat, ArtifactType};

/// The sidecar metadata record written next to (or, for multi-file
/// artifacts, alongside) every artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub artifact_id: Uuid,
    pub agent_id: String,
    pub artifact_type: ArtifactType,
    #[serde(default)]
    pub module_id: Option<String>,
    #[serde(default)]
    pub prompt_version: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub artifact_format: ArtifactFormat,
    #[serde(default)]
    pub sub_artifacts: Vec<String>,
    #[serde(default)]
    pub extra: Value,
}

impl ArtifactMetadata {
    pub fn new(
        agent_id: impl Into<String>,
        artifact_type: ArtifactType,
        artifact_format: ArtifactFormat,
    ) -> Self {
        Self {
            artifact_id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            artifact_type,
            module_id: None,
            prompt_version: None,
            timestamp: Utc::now(),
            artifact_format,
            sub_artifacts: Vec::new(),
            extra: Value::Null,
        }
    }

    pub fn with_module_id(mut self, module_id: impl Into<String>) -> Self {
        self.module_id = Some(module_id.into());
        self
    }

    pub fn with_prompt_version(mut self, version: impl Into<String>) -> Self {
        self.prompt_version = Some(version.into());
        self
    }

    pub fn with_sub_artifacts(mut self, names: Vec<String>) -> Self {
        self.sub_artifacts = names;
        self
    }

    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = extra;
        self
    }

    /// Serialize as canonical JSON: sorted keys, no trailing whitespace.
    /// `serde_json`'s `preserve_order` feature is disabled for this call
    /// path by going through a `BTreeMap` re-serialization so key order is
    /// lexicographic regardless of struct field declaration order.
    pub fn to_canonical_json(&self) -> serde_json::Result<Vec<u8>> {
        let value = serde_json::to_value(self)?;
        let sorted = sort_keys(value);
        serde_json::to_vec(&sorted)
    }
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: std::collections::BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            serde_json::to_value(sorted).unwrap_or(Value::Null)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// A row returned by `list_artifacts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactListing {
    pub run_id: String,
    pub category: String,
    pub filename: String,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_json_has_sorted_keys() {
        let meta = ArtifactMetadata::new("architecture_agent", ArtifactType::Architecture, ArtifactFormat::Text);
        let bytes = meta.to_canonical_json().expect("should serialize");
        let text = String::from_utf8(bytes).expect("utf8");
        let artifact_id_pos = text.find("\"artifact_id\"").expect("has artifact_id");
        let timestamp_pos = text.find("\"timestamp\"").expect("has timestamp");
        assert!(artifact_id_pos < timestamp_pos);
    }
}
