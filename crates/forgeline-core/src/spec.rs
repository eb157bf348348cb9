use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ForgeError, ForgeResult};
use crate::types::{ModelProvider, ModuleKind, OptimizationGoal};

/// One hardware module requested in a [`Specification`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSpec {
    /// Stable identifier; defaults to a slugified `name` if omitted by the
    /// caller (see [`Specification::normalize`]).
    #[serde(default)]
    pub id: Option<String>,
    /// Human-readable module name.
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ModuleKind,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub requirements: Vec<String>,
}

/// The caller-supplied requirements specification for one run. Immutable
/// once a run is submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Specification {
    pub project_name: String,
    pub mcu: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub constraints: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub safety_critical: bool,
    #[serde(default)]
    pub optimization_goal: OptimizationGoal,
}

/// Options accompanying a [`Specification`] at submit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    #[serde(default = "default_true")]
    pub include_tests: bool,
    #[serde(default = "default_true")]
    pub run_quality_checks: bool,
    #[serde(default)]
    pub model_provider: ModelProvider,
    #[serde(default)]
    pub model_name: Option<String>,
    /// Never persisted or logged; consumed only by the LM client.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub architecture_only: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            include_tests: true,
            run_quality_checks: true,
            model_provider: ModelProvider::default(),
            model_name: None,
            api_key: None,
            architecture_only: false,
        }
    }
}

impl Specification {
    /// Validate the specification and assign stable module ids where the
    /// caller omitted one. Returns `InvalidInput` for malformed input;
    /// on success the run is guaranteed creatable.
    pub fn normalize(mut self) -> ForgeResult<Self> {
        if self.project_name.trim().is_empty() {
            return Err(ForgeError::InvalidInput(
                "project_name must not be empty".into(),
            ));
        }
        if self.mcu.trim().is_empty() {
            return Err(ForgeError::InvalidInput("mcu must not be empty".into()));
        }

        let mut seen_ids = std::collections::HashSet::new();
        for module in &mut self.modules {
            let id = module
                .id
                .clone()
                .unwrap_or_else(|| slugify(&module.name));
            if id.is_empty() {
                return Err(ForgeError::InvalidInput(format!(
                    "module '{}' has no usable id",
                    module.name
                )));
            }
            if !seen_ids.insert(id.clone()) {
                return Err(ForgeError::InvalidInput(format!(
                    "duplicate module id '{id}'"
                )));
            }
            module.id = Some(id);
        }

        Ok(self)
    }
}

fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_spec() -> Specification {
        Specification {
            project_name: "P".into(),
            mcu: "ESP32".into(),
            description: String::new(),
            modules: vec![ModuleSpec {
                id: None,
                name: "UART 0".into(),
                kind: ModuleKind::Uart,
                description: None,
                parameters: HashMap::new(),
                requirements: vec![],
            }],
            requirements: vec![],
            constraints: HashMap::new(),
            safety_critical: false,
            optimization_goal: OptimizationGoal::Balanced,
        }
    }

    #[test]
    fn normalize_slugifies_missing_module_id() {
        let spec = base_spec().normalize().expect("should normalize");
        assert_eq!(spec.modules[0].id.as_deref(), Some("uart_0"));
    }

    #[test]
    fn normalize_rejects_empty_project_name() {
        let mut spec = base_spec();
        spec.project_name = "  ".into();
        assert!(spec.normalize().is_err());
    }

    #[test]
    fn normalize_rejects_duplicate_module_ids() {
        let mut spec = base_spec();
        let dup = spec.modules[0].clone();
        spec.modules.push(dup);
        assert!(spec.normalize().is_err());
    }
}
