use async_trait::async_trait;
use forgeline_core::{ArtifactFormat, ArtifactMetadata, ArtifactType, ForgeError, ForgeResult};
use serde_json::{json, Value};

use crate::agent::{Agent, AgentInput, ModuleCode};
use crate::context::{AgentOutcome, RunContext};

/// Produces `build_log.json` without invoking a compiler. Compilation is
/// out of scope; this agent records what *would* have been built and
/// whether a compiler was discoverable on `PATH`.
pub struct BuildAgent;

const INPUTS: &[ArtifactType] = &[ArtifactType::ModuleCode, ArtifactType::Tests];
const OUTPUTS: &[ArtifactType] = &[ArtifactType::BuildLog];

#[async_trait]
impl Agent for BuildAgent {
    fn id(&self) -> &'static str {
        "build_agent"
    }

    fn declared_inputs(&self) -> &'static [ArtifactType] {
        INPUTS
    }

    fn declared_outputs(&self) -> &'static [ArtifactType] {
        OUTPUTS
    }

    async fn execute(&self, ctx: &RunContext, input: AgentInput) -> ForgeResult<AgentOutcome> {
        let AgentInput::AllModules { modules, tests, expected_module_count } = input else {
            return Err(ForgeError::Internal(
                "build_agent requires AgentInput::AllModules".to_string(),
            ));
        };

        let compiler = discover_compiler();

        let mut notes = Vec::new();
        if modules.len() < expected_module_count {
            notes.push(format!(
                "{} of {} expected modules have generated code",
                modules.len(),
                expected_module_count
            ));
        }
        if compiler.is_none() {
            notes.push("no compiler configured via FORGE_CC; running source_only".to_string());
        }

        let modules_json: serde_json::Map<String, Value> = modules
            .iter()
            .map(|m| (m.module_id.clone(), module_entry(m)))
            .collect();

        let unit_tests = if tests.is_empty() {
            None
        } else {
            Some(json!({
                "status": "discovered",
                "summary": { "passed": 0, "failed": 0 },
            }))
        };

        let mut log = json!({
            "build_type": "source_only",
            "compilation_status": "skipped",
            "compiler": compiler,
            "build_type_label": "source_only",
            "total_modules": expected_module_count,
            "modules_compiled": 0,
            "compilation_details": {
                "instruction": format!("{} -c module_code/*.c", compiler.clone().unwrap_or_else(|| "<none>".to_string())),
            },
            "modules": modules_json,
            "notes": notes,
        });

        if let Some(unit_tests) = unit_tests {
            log["unit_tests"] = unit_tests;
        }

        let metadata = ArtifactMetadata::new(self.id(), ArtifactType::BuildLog, ArtifactFormat::Json);
        let path = ctx
            .store
            .write_json_artifact(&ctx.run_id, self.id(), metadata, None, "build_log.json", &log)
            .await?;

        Ok(AgentOutcome::single(path))
    }
}

fn module_entry(module: &ModuleCode) -> Value {
    json!({
        "header": format!("module_code/{}/{}.h", module.module_id, module.module_id),
        "source": format!("module_code/{}/{}.c", module.module_id, module.module_id),
        "header_size": module.header.len(),
        "source_size": module.source.len(),
    })
}

/// Probes `PATH` for the compiler named by `$FORGE_CC`. Absent the
/// variable or the binary, returns `None` and the run stays `source_only`.
fn discover_compiler() -> Option<String> {
    let name = std::env::var("FORGE_CC").ok()?;
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(&name);
        if candidate.is_file() {
            return Some(name);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeline_core::{ModuleKind, ModuleSpec, OptimizationGoal, Specification};
    use forgeline_mcp::CapabilityMatrix;
    use forgeline_prompt::MockLmClient;
    use forgeline_prompt::PromptLoader;
    use forgeline_retrieval::RetrievalEngine;
    use forgeline_store::ArtifactStore;
    use std::sync::Arc;

    fn spec() -> Specification {
        Specification {
            project_name: "P".into(),
            mcu: "ESP32".into(),
            description: String::new(),
            modules: vec![ModuleSpec {
                id: Some("uart0".into()),
                name: "UART0".into(),
                kind: ModuleKind::Uart,
                description: None,
                parameters: Default::default(),
                requirements: vec![],
            }],
            requirements: vec![],
            constraints: Default::default(),
            safety_critical: false,
            optimization_goal: OptimizationGoal::Balanced,
        }
    }

    async fn context(dir: &std::path::Path) -> RunContext {
        RunContext {
            run_id: "run1".to_string(),
            store: Arc::new(ArtifactStore::new(dir.join("output"), Arc::new(CapabilityMatrix::canonical()))),
            retrieval: Arc::new(RetrievalEngine::empty()),
            prompts: Arc::new(PromptLoader::new(dir.join("prompts"))),
            lm: Arc::new(MockLmClient::new()),
            specification: Arc::new(spec()),
        }
    }

    #[tokio::test]
    async fn defaults_to_source_only_without_forge_cc() {
        std::env::remove_var("FORGE_CC");
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(dir.path()).await;
        let agent = BuildAgent;

        let input = AgentInput::AllModules {
            modules: vec![ModuleCode {
                module_id: "uart0".into(),
                header: "void uart0_init(void);".into(),
                source: "void uart0_init(void) {}".into(),
            }],
            tests: vec![],
            expected_module_count: 1,
        };

        let outcome = agent.execute(&ctx, input).await.expect("should succeed");
        let bytes = tokio::fs::read(&outcome.artifacts_written[0]).await.expect("read log");
        let log: Value = serde_json::from_slice(&bytes).expect("valid json");
        assert_eq!(log["build_type"], "source_only");
        assert!(log["compiler"].is_null());
    }

    #[tokio::test]
    async fn missing_modules_recorded_in_notes() {
        std::env::remove_var("FORGE_CC");
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(dir.path()).await;
        let agent = BuildAgent;

        let input = AgentInput::AllModules {
            modules: vec![],
            tests: vec![],
            expected_module_count: 2,
        };

        let outcome = agent.execute(&ctx, input).await.expect("should succeed");
        let bytes = tokio::fs::read(&outcome.artifacts_written[0]).await.expect("read log");
        let log: Value = serde_json::from_slice(&bytes).expect("valid json");
        let notes = log["notes"].as_array().expect("notes array");
        assert!(notes.iter().any(|n| n.as_str().unwrap_or_default().contains("0 of 2")));
    }
}
