use std::collections::HashMap;

use async_trait::async_trait;
use forgeline_core::{ArtifactFormat, ArtifactMetadata, ArtifactType, ForgeError, ForgeResult};
use forgeline_prompt::{CompletionRequest, PromptKind};
use forgeline_retrieval::RetrievalQuery;
use tracing::warn;

use crate::agent::{Agent, AgentInput};
use crate::context::{AgentOutcome, RunContext};

/// Generates one module's header and source, one agent invocation per
/// module (the orchestrator fans these out up to its worker-pool cap).
pub struct CodeAgent;

const INPUTS: &[ArtifactType] = &[ArtifactType::Architecture];
const OUTPUTS: &[ArtifactType] = &[ArtifactType::ModuleCode];

#[async_trait]
impl Agent for CodeAgent {
    fn id(&self) -> &'static str {
        "code_agent"
    }

    fn declared_inputs(&self) -> &'static [ArtifactType] {
        INPUTS
    }

    fn declared_outputs(&self) -> &'static [ArtifactType] {
        OUTPUTS
    }

    async fn execute(&self, ctx: &RunContext, input: AgentInput) -> ForgeResult<AgentOutcome> {
        let AgentInput::Module { architecture_text, module } = input else {
            return Err(ForgeError::Internal(
                "code_agent requires AgentInput::Module".to_string(),
            ));
        };
        let module_id = module.id.clone().ok_or_else(|| {
            ForgeError::Internal(format!("module '{}' missing normalized id", module.name))
        })?;

        let query = RetrievalQuery::new(format!("{} {:?}", module.name, module.kind))
            .with_module_type(module_kind_slug(&module.kind))
            .with_top_k(3);
        let retrieval = ctx.retrieval.search(&query);

        let mut fields = HashMap::new();
        fields.insert("AGENT_ROLE".to_string(), self.id().to_string());
        fields.insert("MCU".to_string(), ctx.specification.mcu.clone());
        fields.insert("MODULE".to_string(), module.name.clone());
        fields.insert(
            "CONSTRAINTS".to_string(),
            serde_json::to_string(&ctx.specification.constraints).unwrap_or_default(),
        );
        fields.insert("RAG_CONTEXT".to_string(), retrieval.context.clone());
        fields.insert(
            "OPTIMIZATION".to_string(),
            format!("{:?}", ctx.specification.optimization_goal),
        );
        fields.insert("BOARD_SPECS".to_string(), architecture_text);

        let template = ctx.prompts.load("code", "v1").await?;
        let rendered = template.render(&fields);

        let text = ctx
            .lm
            .complete(CompletionRequest::new(rendered, PromptKind::CodeArtifact))
            .await?;

        let (header, source) = split_header_source(&text, &module_id);

        let metadata = ArtifactMetadata::new(self.id(), ArtifactType::ModuleCode, ArtifactFormat::MultiFile)
            .with_module_id(module_id.clone())
            .with_prompt_version("v1");

        let (header_path, source_path) = ctx
            .store
            .write_modular_code(&ctx.run_id, self.id(), &module_id, header.as_bytes(), source.as_bytes(), metadata)
            .await?;

        let mut outcome = AgentOutcome {
            artifacts_written: vec![header_path, source_path],
            warnings: Vec::new(),
        };
        for id in &retrieval.omitted {
            outcome
                .warnings
                .push(format!("retrieval document '{id}' omitted for budget"));
        }
        Ok(outcome)
    }
}

fn module_kind_slug(kind: &forgeline_core::ModuleKind) -> String {
    format!("{kind:?}").to_lowercase()
}

/// Extract `(header, source)` from an LM completion, trying progressively
/// looser fallbacks so a provider's formatting slip never fails the run:
///
/// 1. `{"header": ..., "source": ...}` JSON (the primary contract).
/// 2. `###HEADER###` / `###SOURCE###` marker sections.
/// 3. Split at the first `{` that opens a function body, header = everything
///    before it plus a synthesized include guard, source = the rest.
/// 4. Split the text in half as a last resort.
fn split_header_source(text: &str, module_id: &str) -> (String, String) {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        if let (Some(header), Some(source)) = (
            value.get("header").and_then(|v| v.as_str()),
            value.get("source").and_then(|v| v.as_str()),
        ) {
            return (header.to_string(), source.to_string());
        }
    }

    if let (Some(header_start), Some(source_start)) =
        (text.find("###HEADER###"), text.find("###SOURCE###"))
    {
        if source_start > header_start {
            let header = text[header_start + "###HEADER###".len()..source_start].trim().to_string();
            let source = text[source_start + "###SOURCE###".len()..].trim().to_string();
            return (header, source);
        }
    }

    warn!(module_id, "code agent output did not match the expected shape; falling back to heuristic split");

    if let Some(brace_pos) = text.find('{') {
        let before = text[..brace_pos].trim();
        if let Some(last_newline) = before.rfind('\n') {
            let header_body = before[..last_newline].trim();
            let source = text[last_newline..].trim();
            let header = format!(
                "#ifndef MODULE_{module_id}_H\n#define MODULE_{module_id}_H\n\n{header_body}\n\n#endif\n"
            );
            return (header, source.to_string());
        }
    }

    let midpoint = text.len() / 2;
    let split_at = text
        .char_indices()
        .map(|(i, _)| i)
        .find(|i| *i >= midpoint)
        .unwrap_or(midpoint);
    let (first, second) = text.split_at(split_at);
    (
        format!("#ifndef MODULE_{module_id}_H\n#define MODULE_{module_id}_H\n\n{first}\n\n#endif\n"),
        second.to_string(),
    )
}
