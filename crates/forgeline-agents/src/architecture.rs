use std::collections::HashMap;

use async_trait::async_trait;
use forgeline_core::{ArtifactFormat, ArtifactMetadata, ArtifactType, ForgeError, ForgeResult};
use forgeline_prompt::{CompletionRequest, PromptKind};
use forgeline_retrieval::RetrievalQuery;

use crate::agent::{Agent, AgentInput};
use crate::context::{AgentOutcome, RunContext};

/// Renders the architecture prompt from the specification, calls the LM,
/// and writes `architecture/architecture.md`.
pub struct ArchitectureAgent;

const INPUTS: &[ArtifactType] = &[ArtifactType::Requirements];
const OUTPUTS: &[ArtifactType] = &[ArtifactType::Architecture];

#[async_trait]
impl Agent for ArchitectureAgent {
    fn id(&self) -> &'static str {
        "architecture_agent"
    }

    fn declared_inputs(&self) -> &'static [ArtifactType] {
        INPUTS
    }

    fn declared_outputs(&self) -> &'static [ArtifactType] {
        OUTPUTS
    }

    async fn execute(&self, ctx: &RunContext, input: AgentInput) -> ForgeResult<AgentOutcome> {
        let AgentInput::Specification = input else {
            return Err(ForgeError::Internal(
                "architecture_agent requires AgentInput::Specification".to_string(),
            ));
        };

        let spec = &ctx.specification;
        let domain_hints: Vec<&str> = spec
            .modules
            .iter()
            .flat_map(|m| m.kind.domain_hints().iter().copied())
            .collect();
        let query_text = format!("{} {}", spec.description, domain_hints.join(" "));
        let query = RetrievalQuery::new(query_text).with_top_k(5);
        let retrieval = ctx.retrieval.search(&query);

        let module_list = spec
            .modules
            .iter()
            .map(|m| format!("- {} ({:?})", m.name, m.kind))
            .collect::<Vec<_>>()
            .join("\n");
        let constraints = serde_json::to_string(&spec.constraints).unwrap_or_default();

        let mut fields = HashMap::new();
        fields.insert("MCU".to_string(), spec.mcu.clone());
        fields.insert("CONSTRAINTS".to_string(), constraints);
        fields.insert("RAG_CONTEXT".to_string(), retrieval.context.clone());
        fields.insert("MODULES".to_string(), module_list);
        fields.insert("AGENT_ROLE".to_string(), "architecture_agent".to_string());
        fields.insert(
            "OPTIMIZATION".to_string(),
            format!("{:?}", spec.optimization_goal),
        );

        let template = ctx.prompts.load("architecture", "v1").await?;
        let rendered = template.render(&fields);

        let text = ctx
            .lm
            .complete(CompletionRequest::new(rendered, PromptKind::Markdown))
            .await?;

        let metadata = ArtifactMetadata::new(self.id(), ArtifactType::Architecture, ArtifactFormat::Text)
            .with_prompt_version("v1");

        let path = ctx
            .store
            .write_artifact(&ctx.run_id, self.id(), metadata, None, "architecture.md", text.as_bytes())
            .await?;

        let mut outcome = AgentOutcome::single(path);
        for id in &retrieval.omitted {
            outcome
                .warnings
                .push(format!("retrieval document '{id}' omitted for budget"));
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeline_core::{ModuleKind, ModuleSpec, OptimizationGoal, Specification};
    use forgeline_mcp::CapabilityMatrix;
    use forgeline_prompt::{MockLmClient, PromptLoader};
    use forgeline_retrieval::RetrievalEngine;
    use forgeline_store::ArtifactStore;
    use std::sync::Arc;

    fn spec() -> Specification {
        Specification {
            project_name: "P".into(),
            mcu: "ESP32".into(),
            description: "uart bridge".into(),
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
        let prompts_dir = dir.join("prompts");
        tokio::fs::create_dir_all(&prompts_dir).await.expect("mkdir");
        tokio::fs::write(
            prompts_dir.join("architecture_prompt_v1.md"),
            "MCU: <<MCU>>\nModules:\n<<MODULES>>\nContext: <<RAG_CONTEXT>>",
        )
        .await
        .expect("write template");

        RunContext {
            run_id: "run1".to_string(),
            store: Arc::new(ArtifactStore::new(dir.join("output"), Arc::new(CapabilityMatrix::canonical()))),
            retrieval: Arc::new(RetrievalEngine::empty()),
            prompts: Arc::new(PromptLoader::new(prompts_dir)),
            lm: Arc::new(MockLmClient::new()),
            specification: Arc::new(spec()),
        }
    }

    #[tokio::test]
    async fn writes_architecture_markdown() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(dir.path()).await;
        let agent = ArchitectureAgent;

        let outcome = agent
            .execute(&ctx, AgentInput::Specification)
            .await
            .expect("should succeed");

        assert_eq!(outcome.artifacts_written.len(), 1);
        let bytes = tokio::fs::read(&outcome.artifacts_written[0]).await.expect("read artifact");
        assert!(String::from_utf8_lossy(&bytes).starts_with('#'));
    }

    #[tokio::test]
    async fn rejects_wrong_input_variant() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(dir.path()).await;
        let agent = ArchitectureAgent;

        let bad_input = AgentInput::ModuleCode(crate::agent::ModuleCode {
            module_id: "uart0".into(),
            header: String::new(),
            source: String::new(),
        });
        let err = agent.execute(&ctx, bad_input).await.expect_err("should reject");
        assert!(matches!(err, ForgeError::Internal(_)));
    }
}
