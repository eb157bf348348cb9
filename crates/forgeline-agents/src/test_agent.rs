use std::collections::HashMap;

use async_trait::async_trait;
use forgeline_core::{ArtifactFormat, ArtifactMetadata, ArtifactType, ForgeError, ForgeResult};
use forgeline_prompt::{CompletionRequest, PromptKind};

use crate::agent::{Agent, AgentInput};
use crate::context::{AgentOutcome, RunContext};

/// Generates one module's unit test source from its already-written code.
pub struct TestAgent;

const INPUTS: &[ArtifactType] = &[ArtifactType::ModuleCode];
const OUTPUTS: &[ArtifactType] = &[ArtifactType::Tests];

#[async_trait]
impl Agent for TestAgent {
    fn id(&self) -> &'static str {
        "test_agent"
    }

    fn declared_inputs(&self) -> &'static [ArtifactType] {
        INPUTS
    }

    fn declared_outputs(&self) -> &'static [ArtifactType] {
        OUTPUTS
    }

    async fn execute(&self, ctx: &RunContext, input: AgentInput) -> ForgeResult<AgentOutcome> {
        let AgentInput::ModuleCode(module_code) = input else {
            return Err(ForgeError::Internal(
                "test_agent requires AgentInput::ModuleCode".to_string(),
            ));
        };

        let mut fields = HashMap::new();
        fields.insert("AGENT_ROLE".to_string(), self.id().to_string());
        fields.insert("MODULE".to_string(), module_code.module_id.clone());
        fields.insert("CODE_FILES".to_string(), format!("{}\n\n{}", module_code.header, module_code.source));
        fields.insert("MCU".to_string(), ctx.specification.mcu.clone());

        let template = ctx.prompts.load("test", "v1").await?;
        let rendered = template.render(&fields);

        let text = ctx
            .lm
            .complete(CompletionRequest::new(rendered, PromptKind::TestSource))
            .await?;

        let metadata = ArtifactMetadata::new(self.id(), ArtifactType::Tests, ArtifactFormat::Text)
            .with_module_id(module_code.module_id.clone())
            .with_prompt_version("v1");

        let filename = format!("{}_test.c", module_code.module_id);
        let path = ctx
            .store
            .write_artifact(
                &ctx.run_id,
                self.id(),
                metadata,
                Some(module_code.module_id.as_str()),
                &filename,
                text.as_bytes(),
            )
            .await?;

        Ok(AgentOutcome::single(path))
    }
}
