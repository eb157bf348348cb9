use async_trait::async_trait;
use forgeline_core::{ArtifactType, ForgeResult, ModuleSpec};

use crate::context::{AgentOutcome, RunContext};

/// One module's generated code, passed into the test/quality/build agents.
#[derive(Debug, Clone)]
pub struct ModuleCode {
    pub module_id: String,
    pub header: String,
    pub source: String,
}

/// One module's generated test source, passed into the quality/build
/// agents.
#[derive(Debug, Clone)]
pub struct ModuleTest {
    pub module_id: String,
    pub source: String,
}

/// The input shape for one agent invocation. Each agent only ever
/// receives the variant its role demands; the orchestrator is responsible
/// for constructing it from prior-stage artifacts.
pub enum AgentInput {
    /// Architecture agent: the full specification.
    Specification,
    /// Code agent: architecture text plus the one module to generate.
    Module {
        architecture_text: String,
        module: ModuleSpec,
    },
    /// Test agent: one module's already-generated code.
    ModuleCode(ModuleCode),
    /// Quality/build agents: every module's code and (if present) tests.
    AllModules {
        modules: Vec<ModuleCode>,
        tests: Vec<ModuleTest>,
        expected_module_count: usize,
    },
}

/// The shared contract every pipeline agent implements: declared
/// capabilities plus `execute`. The orchestrator will not invoke an agent
/// without the matching MCP grants for its declared inputs/outputs.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable id used for MCP checks and artifact metadata (`agent_id`).
    fn id(&self) -> &'static str;
    fn declared_inputs(&self) -> &'static [ArtifactType];
    fn declared_outputs(&self) -> &'static [ArtifactType];
    async fn execute(&self, ctx: &RunContext, input: AgentInput) -> ForgeResult<AgentOutcome>;
}
