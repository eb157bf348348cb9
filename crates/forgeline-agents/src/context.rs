use std::path::PathBuf;
use std::sync::Arc;

use forgeline_core::Specification;
use forgeline_prompt::{LmClient, PromptLoader};
use forgeline_retrieval::RetrievalEngine;
use forgeline_store::ArtifactStore;

/// The collaborators injected into every agent invocation. Agents own
/// nothing persistent between invocations; everything they need arrives
/// here or in their [`crate::AgentInput`].
#[derive(Clone)]
pub struct RunContext {
    pub run_id: String,
    pub store: Arc<ArtifactStore>,
    pub retrieval: Arc<RetrievalEngine>,
    pub prompts: Arc<PromptLoader>,
    pub lm: Arc<dyn LmClient>,
    pub specification: Arc<Specification>,
}

/// What an agent invocation produced: the paths it wrote and any
/// non-fatal warnings (e.g. "module B failed" surfaced by a sibling
/// invocation, retrieval documents dropped for budget).
#[derive(Debug, Clone, Default)]
pub struct AgentOutcome {
    pub artifacts_written: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

impl AgentOutcome {
    pub fn single(path: PathBuf) -> Self {
        Self {
            artifacts_written: vec![path],
            warnings: Vec::new(),
        }
    }
}
