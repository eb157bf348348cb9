use async_trait::async_trait;
use forgeline_core::ForgeResult;

use crate::kind::CompletionRequest;

/// Abstract text-completion endpoint. Implementations must be reentrant-safe
/// (`Send + Sync`) since the orchestrator may call `complete` concurrently
/// from several stage workers.
#[async_trait]
pub trait LmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> ForgeResult<String>;
}
