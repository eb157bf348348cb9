/// The shape of response a caller expects, used only by the `mock`
/// backend to decide what to stub; the `real` backend treats every kind
/// identically (it just forwards `prompt` text).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Architecture agent: expects markdown prose.
    Markdown,
    /// Code agent: expects `{"header", "source"}` JSON or marked sections.
    CodeArtifact,
    /// Test agent: expects plausible C test source.
    TestSource,
    /// Quality agent: expects a short qualitative analysis sentence.
    Analysis,
}

/// One completion request: the rendered prompt text plus the kind hint.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub kind: PromptKind,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, kind: PromptKind) -> Self {
        Self {
            prompt: prompt.into(),
            kind,
        }
    }
}
