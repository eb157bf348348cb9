/// A transient, per-agent-call retrieval request.
#[derive(Debug, Clone)]
pub struct RetrievalQuery {
    pub text: String,
    pub module_type: Option<String>,
    pub top_k: usize,
    /// Character budget for the concatenated context (spec's "token
    /// budget" of 2,000 tokens is approximated as 8,000 characters).
    pub token_budget: usize,
}

impl RetrievalQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            module_type: None,
            top_k: 5,
            token_budget: 8_000,
        }
    }

    pub fn with_module_type(mut self, module_type: impl Into<String>) -> Self {
        self.module_type = Some(module_type.into());
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_token_budget(mut self, budget: usize) -> Self {
        self.token_budget = budget;
        self
    }
}
