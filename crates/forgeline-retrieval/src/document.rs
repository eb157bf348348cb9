use std::collections::HashSet;

use forgeline_core::Priority;
use serde::Deserialize;

/// One corpus document, loaded once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct RetrievalDocument {
    pub id: String,
    pub domain: String,
    pub priority: Priority,
    pub keywords: HashSet<String>,
    pub module_types: Vec<String>,
    pub search_weight: f64,
    pub text: String,
}

/// The sidecar `<name>.tags.json` shape; any field a document's sidecar
/// omits falls back to the defaults documented in the retrieval engine's
/// loader contract.
#[derive(Debug, Deserialize, Default)]
pub struct DocumentTags {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub module_types: Vec<String>,
    #[serde(default)]
    pub search_weight: Option<f64>,
}

impl DocumentTags {
    pub fn into_document(self, id: String, text: String) -> RetrievalDocument {
        RetrievalDocument {
            id,
            domain: self.domain.unwrap_or_else(|| "general".to_string()),
            priority: self.priority.unwrap_or(Priority::Medium),
            keywords: self
                .keywords
                .into_iter()
                .map(|k| k.to_lowercase())
                .collect(),
            module_types: if self.module_types.is_empty() {
                vec!["all".to_string()]
            } else {
                self.module_types
            },
            search_weight: self.search_weight.unwrap_or(0.7),
            text,
        }
    }
}

/// Tokenize into lowercase alphanumeric words, matching the keyword/query
/// vocabulary the scoring formula expects.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1)
        .map(str::to_lowercase)
        .collect()
}
