use std::cmp::Ordering;
use std::path::Path;

use forgeline_core::ForgeResult;
use tracing::warn;

use crate::document::{tokenize, DocumentTags, RetrievalDocument};
use crate::query::RetrievalQuery;

/// The result of one retrieval call: the ranked document ids with their
/// scores, the budget-truncated concatenated context, and the ids of any
/// documents that scored but were dropped to stay under budget.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub ranked: Vec<(String, f64)>,
    pub context: String,
    pub omitted: Vec<String>,
}

/// Scores a fixed, in-memory corpus of markdown documents against a query
/// and concatenates the top results under a character budget.
///
/// Immutable after [`RetrievalEngine::load`]; reads require no locking.
pub struct RetrievalEngine {
    documents: Vec<RetrievalDocument>,
}

impl RetrievalEngine {
    /// An engine with no documents. Queries against it always return an
    /// empty result; retrieval failure degrades gracefully, never errors.
    pub fn empty() -> Self {
        Self { documents: Vec::new() }
    }

    /// Scan `corpus_dir` once for `*.md` files. Each file's tags come from
    /// a sibling `<name>.tags.json`, or defaults (`domain="general"`,
    /// `priority=medium`, no keywords, `module_types=["all"]`,
    /// `search_weight=0.7`) when no sidecar exists. A missing or unreadable
    /// corpus directory yields an empty engine rather than an error.
    pub async fn load(corpus_dir: &Path) -> ForgeResult<Self> {
        let mut documents = Vec::new();

        let mut entries = match tokio::fs::read_dir(corpus_dir).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %corpus_dir.display(), error = %err, "retrieval corpus directory unreadable; starting empty");
                return Ok(Self::empty());
            }
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let id = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let text = tokio::fs::read_to_string(&path).await?;

            let tags_path = path.with_extension("tags.json");
            let tags = match tokio::fs::read_to_string(&tags_path).await {
                Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
                Err(_) => DocumentTags::default(),
            };

            documents.push(tags.into_document(id, text));
        }

        documents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(Self { documents })
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Every loaded document's id, domain, and text, for enumeration
    /// endpoints that don't need scoring.
    pub fn documents(&self) -> impl Iterator<Item = &RetrievalDocument> {
        self.documents.iter()
    }

    /// Score every document against `query` and return the ranked ids with
    /// scores, highest first, without truncating to `top_k` or budget.
    pub fn score(&self, query: &RetrievalQuery) -> Vec<(String, f64)> {
        let query_tokens: std::collections::HashSet<String> =
            tokenize(&query.text).into_iter().collect();

        let mut scored: Vec<(String, f64, crate::document::RetrievalDocument)> = Vec::new();
        for doc in &self.documents {
            let keyword_overlap = if query_tokens.is_empty() {
                0.0
            } else {
                let hits = query_tokens.intersection(&doc.keywords).count();
                hits as f64 / query_tokens.len() as f64
            };

            let domain_tokens: std::collections::HashSet<String> =
                tokenize(&doc.domain).into_iter().collect();
            let domain_match = if query_tokens.intersection(&domain_tokens).next().is_some() {
                1.0
            } else {
                0.0
            };

            let mut score = 0.40 * keyword_overlap
                + 0.30 * domain_match
                + 0.15 * doc.priority.weight()
                + 0.15 * doc.search_weight;

            if let Some(module_type) = &query.module_type {
                let matches = doc.module_types.iter().any(|t| t == module_type || t == "all");
                if !matches {
                    score *= 0.5;
                }
            }

            scored.push((doc.id.clone(), score, doc.clone()));
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.2.priority.cmp(&a.2.priority))
                .then_with(|| a.0.cmp(&b.0))
        });

        scored.into_iter().map(|(id, score, _)| (id, score)).collect()
    }

    /// Score, take the top `query.top_k`, and concatenate their text under
    /// `query.token_budget` characters, never splitting inside a
    /// paragraph. Documents dropped purely for budget reasons are
    /// reported in `omitted` but excluded from `context`.
    pub fn search(&self, query: &RetrievalQuery) -> RetrievalResult {
        let ranked = self.score(query);
        let top: Vec<(String, f64)> = ranked.iter().take(query.top_k).cloned().collect();

        let mut context = String::new();
        let mut omitted = Vec::new();
        for (id, _) in &top {
            let Some(doc) = self.documents.iter().find(|d| &d.id == id) else {
                continue;
            };

            let mut candidate = if context.is_empty() {
                String::new()
            } else {
                "\n---\n".to_string()
            };
            candidate.push_str(&doc.text);

            if context.len() + candidate.len() <= query.token_budget {
                context.push_str(&candidate);
            } else {
                omitted.push(id.clone());
            }
        }

        RetrievalResult {
            ranked: top,
            context,
            omitted,
        }
    }
}

impl Default for RetrievalEngine {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeline_core::Priority;

    fn doc(id: &str, domain: &str, priority: Priority, keywords: &[&str], module_types: &[&str]) -> RetrievalDocument {
        RetrievalDocument {
            id: id.to_string(),
            domain: domain.to_string(),
            priority,
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            module_types: module_types.iter().map(|s| s.to_string()).collect(),
            search_weight: 0.7,
            text: format!("# {id}\n\nBody text for {id}."),
        }
    }

    #[test]
    fn empty_corpus_returns_empty_result_not_error() {
        let engine = RetrievalEngine::empty();
        let result = engine.search(&RetrievalQuery::new("uart baud rate"));
        assert!(result.ranked.is_empty());
        assert!(result.context.is_empty());
    }

    #[test]
    fn keyword_overlap_ranks_matching_document_first() {
        let engine = RetrievalEngine {
            documents: vec![
                doc("uart-guide", "protocol", Priority::High, &["uart", "baud", "serial"], &["all"]),
                doc("cooking", "general", Priority::Low, &["recipe", "oven"], &["all"]),
            ],
        };
        let ranked = engine.score(&RetrievalQuery::new("uart baud configuration"));
        assert_eq!(ranked[0].0, "uart-guide");
        assert!(ranked[0].1 > ranked[1].1);
    }

    #[test]
    fn module_type_mismatch_halves_score() {
        let matching = doc("comm-doc", "protocol", Priority::High, &["uart"], &["uart"]);
        let mismatched = doc("comm-doc-2", "protocol", Priority::High, &["uart"], &["i2c"]);
        let engine_match = RetrievalEngine { documents: vec![matching] };
        let engine_mismatch = RetrievalEngine { documents: vec![mismatched] };

        let query_match = RetrievalQuery::new("uart").with_module_type("uart");
        let query_mismatch = RetrievalQuery::new("uart").with_module_type("uart");

        let score_match = engine_match.score(&query_match)[0].1;
        let score_mismatch = engine_mismatch.score(&query_mismatch)[0].1;

        assert!((score_mismatch - score_match * 0.5).abs() < 1e-9);
    }

    #[test]
    fn ties_break_by_priority_then_id() {
        let engine = RetrievalEngine {
            documents: vec![
                doc("b-doc", "general", Priority::Low, &[], &["all"]),
                doc("a-doc", "general", Priority::High, &[], &["all"]),
                doc("c-doc", "general", Priority::High, &[], &["all"]),
            ],
        };
        let ranked = engine.score(&RetrievalQuery::new("nonmatching query"));
        // a-doc and c-doc tie on priority; "a-doc" sorts first by id.
        assert_eq!(ranked[0].0, "a-doc");
        assert_eq!(ranked[1].0, "c-doc");
        assert_eq!(ranked[2].0, "b-doc");
    }

    #[test]
    fn search_respects_character_budget_without_splitting_paragraphs() {
        let engine = RetrievalEngine {
            documents: vec![
                doc("first", "general", Priority::High, &["a"], &["all"]),
                doc("second", "general", Priority::High, &["a"], &["all"]),
            ],
        };
        let query = RetrievalQuery::new("a").with_top_k(2).with_token_budget(20);
        let result = engine.search(&query);
        assert!(result.context.len() <= 20 || result.omitted.len() >= 1);
    }
}
