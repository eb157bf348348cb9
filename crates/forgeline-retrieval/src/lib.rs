//! The retrieval-augmented context layer: scores a fixed markdown corpus
//! against a query using the keyword/domain/priority/search-weight
//! formula and concatenates the top results under a character budget.

mod document;
mod engine;
mod query;

pub use document::{tokenize, DocumentTags, RetrievalDocument};
pub use engine::{RetrievalEngine, RetrievalResult};
pub use query::RetrievalQuery;
