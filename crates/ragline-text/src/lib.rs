//! ragline-text
//!
//! Keyword (BM25) retrieval over an existing tantivy index. Index layout lives
//! in `schema`; the query side in `search`.
pub mod schema;
pub mod search;

pub use schema::{build_schema, register_tokenizer, KeywordFields};
pub use search::TantivyKeywordIndex;
