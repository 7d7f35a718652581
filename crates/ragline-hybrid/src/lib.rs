//! ragline-hybrid
//!
//! The retrieval and ranking pipeline: method retrievers over the two index
//! kinds, reciprocal rank fusion, MMR diversity selection, and the optional
//! LLM / cross-encoder stages, driven by `HybridSearchEngine`.
pub mod compress;
pub mod diversity;
pub mod expansion;
pub mod fusion;
pub mod parents;
pub mod pipeline;
pub mod report;
pub mod rerank;
pub mod retriever;

pub use compress::ContextCompressor;
pub use diversity::mmr_select;
pub use expansion::QueryExpander;
pub use fusion::fuse;
pub use parents::DocumentExpander;
pub use pipeline::HybridSearchEngine;
pub use report::{SearchReport, SearchResponse, StageStatus};
pub use rerank::Reranker;
pub use retriever::{KeywordRetriever, SemanticRetriever};
