//! Seams between the engine and the systems it calls.
//!
//! The orchestrator only ever holds `Arc<dyn ...>` of these traits, so index
//! technologies and model services can change per deployment.

use async_trait::async_trait;

use crate::error::BackendError;
use crate::types::{ChunkId, Filters, IndexHit, Method, ParentDocument, RankedList};

pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Nearest neighbours of `query_vec`, best first, at most `k`.
    async fn search(&self, query_vec: &[f32], k: usize, filters: &Filters) -> Result<Vec<IndexHit>, BackendError>;
}

#[async_trait]
pub trait KeywordIndex: Send + Sync {
    /// Lexical (BM25) matches for `query`, best first, at most `k`.
    async fn search(&self, query: &str, k: usize, filters: &Filters) -> Result<Vec<IndexHit>, BackendError>;
}

#[async_trait]
pub trait ParentStore: Send + Sync {
    /// `Ok(None)` when no parent with that id exists.
    async fn lookup(&self, parent_id: &str) -> Result<Option<ParentDocument>, BackendError>;
}

#[async_trait]
pub trait RerankService: Send + Sync {
    /// Scores each `(id, text)` pair against `query`. Scores are comparable
    /// within one call only; result order is unspecified.
    async fn score(&self, query: &str, items: &[(ChunkId, String)]) -> Result<Vec<(ChunkId, f32)>, BackendError>;
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError>;
}

/// One adapter per backing index. Implementations do not retry; an empty
/// list is a valid answer.
#[async_trait]
pub trait MethodRetriever: Send + Sync {
    fn method(&self) -> Method;

    async fn retrieve(
        &self,
        query_text: &str,
        variant: usize,
        filters: &Filters,
        top_k: usize,
    ) -> Result<RankedList, BackendError>;
}
