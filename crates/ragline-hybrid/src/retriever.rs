//! `MethodRetriever` adapters over the semantic and keyword indices.
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::debug;

use ragline_core::error::BackendError;
use ragline_core::traits::{Embedder, KeywordIndex, MethodRetriever, SemanticIndex};
use ragline_core::types::{Candidate, Filters, IndexHit, Method, RankedList};

/// Runs a (synchronous, CPU-bound) embedding batch on the blocking pool.
pub(crate) async fn embed_blocking(embedder: Arc<dyn Embedder>, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
    let expected = texts.len();
    let vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
        .await
        .map_err(|e| anyhow!("embedding task failed: {e}"))??;
    if vectors.len() != expected {
        return Err(anyhow!("embedder returned {} vectors for {expected} texts", vectors.len()));
    }
    Ok(vectors)
}

fn ranked(variant: usize, method: Method, hits: Vec<IndexHit>, top_k: usize) -> RankedList {
    let candidates = hits.into_iter().take(top_k).map(|h| Candidate::from_hit(h, method)).collect();
    RankedList { variant, method, candidates }
}

/// Embeds the query text, then asks the vector index for its neighbours.
pub struct SemanticRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn SemanticIndex>,
}

impl SemanticRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn SemanticIndex>) -> Self {
        Self { embedder, index }
    }
}

#[async_trait]
impl MethodRetriever for SemanticRetriever {
    fn method(&self) -> Method {
        Method::Semantic
    }

    async fn retrieve(&self, query_text: &str, variant: usize, filters: &Filters, top_k: usize) -> Result<RankedList, BackendError> {
        if top_k == 0 {
            return Ok(ranked(variant, Method::Semantic, Vec::new(), 0));
        }
        let mut vectors = embed_blocking(self.embedder.clone(), vec![query_text.to_string()])
            .await
            .map_err(|e| BackendError::Unavailable(format!("query embedding: {e}")))?;
        let query_vec = vectors.pop().unwrap_or_default();
        let hits = self.index.search(&query_vec, top_k, filters).await?;
        debug!(variant, hits = hits.len(), "semantic retrieval");
        Ok(ranked(variant, Method::Semantic, hits, top_k))
    }
}

pub struct KeywordRetriever {
    index: Arc<dyn KeywordIndex>,
}

impl KeywordRetriever {
    pub fn new(index: Arc<dyn KeywordIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl MethodRetriever for KeywordRetriever {
    fn method(&self) -> Method {
        Method::Keyword
    }

    async fn retrieve(&self, query_text: &str, variant: usize, filters: &Filters, top_k: usize) -> Result<RankedList, BackendError> {
        if top_k == 0 {
            return Ok(ranked(variant, Method::Keyword, Vec::new(), 0));
        }
        let hits = self.index.search(query_text, top_k, filters).await?;
        debug!(variant, hits = hits.len(), "keyword retrieval");
        Ok(ranked(variant, Method::Keyword, hits, top_k))
    }
}
