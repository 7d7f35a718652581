use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ragline_core::config::BackendConfig;
use ragline_core::error::BackendError;
use ragline_core::traits::RerankService;
use ragline_core::types::ChunkId;

use crate::http::{check_status, client, transport_error};

/// Client for a cross-encoder service exposing `POST /rerank` in the
/// text-embeddings-inference shape: `{query, texts}` -> `[{index, score}]`.
#[derive(Clone)]
pub struct HttpReranker {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: Vec<&'a str>,
    truncate: bool,
}

#[derive(Deserialize)]
struct RerankScore {
    index: usize,
    score: f32,
}

impl HttpReranker {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        Ok(Self {
            client: client(timeout)?,
            endpoint: format!("{}/rerank", base_url.trim_end_matches('/')),
            timeout,
        })
    }

    pub fn from_config(backends: &BackendConfig) -> Result<Self, BackendError> {
        Self::new(&backends.rerank_url, backends.request_timeout())
    }
}

#[async_trait]
impl RerankService for HttpReranker {
    async fn score(&self, query: &str, items: &[(ChunkId, String)]) -> Result<Vec<(ChunkId, f32)>, BackendError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let request = RerankRequest { query, texts: items.iter().map(|(_, text)| text.as_str()).collect(), truncate: true };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        let scores: Vec<RerankScore> = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Malformed(format!("rerank body: {e}")))?;
        debug!(submitted = items.len(), scored = scores.len(), "rerank response");

        scores
            .into_iter()
            .map(|s| {
                items
                    .get(s.index)
                    .map(|(id, _)| (id.clone(), s.score))
                    .ok_or_else(|| BackendError::Malformed(format!("rerank index {} out of range", s.index)))
            })
            .collect()
    }
}
