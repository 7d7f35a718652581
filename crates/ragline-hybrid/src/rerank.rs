use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::debug;

use ragline_core::config::RerankConfig;
use ragline_core::error::BackendError;
use ragline_core::similarity::variance;
use ragline_core::traits::RerankService;
use ragline_core::types::{ChunkId, RerankedResult};

/// Cross-encoder reordering of the selected passages.
pub struct Reranker {
    service: Arc<dyn RerankService>,
}

impl Reranker {
    pub fn new(service: Arc<dyn RerankService>) -> Self {
        Self { service }
    }

    /// Scores the first `max_candidates` items in batches of `batch_size`
    /// (batches run concurrently, all bounded by one stage timeout) and
    /// returns the best `top_n`, ties keeping input order.
    ///
    /// A response that leaves out a submitted id is `Malformed`; scores for
    /// ids that were not submitted are ignored.
    pub async fn rerank(
        &self,
        query: &str,
        items: &[(ChunkId, String)],
        config: &RerankConfig,
    ) -> Result<Vec<RerankedResult>, BackendError> {
        let submitted = &items[..items.len().min(config.max_candidates)];
        if submitted.is_empty() {
            return Ok(Vec::new());
        }
        let timeout = config.timeout();
        let calls = submitted.chunks(config.batch_size.max(1)).map(|batch| self.service.score(query, batch));
        let responses = tokio::time::timeout(timeout, try_join_all(calls))
            .await
            .map_err(|_| BackendError::Timeout(timeout))??;

        let scores: HashMap<ChunkId, f32> = responses.into_iter().flatten().collect();
        let mut results = submitted
            .iter()
            .map(|(id, text)| {
                scores
                    .get(id)
                    .map(|&score| RerankedResult { source_id: id.clone(), text: text.clone(), score })
                    .ok_or_else(|| BackendError::Malformed(format!("reranker returned no score for '{id}'")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let values: Vec<f32> = results.iter().map(|r| r.score).collect();
        if results.len() > 1 && variance(&values).is_some_and(|v| v < 1e-9) {
            debug!(items = results.len(), "reranker scores are flat; order follows input");
        }
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(config.top_n);
        Ok(results)
    }
}
