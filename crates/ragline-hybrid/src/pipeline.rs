//! HybridSearchEngine: the per-query state machine.
//!
//! Expanding -> Retrieving -> Fusing -> Selecting -> ExpandingDocs -> Reranking
//! -> Compressing -> Done. The order is fixed; `SearchConfig::stages` only
//! decides which of the optional states run.
//! Every optional stage degrades to a pass-through; only a retrieval round in
//! which no call succeeds fails the search.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ragline_core::config::{MissingEmbedding, RetrievalConfig, SearchConfig};
use ragline_core::error::{BackendError, Error, Result};
use ragline_core::traits::{CompletionService, Embedder, MethodRetriever, ParentStore, RerankService};
use ragline_core::types::{Filters, FusedResult, Passage, Query, RankedList, SelectionResult, Stage};

use crate::compress::ContextCompressor;
use crate::diversity;
use crate::expansion::QueryExpander;
use crate::fusion::fuse;
use crate::parents::DocumentExpander;
use crate::report::{RetrievalCall, SearchReport, SearchResponse, StageStatus};
use crate::rerank::Reranker;
use crate::retriever::embed_blocking;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Expanding,
    Retrieving,
    Fusing,
    Selecting,
    ExpandingDocs,
    Reranking,
    Compressing,
    Done,
}

/// States a search walks through under `config`, in order.
fn plan(config: &SearchConfig) -> Vec<PipelineState> {
    let mut states = Vec::new();
    if config.enabled(Stage::QueryExpansion) {
        states.push(PipelineState::Expanding);
    }
    states.extend([PipelineState::Retrieving, PipelineState::Fusing, PipelineState::Selecting]);
    let optional = [
        (Stage::ParentExpansion, PipelineState::ExpandingDocs),
        (Stage::Rerank, PipelineState::Reranking),
        (Stage::Compression, PipelineState::Compressing),
    ];
    states.extend(optional.into_iter().filter(|(stage, _)| config.enabled(*stage)).map(|(_, state)| state));
    states.push(PipelineState::Done);
    states
}

/// Per-query working data threaded through the states.
struct Run<'q> {
    query: Query,
    config: &'q SearchConfig,
    lists: Vec<RankedList>,
    fused: Vec<FusedResult>,
    passages: Vec<Passage>,
    report: SearchReport,
}

pub struct HybridSearchEngine {
    embedder: Arc<dyn Embedder>,
    retrievers: Vec<Arc<dyn MethodRetriever>>,
    expander: Option<QueryExpander>,
    parents: Option<DocumentExpander>,
    reranker: Option<Reranker>,
    compressor: Option<ContextCompressor>,
}

impl HybridSearchEngine {
    /// `embedder` embeds queries and any candidate that reaches the diversity
    /// stage without a vector.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder, retrievers: Vec::new(), expander: None, parents: None, reranker: None, compressor: None }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn MethodRetriever>) -> Self {
        self.retrievers.push(retriever);
        self
    }

    pub fn with_parent_store(mut self, store: Arc<dyn ParentStore>) -> Self {
        self.parents = Some(DocumentExpander::new(store));
        self
    }

    pub fn with_reranker(mut self, service: Arc<dyn RerankService>) -> Self {
        self.reranker = Some(Reranker::new(service));
        self
    }

    /// The completion service backs both query expansion and compression.
    pub fn with_completion(mut self, llm: Arc<dyn CompletionService>) -> Self {
        self.expander = Some(QueryExpander::new(llm.clone()));
        self.compressor = Some(ContextCompressor::new(llm));
        self
    }

    pub async fn search(&self, query: &Query, config: &SearchConfig) -> Result<SearchResponse> {
        self.search_with_cancel(query, config, &CancellationToken::new()).await
    }

    /// Runs a search that stops with `Error::Cancelled` as soon as `cancel`
    /// fires, or `Error::DeadlineExceeded` once `config.deadline_ms` passes.
    /// Pending backend calls are dropped either way.
    pub async fn search_with_cancel(
        &self,
        query: &Query,
        config: &SearchConfig,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse> {
        config.validate()?;
        if query.text().trim().is_empty() {
            return Err(Error::InvalidQuery("query text is empty".into()));
        }
        if self.retrievers.is_empty() {
            return Err(Error::InvalidConfig("no retrievers configured".into()));
        }

        let bounded = async {
            match config.deadline() {
                Some(deadline) => tokio::time::timeout(deadline, self.run(query, config))
                    .await
                    .unwrap_or(Err(Error::DeadlineExceeded(deadline))),
                None => self.run(query, config).await,
            }
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!(query = query.text(), "search cancelled");
                Err(Error::Cancelled)
            }
            result = bounded => result,
        }
    }

    async fn run(&self, query: &Query, config: &SearchConfig) -> Result<SearchResponse> {
        let started = Instant::now();
        let mut run = Run {
            query: query.clone(),
            config,
            lists: Vec::new(),
            fused: Vec::new(),
            passages: Vec::new(),
            report: SearchReport::default(),
        };

        for state in plan(config) {
            debug!(?state, "pipeline state");
            let t0 = Instant::now();
            let (stage, status) = match state {
                PipelineState::Expanding => (Stage::QueryExpansion, self.expand_query(&mut run).await),
                PipelineState::Retrieving => (Stage::Retrieval, self.retrieve(&mut run).await?),
                PipelineState::Fusing => (Stage::Fusion, Self::fuse(&mut run)),
                PipelineState::Selecting => (Stage::Diversity, self.select(&mut run).await),
                PipelineState::ExpandingDocs => (Stage::ParentExpansion, self.expand_docs(&mut run).await),
                PipelineState::Reranking => (Stage::Rerank, self.rerank(&mut run).await),
                PipelineState::Compressing => (Stage::Compression, self.compress(&mut run).await),
                PipelineState::Done => break,
            };
            if let StageStatus::Skipped { reason } | StageStatus::Degraded { reason } = &status {
                warn!(%stage, reason = reason.as_str(), "stage did not run normally");
            }
            run.report.record(stage, status, t0.elapsed());
        }

        run.report.variants = run.query.variants().to_vec();
        run.report.elapsed = started.elapsed();
        info!(
            query = query.text(),
            variants = run.report.variants.len(),
            passages = run.passages.len(),
            degraded = run.report.degraded(),
            elapsed_ms = run.report.elapsed.as_millis() as u64,
            "search finished"
        );
        Ok(SearchResponse { passages: run.passages, report: run.report })
    }

    async fn expand_query(&self, run: &mut Run<'_>) -> StageStatus {
        let Some(expander) = &self.expander else {
            return StageStatus::Skipped { reason: "no completion service configured".into() };
        };
        let cfg = &run.config.expansion;
        match expander.try_expand(run.query.text(), cfg.variants, cfg.timeout()).await {
            Ok(variants) => {
                run.query = run.query.with_expansions(variants.into_iter().skip(1));
                StageStatus::Ran
            }
            Err(e) => StageStatus::Degraded { reason: format!("expansion failed, using the original query: {e}") },
        }
    }

    async fn retrieve(&self, run: &mut Run<'_>) -> Result<StageStatus> {
        let cfg = &run.config.retrieval;
        let filters = run.query.filters();
        let calls = run.query.variants().iter().enumerate().flat_map(|(variant, text)| {
            self.retrievers
                .iter()
                .map(move |retriever| call_with_retry(retriever.as_ref(), text, variant, filters, cfg))
        });
        let outcomes = join_all(calls).await;

        let attempted = outcomes.len();
        let mut last_error = None;
        for (call, outcome) in outcomes {
            match outcome {
                Ok(list) => run.lists.push(list),
                Err(e) => last_error = Some(e),
            }
            run.report.calls.push(call);
        }
        let failed = attempted - run.lists.len();
        if run.lists.is_empty() {
            let last_error = last_error.unwrap_or_else(|| BackendError::Unavailable("no retrieval calls made".into()));
            warn!(attempted, error = %last_error, "every retrieval call failed");
            return Err(Error::Failed { attempted, last_error });
        }
        Ok(if failed == 0 {
            StageStatus::Ran
        } else {
            StageStatus::Degraded { reason: format!("{failed} of {attempted} retrieval calls failed") }
        })
    }

    fn fuse(run: &mut Run<'_>) -> StageStatus {
        let cfg = &run.config.fusion;
        run.fused = fuse(&run.lists, cfg.k, cfg.tie_break);
        debug!(lists = run.lists.len(), fused = run.fused.len(), "fused");
        StageStatus::Ran
    }

    async fn select(&self, run: &mut Run<'_>) -> StageStatus {
        let cfg = &run.config.diversity;
        let fused = std::mem::take(&mut run.fused);

        let query_vec = match embed_blocking(self.embedder.clone(), vec![run.query.text().to_string()]).await {
            Ok(mut v) => v.pop().unwrap_or_default(),
            Err(e) => {
                run.passages = fused.iter().take(cfg.k).map(Passage::from_fused).collect();
                return StageStatus::Degraded { reason: format!("query embedding failed, keeping fused order: {e}") };
            }
        };

        let (pool, embed_error) = match cfg.missing_embedding {
            MissingEmbedding::Exclude => (fused, None),
            MissingEmbedding::Embed => self.embed_missing(fused).await,
        };
        let SelectionResult { items, excluded } = diversity::select(&query_vec, pool, cfg.k, cfg.lambda);
        run.passages = items.iter().map(Passage::from_fused).collect();
        run.report.diversity_excluded = excluded;
        let unscored = run.report.diversity_excluded.len();
        match embed_error {
            Some(e) => StageStatus::Degraded { reason: format!("{unscored} candidates not diversity-scored, embedding failed: {e}") },
            None if unscored > 0 => StageStatus::Degraded {
                reason: format!("{unscored} candidates without embeddings not diversity-scored, kept in fused order"),
            },
            None => StageStatus::Ran,
        }
    }

    /// Gives every candidate without a vector one from the engine's embedder.
    /// On failure the pool is returned as it was, with the error.
    async fn embed_missing(&self, mut fused: Vec<FusedResult>) -> (Vec<FusedResult>, Option<anyhow::Error>) {
        let missing: Vec<usize> = (0..fused.len()).filter(|&i| fused[i].candidate.embedding.is_none()).collect();
        if missing.is_empty() {
            return (fused, None);
        }
        let texts = missing.iter().map(|&i| fused[i].candidate.text.clone()).collect();
        match embed_blocking(self.embedder.clone(), texts).await {
            Ok(vectors) => {
                for (i, vector) in missing.into_iter().zip(vectors) {
                    fused[i].candidate = fused[i].candidate.with_embedding(vector);
                }
                (fused, None)
            }
            Err(e) => (fused, Some(e)),
        }
    }

    async fn expand_docs(&self, run: &mut Run<'_>) -> StageStatus {
        let Some(expander) = &self.parents else {
            return StageStatus::Skipped { reason: "no parent store configured".into() };
        };
        let (passages, summary) = expander.expand_all(std::mem::take(&mut run.passages), &run.config.parents).await;
        run.passages = passages;
        if summary.failed == 0 {
            StageStatus::Ran
        } else {
            StageStatus::Degraded { reason: format!("{} parent lookups failed", summary.failed) }
        }
    }

    async fn rerank(&self, run: &mut Run<'_>) -> StageStatus {
        let Some(reranker) = &self.reranker else {
            return StageStatus::Skipped { reason: "no reranker configured".into() };
        };
        let cfg = &run.config.rerank;
        let items: Vec<(String, String)> = run.passages.iter().map(|p| (p.id.clone(), p.text.clone())).collect();
        match reranker.rerank(run.query.text(), &items, cfg).await {
            Ok(results) => {
                let mut by_id: HashMap<String, Passage> =
                    std::mem::take(&mut run.passages).into_iter().map(|p| (p.id.clone(), p)).collect();
                let mut reordered: Vec<Passage> = results
                    .into_iter()
                    .filter_map(|r| {
                        by_id.remove(&r.source_id).map(|mut p| {
                            p.rerank_score = Some(r.score);
                            p
                        })
                    })
                    .collect();
                // passages past max_candidates were never scored; they follow in their prior order
                reordered.extend(items.iter().skip(cfg.max_candidates).filter_map(|(id, _)| by_id.remove(id)));
                reordered.truncate(cfg.top_n);
                run.passages = reordered;
                StageStatus::Ran
            }
            Err(e) => {
                run.passages.truncate(cfg.top_n);
                StageStatus::Degraded { reason: format!("rerank failed, keeping prior order: {e}") }
            }
        }
    }

    async fn compress(&self, run: &mut Run<'_>) -> StageStatus {
        let Some(compressor) = &self.compressor else {
            return StageStatus::Skipped { reason: "no completion service configured".into() };
        };
        let summary =
            compressor.compress_all(run.query.text(), std::mem::take(&mut run.passages), &run.config.compression).await;
        run.passages = summary.passages;
        run.report.compression_dropped = summary.dropped;
        if summary.failed == 0 {
            StageStatus::Ran
        } else {
            StageStatus::Degraded { reason: format!("{} compression calls failed, text kept", summary.failed) }
        }
    }
}

/// One (variant, retriever) call under the per-call timeout, retried while the
/// error is transient and attempts remain.
async fn call_with_retry(
    retriever: &dyn MethodRetriever,
    text: &str,
    variant: usize,
    filters: &Filters,
    cfg: &RetrievalConfig,
) -> (RetrievalCall, std::result::Result<RankedList, BackendError>) {
    let method = retriever.method();
    let timeout = cfg.timeout();
    let mut attempts = 0;
    loop {
        attempts += 1;
        let outcome = match tokio::time::timeout(timeout, retriever.retrieve(text, variant, filters, cfg.top_k)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(timeout)),
        };
        match outcome {
            Ok(mut list) => {
                list.variant = variant;
                list.method = method;
                list.candidates.truncate(cfg.top_k);
                let call = RetrievalCall { variant, method, attempts, hits: Some(list.len()), error: None };
                return (call, Ok(list));
            }
            Err(e) if e.is_retryable() && attempts <= cfg.retries => {
                warn!(variant, %method, attempts, error = %e, "retrieval call failed; retrying");
            }
            Err(e) => {
                warn!(variant, %method, attempts, error = %e, "retrieval call failed");
                let call = RetrievalCall { variant, method, attempts, hits: None, error: Some(e.to_string()) };
                return (call, Err(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_order_is_fixed_whatever_the_list_order() {
        let config = SearchConfig::default().with_stages([Stage::Rerank, Stage::QueryExpansion, Stage::ParentExpansion]);
        assert_eq!(
            plan(&config),
            vec![
                PipelineState::Expanding,
                PipelineState::Retrieving,
                PipelineState::Fusing,
                PipelineState::Selecting,
                PipelineState::ExpandingDocs,
                PipelineState::Reranking,
                PipelineState::Done,
            ]
        );
        let config = SearchConfig::default().with_stages([Stage::Compression, Stage::Rerank]);
        assert_eq!(
            plan(&config),
            vec![
                PipelineState::Retrieving,
                PipelineState::Fusing,
                PipelineState::Selecting,
                PipelineState::Reranking,
                PipelineState::Compressing,
                PipelineState::Done,
            ]
        );
        assert_eq!(
            plan(&SearchConfig::default()),
            vec![PipelineState::Retrieving, PipelineState::Fusing, PipelineState::Selecting, PipelineState::Done]
        );
    }
}
