//! LLM contextual compression: keep only the parts of a passage that bear on
//! the query, or drop the passage when nothing does.
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use ragline_core::config::CompressionConfig;
use ragline_core::error::BackendError;
use ragline_core::traits::CompletionService;
use ragline_core::types::{CompressedResult, CompressionOutcome, Passage};

/// Reply the model gives when a passage has nothing relevant.
pub const NO_OUTPUT: &str = "NO_OUTPUT";

pub struct ContextCompressor {
    llm: Arc<dyn CompletionService>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CompressionSummary {
    pub passages: Vec<Passage>,
    pub dropped: Vec<String>,
    pub failed: usize,
}

impl ContextCompressor {
    pub fn new(llm: Arc<dyn CompletionService>) -> Self {
        Self { llm }
    }

    pub fn prompt(query: &str, text: &str) -> String {
        format!(
            "Given the following question and context, extract any part of the context \
             *AS IS* that is relevant to answer the question. If none of the context is \
             relevant return {NO_OUTPUT}.\n\n\
             Remember, *DO NOT* edit the extracted parts of the context.\n\n\
             > Question: {query}\n\
             > Context:\n>>>\n{text}\n>>>\n\
             Extracted relevant parts:"
        )
    }

    /// `None` when the model judges the passage irrelevant. A failed or slow
    /// call yields the original text marked `Unchanged`.
    pub async fn compress(&self, query: &str, source_id: &str, text: &str, timeout: Duration) -> Option<CompressedResult> {
        let reply = tokio::time::timeout(timeout, self.llm.complete(&Self::prompt(query, text)))
            .await
            .map_err(|_| BackendError::Timeout(timeout))
            .and_then(|r| r);
        match reply {
            Ok(reply) => {
                let extracted = reply.trim();
                if extracted.is_empty() || extracted == NO_OUTPUT {
                    return None;
                }
                Some(CompressedResult {
                    source_id: source_id.to_string(),
                    text: extracted.to_string(),
                    outcome: CompressionOutcome::Extracted,
                })
            }
            Err(e) => {
                warn!(source_id, error = %e, "compression failed; keeping passage text");
                Some(CompressedResult {
                    source_id: source_id.to_string(),
                    text: text.to_string(),
                    outcome: CompressionOutcome::Unchanged,
                })
            }
        }
    }

    /// Compresses every passage with at most `concurrency` calls in flight.
    /// Surviving passages keep their order and ids.
    pub async fn compress_all(&self, query: &str, passages: Vec<Passage>, config: &CompressionConfig) -> CompressionSummary {
        let timeout = config.timeout();
        let outcomes: Vec<(Passage, Option<CompressedResult>)> = stream::iter(passages)
            .map(|p| async move {
                let result = self.compress(query, &p.id, &p.text, timeout).await;
                (p, result)
            })
            .buffered(config.concurrency.max(1))
            .collect()
            .await;

        let mut summary = CompressionSummary::default();
        for (mut passage, result) in outcomes {
            match result {
                None => summary.dropped.push(passage.id),
                Some(CompressedResult { text, outcome, .. }) => {
                    if outcome == CompressionOutcome::Extracted {
                        passage.text = text;
                        passage.compressed = true;
                    } else {
                        summary.failed += 1;
                    }
                    summary.passages.push(passage);
                }
            }
        }
        debug!(kept = summary.passages.len(), dropped = summary.dropped.len(), failed = summary.failed, "compression");
        summary
    }
}
