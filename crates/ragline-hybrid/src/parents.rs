//! Small-to-big expansion: swap a matched chunk's text for its parent
//! document's text.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use ragline_core::config::ParentConfig;
use ragline_core::error::BackendError;
use ragline_core::traits::ParentStore;
use ragline_core::types::{Candidate, ParentDocument, Passage};

pub struct DocumentExpander {
    store: Arc<dyn ParentStore>,
}

/// What happened to the lookups of one `expand_all` call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExpansionSummary {
    pub expanded: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl DocumentExpander {
    pub fn new(store: Arc<dyn ParentStore>) -> Self {
        Self { store }
    }

    async fn fetch(&self, parent_id: &str, timeout: Duration) -> Result<Option<ParentDocument>, BackendError> {
        tokio::time::timeout(timeout, self.store.lookup(parent_id))
            .await
            .map_err(|_| BackendError::Timeout(timeout))?
    }

    /// Text to present for `candidate`: its parent's text when it has a parent
    /// that can be fetched, otherwise its own.
    pub async fn expand(&self, candidate: &Candidate, timeout: Duration) -> String {
        let Some(parent_id) = candidate.parent_id.as_deref() else {
            return candidate.text.clone();
        };
        match self.fetch(parent_id, timeout).await {
            Ok(Some(doc)) => doc.text,
            Ok(None) => candidate.text.clone(),
            Err(e) => {
                warn!(parent_id, error = %e, "parent lookup failed; keeping chunk text");
                candidate.text.clone()
            }
        }
    }

    /// Expands every passage, keeping order. Each distinct parent id is looked
    /// up once, at most `concurrency` lookups in flight.
    pub async fn expand_all(&self, passages: Vec<Passage>, config: &ParentConfig) -> (Vec<Passage>, ExpansionSummary) {
        let mut seen = HashSet::new();
        let parent_ids: Vec<String> = passages
            .iter()
            .filter_map(|p| p.parent_id.clone())
            .filter(|id| seen.insert(id.clone()))
            .collect();
        let timeout = config.timeout();
        let fetched: HashMap<String, Result<Option<ParentDocument>, BackendError>> = stream::iter(parent_ids)
            .map(|id| async move {
                let result = self.fetch(&id, timeout).await;
                (id, result)
            })
            .buffer_unordered(config.concurrency.max(1))
            .collect()
            .await;

        let mut summary = ExpansionSummary::default();
        for (id, result) in &fetched {
            match result {
                Ok(Some(_)) => summary.expanded += 1,
                Ok(None) => summary.not_found += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(parent_id = %id, error = %e, "parent lookup failed; keeping chunk text");
                }
            }
        }
        debug!(?summary, "parent expansion");

        let passages = passages
            .into_iter()
            .map(|mut p| {
                if let Some(Ok(Some(doc))) = p.parent_id.as_ref().and_then(|id| fetched.get(id)) {
                    p.text = doc.text.clone();
                    p.expanded = true;
                }
                p
            })
            .collect();
        (passages, summary)
    }
}
