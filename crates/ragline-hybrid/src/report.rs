//! What a search did, alongside what it returned.
use std::time::Duration;

use serde::Serialize;

use ragline_core::types::{ChunkId, Method, Passage, Stage};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchResponse {
    pub passages: Vec<Passage>,
    pub report: SearchReport,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    Ran,
    Skipped { reason: String },
    Degraded { reason: String },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StageOutcome {
    pub stage: Stage,
    #[serde(flatten)]
    pub status: StageStatus,
    pub elapsed: Duration,
}

/// One (variant, method) retrieval call.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RetrievalCall {
    pub variant: usize,
    pub method: Method,
    pub attempts: u32,
    /// Candidates returned, or `None` if every attempt failed.
    pub hits: Option<usize>,
    pub error: Option<String>,
}

impl RetrievalCall {
    pub fn succeeded(&self) -> bool {
        self.hits.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SearchReport {
    pub variants: Vec<String>,
    pub calls: Vec<RetrievalCall>,
    /// In execution order. Optional stages that were not enabled are absent.
    pub stages: Vec<StageOutcome>,
    pub diversity_excluded: Vec<ChunkId>,
    pub compression_dropped: Vec<ChunkId>,
    pub elapsed: Duration,
}

impl SearchReport {
    pub fn status(&self, stage: Stage) -> Option<&StageStatus> {
        self.stages.iter().find(|s| s.stage == stage).map(|s| &s.status)
    }

    /// Whether `stage` ran to completion without falling back.
    pub fn ran(&self, stage: Stage) -> bool {
        matches!(self.status(stage), Some(StageStatus::Ran))
    }

    pub fn degraded(&self) -> bool {
        self.stages.iter().any(|s| matches!(s.status, StageStatus::Degraded { .. }))
    }

    pub(crate) fn record(&mut self, stage: Stage, status: StageStatus, elapsed: Duration) {
        self.stages.push(StageOutcome { stage, status, elapsed });
    }
}
