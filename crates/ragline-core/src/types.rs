//! Domain types shared by the retrievers, the ranking stages and the
//! orchestrator.
//!
//! Every value here is created for a single query and never mutated after
//! construction; stages that "change" a result build a new one that carries
//! the same source id.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub type ChunkId = String;
pub type Filters = BTreeMap<String, String>;

/// Indicates which retrieval method produced a candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Semantic,
    Keyword,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Semantic => f.write_str("semantic"),
            Method::Keyword => f.write_str("keyword"),
        }
    }
}

/// Pipeline stages. Only the optional ones may appear in
/// `SearchConfig::stages`; the rest always run and show up in reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    QueryExpansion,
    Retrieval,
    Fusion,
    Diversity,
    ParentExpansion,
    Rerank,
    Compression,
}

impl Stage {
    pub fn is_optional(self) -> bool {
        matches!(
            self,
            Stage::QueryExpansion | Stage::ParentExpansion | Stage::Rerank | Stage::Compression
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::QueryExpansion => "query_expansion",
            Stage::Retrieval => "retrieval",
            Stage::Fusion => "fusion",
            Stage::Diversity => "diversity",
            Stage::ParentExpansion => "parent_expansion",
            Stage::Rerank => "rerank",
            Stage::Compression => "compression",
        };
        f.write_str(name)
    }
}

/// A search request: the raw text, metadata filters and the variant texts
/// that retrieval fans out over. The original text is always variant 0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Query {
    text: String,
    filters: Filters,
    variants: Vec<String>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self { variants: vec![text.clone()], text, filters: Filters::new() }
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Returns a new query whose variants are the original text followed by
    /// `expansions`.
    pub fn with_expansions(&self, expansions: impl IntoIterator<Item = String>) -> Self {
        let mut variants = vec![self.text.clone()];
        variants.extend(expansions);
        Self { text: self.text.clone(), filters: self.filters.clone(), variants }
    }

    pub fn text(&self) -> &str { &self.text }
    pub fn filters(&self) -> &Filters { &self.filters }
    pub fn variants(&self) -> &[String] { &self.variants }
}

/// One row returned by a backing index, before it is tagged with a method.
///
/// `score` is index-specific (cosine similarity, BM25, ...); higher is better.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexHit {
    pub id: ChunkId,
    pub text: String,
    pub score: f32,
    pub embedding: Option<Vec<f32>>,
    pub parent_id: Option<ChunkId>,
}

/// A retrieved unit tagged with the method that found it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub id: ChunkId,
    pub text: String,
    pub method: Method,
    pub score: f32,
    pub embedding: Option<Vec<f32>>,
    pub parent_id: Option<ChunkId>,
}

impl Candidate {
    pub fn from_hit(hit: IndexHit, method: Method) -> Self {
        Self {
            id: hit.id,
            text: hit.text,
            method,
            score: hit.score,
            embedding: hit.embedding,
            parent_id: hit.parent_id,
        }
    }

    /// Copy of this candidate carrying `embedding`.
    pub fn with_embedding(&self, embedding: Vec<f32>) -> Self {
        Self { embedding: Some(embedding), ..self.clone() }
    }
}

/// Ordered output of one (query variant, method) retrieval call. Position is
/// the contract; scores are not comparable with other lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedList {
    pub variant: usize,
    pub method: Method,
    pub candidates: Vec<Candidate>,
}

impl RankedList {
    pub fn len(&self) -> usize { self.candidates.len() }
    pub fn is_empty(&self) -> bool { self.candidates.is_empty() }
}

/// Where a fused candidate was seen: list identity and 0-indexed rank.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contribution {
    pub variant: usize,
    pub method: Method,
    pub rank: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provenance {
    pub contributions: Vec<Contribution>,
}

impl Provenance {
    pub fn min_rank(&self) -> Option<usize> {
        self.contributions.iter().map(|c| c.rank).min()
    }

    pub fn methods(&self) -> BTreeSet<Method> {
        self.contributions.iter().map(|c| c.method).collect()
    }
}

/// A candidate after reciprocal rank fusion. `rrf_score` is comparable only
/// with other results of the same fusion call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FusedResult {
    pub candidate: Candidate,
    pub rrf_score: f64,
    pub provenance: Provenance,
}

impl FusedResult {
    pub fn id(&self) -> &str { &self.candidate.id }
}

/// Output of the diversity selector. `excluded` lists candidates that could
/// not take part in diversity scoring because they had no embedding.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SelectionResult {
    pub items: Vec<FusedResult>,
    pub excluded: Vec<ChunkId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParentDocument {
    pub id: ChunkId,
    pub text: String,
}

/// Cross-encoder score for one (query, text) pair; only comparable within the
/// rerank call that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RerankedResult {
    pub source_id: ChunkId,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompressionOutcome {
    Extracted,
    /// The compression call failed; the original text is kept.
    Unchanged,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompressedResult {
    pub source_id: ChunkId,
    pub text: String,
    pub outcome: CompressionOutcome,
}

/// A final result item.
///
/// - `id`: the original candidate id, unchanged by every stage
/// - `text`: the payload, possibly parent-expanded and/or compressed
/// - `parent_id`: the candidate's parent mapping, if it has one
/// - `expanded`: `text` was replaced by the parent document's text
/// - `rerank_score`: set only when the reranker ran successfully
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passage {
    pub id: ChunkId,
    pub text: String,
    pub provenance: Provenance,
    pub rrf_score: f64,
    pub rerank_score: Option<f32>,
    pub parent_id: Option<ChunkId>,
    pub expanded: bool,
    pub compressed: bool,
}

impl Passage {
    pub fn from_fused(fused: &FusedResult) -> Self {
        Self {
            id: fused.candidate.id.clone(),
            text: fused.candidate.text.clone(),
            provenance: fused.provenance.clone(),
            rrf_score: fused.rrf_score,
            rerank_score: None,
            parent_id: fused.candidate.parent_id.clone(),
            expanded: false,
            compressed: false,
        }
    }
}
