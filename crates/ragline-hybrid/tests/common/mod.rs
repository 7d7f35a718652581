#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use ragline_core::error::BackendError;
use ragline_core::traits::{CompletionService, Embedder, MethodRetriever, ParentStore, RerankService};
use ragline_core::types::{Candidate, ChunkId, Filters, Method, ParentDocument, RankedList};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().with_env_filter("debug").try_init();
}

/// Same vector for every text, so MMR keeps fused order.
pub struct FixedEmbedder(pub Vec<f32>);

impl Embedder for FixedEmbedder {
    fn dim(&self) -> usize { self.0.len() }
    fn max_len(&self) -> usize { 512 }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| self.0.clone()).collect())
    }
}

pub struct BrokenEmbedder;

impl Embedder for BrokenEmbedder {
    fn dim(&self) -> usize { 4 }
    fn max_len(&self) -> usize { 512 }
    fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("embedding model offline")
    }
}

pub fn unit() -> Arc<dyn Embedder> {
    Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0, 0.0]))
}

pub enum Behaviour {
    /// Returns these ids for every variant.
    Ids(Vec<&'static str>),
    /// Returns ids per variant index; variants past the end get nothing.
    PerVariant(Vec<Vec<&'static str>>),
    Fail(BackendError),
    /// Sleeps far past any stage timeout.
    Hang,
    /// Fails with `Unavailable` this many times, then returns the ids.
    Flaky(usize, Vec<&'static str>),
}

pub struct FakeRetriever {
    pub method: Method,
    pub behaviour: Behaviour,
    pub with_embeddings: bool,
    pub calls: AtomicUsize,
    pub seen: std::sync::Mutex<Vec<(usize, String)>>,
}

impl FakeRetriever {
    pub fn new(method: Method, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            method,
            behaviour,
            with_embeddings: method == Method::Semantic,
            calls: AtomicUsize::new(0),
            seen: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<(usize, String)> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn list(&self, variant: usize, ids: &[&str], top_k: usize) -> RankedList {
        let candidates = ids
            .iter()
            .take(top_k)
            .enumerate()
            .map(|(rank, id)| Candidate {
                id: id.to_string(),
                text: chunk_text(id),
                method: self.method,
                score: 1.0 - rank as f32 * 0.01,
                embedding: self.with_embeddings.then(|| vec![1.0, 0.0, 0.0, 0.0]),
                parent_id: parent_of(id),
            })
            .collect();
        RankedList { variant, method: self.method, candidates }
    }
}

pub fn chunk_text(id: &str) -> String {
    format!("chunk {id} text")
}

/// Ids with a `p-` sibling in `parents()`: everything starting with `A` or `B`.
pub fn parent_of(id: &str) -> Option<String> {
    match id.chars().next() {
        Some('A') | Some('B') => Some(format!("p-{}", &id[..1])),
        _ => None,
    }
}

#[async_trait]
impl MethodRetriever for FakeRetriever {
    fn method(&self) -> Method {
        self.method
    }

    async fn retrieve(&self, query_text: &str, variant: usize, _filters: &Filters, top_k: usize) -> Result<RankedList, BackendError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push((variant, query_text.to_string()));
        }
        match &self.behaviour {
            Behaviour::Ids(ids) => Ok(self.list(variant, ids, top_k)),
            Behaviour::PerVariant(per) => Ok(self.list(variant, per.get(variant).map_or(&[][..], |v| v.as_slice()), top_k)),
            Behaviour::Fail(e) => Err(e.clone()),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(self.list(variant, &[], top_k))
            }
            Behaviour::Flaky(failures, ids) => {
                if attempt < *failures {
                    Err(BackendError::Unavailable("connection reset".into()))
                } else {
                    Ok(self.list(variant, ids, top_k))
                }
            }
        }
    }
}

/// Completion service answering through a closure over the prompt.
pub struct ScriptedLlm {
    reply: Box<dyn Fn(&str) -> Result<String, BackendError> + Send + Sync>,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(reply: impl Fn(&str) -> Result<String, BackendError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self { reply: Box::new(reply), delay: Duration::ZERO, calls: AtomicUsize::new(0) })
    }

    pub fn slow(delay: Duration, reply: impl Fn(&str) -> Result<String, BackendError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self { reply: Box::new(reply), delay, calls: AtomicUsize::new(0) })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionService for ScriptedLlm {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.reply)(prompt)
    }
}

/// Cross-encoder stand-in with fixed per-id scores.
pub struct TableReranker {
    pub scores: HashMap<&'static str, f32>,
    pub fail: Option<BackendError>,
    pub calls: AtomicUsize,
}

impl TableReranker {
    pub fn new(scores: &[(&'static str, f32)]) -> Arc<Self> {
        Arc::new(Self { scores: scores.iter().copied().collect(), fail: None, calls: AtomicUsize::new(0) })
    }

    pub fn failing(error: BackendError) -> Arc<Self> {
        Arc::new(Self { scores: HashMap::new(), fail: Some(error), calls: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl RerankService for TableReranker {
    async fn score(&self, _query: &str, items: &[(ChunkId, String)]) -> Result<Vec<(ChunkId, f32)>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = &self.fail {
            return Err(e.clone());
        }
        Ok(items
            .iter()
            .rev()
            .map(|(id, _)| (id.clone(), self.scores.get(id.as_str()).copied().unwrap_or(0.0)))
            .collect())
    }
}

pub struct MemoryParents {
    docs: HashMap<String, String>,
    fail_on: Option<&'static str>,
    pub lookups: std::sync::Mutex<Vec<String>>,
}

impl MemoryParents {
    pub fn new() -> Arc<Self> {
        Self::failing_on(None)
    }

    pub fn failing_on(fail_on: Option<&'static str>) -> Arc<Self> {
        let docs = [("p-A", "parent document A in full"), ("p-B", "parent document B in full")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Arc::new(Self { docs, fail_on, lookups: std::sync::Mutex::new(Vec::new()) })
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ParentStore for MemoryParents {
    async fn lookup(&self, parent_id: &str) -> Result<Option<ParentDocument>, BackendError> {
        if let Ok(mut l) = self.lookups.lock() {
            l.push(parent_id.to_string());
        }
        if self.fail_on == Some(parent_id) {
            return Err(BackendError::Unavailable("parent store down".into()));
        }
        Ok(self.docs.get(parent_id).map(|text| ParentDocument { id: parent_id.to_string(), text: text.clone() }))
    }
}
