//! Configuration loader, per-search tunables and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_SEARCH__FUSION__K=30`).

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::Stage;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The `[search]` section, defaulted when absent, validated.
    pub fn search(&self) -> Result<SearchConfig> {
        let cfg: SearchConfig = self.section("search")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// The `[backends]` section, defaulted when absent.
    pub fn backends(&self) -> Result<BackendConfig> {
        self.section("backends")
    }

    fn section<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        if self.figment.find_value(key).is_err() {
            return Ok(T::default());
        }
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("[{key}]: {e}")))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Smallest rank seen in any contributing list wins.
    #[default]
    MinRank,
    /// Lexically smallest id wins.
    Identifier,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MissingEmbedding {
    /// Embed candidates that arrive without a vector; if that fails they go unscored.
    #[default]
    Embed,
    /// Skip MMR scoring for them; they fill leftover slots in fused order.
    Exclude,
}

/// Tunables for one `search()` call. Passed explicitly per call so concurrent
/// queries with different settings never share state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Enabled optional stages. List order does not matter; they run in pipeline order.
    pub stages: Vec<Stage>,
    /// Overall bound on a search call.
    pub deadline_ms: Option<u64>,
    pub retrieval: RetrievalConfig,
    pub expansion: ExpansionConfig,
    pub fusion: FusionConfig,
    pub diversity: DiversityConfig,
    pub parents: ParentConfig,
    pub rerank: RerankConfig,
    pub compression: CompressionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub timeout_ms: u64,
    /// Extra attempts for retryable failures, per call.
    pub retries: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 20, timeout_ms: 500, retries: 0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ExpansionConfig {
    /// Paraphrases requested in addition to the original query.
    pub variants: usize,
    pub timeout_ms: u64,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self { variants: 3, timeout_ms: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FusionConfig {
    pub k: u32,
    pub tie_break: TieBreak,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self { k: 60, tie_break: TieBreak::MinRank }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DiversityConfig {
    pub k: usize,
    pub lambda: f32,
    pub missing_embedding: MissingEmbedding,
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self { k: 20, lambda: 0.6, missing_embedding: MissingEmbedding::Embed }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ParentConfig {
    pub timeout_ms: u64,
    pub concurrency: usize,
}

impl Default for ParentConfig {
    fn default() -> Self {
        Self { timeout_ms: 200, concurrency: 8 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RerankConfig {
    pub top_n: usize,
    pub timeout_ms: u64,
    pub batch_size: usize,
    /// Passages beyond this many are not sent to the reranker.
    pub max_candidates: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self { top_n: 10, timeout_ms: 300, batch_size: 32, max_candidates: 100 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CompressionConfig {
    pub timeout_ms: u64,
    pub concurrency: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self { timeout_ms: 500, concurrency: 8 }
    }
}

impl SearchConfig {
    pub fn with_stages(mut self, stages: impl IntoIterator<Item = Stage>) -> Self {
        self.stages = stages.into_iter().collect();
        self
    }

    pub fn enabled(&self, stage: Stage) -> bool {
        !stage.is_optional() || self.stages.contains(&stage)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !stage.is_optional() {
                return Err(Error::InvalidConfig(format!("stage '{stage}' always runs and cannot be listed")));
            }
            if !seen.insert(*stage) {
                return Err(Error::InvalidConfig(format!("stage '{stage}' listed twice")));
            }
        }
        let positive = [
            ("retrieval.top_k", self.retrieval.top_k),
            ("diversity.k", self.diversity.k),
            ("parents.concurrency", self.parents.concurrency),
            ("rerank.top_n", self.rerank.top_n),
            ("rerank.batch_size", self.rerank.batch_size),
            ("rerank.max_candidates", self.rerank.max_candidates),
            ("compression.concurrency", self.compression.concurrency),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(Error::InvalidConfig(format!("{name} must be at least 1")));
        }
        if self.fusion.k == 0 {
            return Err(Error::InvalidConfig("fusion.k must be at least 1".into()));
        }
        let lambda = self.diversity.lambda;
        if !(0.0..=1.0).contains(&lambda) {
            return Err(Error::InvalidConfig(format!("diversity.lambda must be within [0, 1], got {lambda}")));
        }
        Ok(())
    }
}

impl RetrievalConfig {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

impl ExpansionConfig {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

impl ParentConfig {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

impl RerankConfig {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

impl CompressionConfig {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

/// Locations and endpoints of the concrete backends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    pub tantivy_index_dir: String,
    pub lancedb_uri: String,
    pub chunk_table: String,
    pub parent_table: String,
    pub rerank_url: String,
    pub completion_url: String,
    pub completion_model: String,
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            tantivy_index_dir: "~/.ragline/indexes/tantivy".to_string(),
            lancedb_uri: "~/.ragline/indexes/lancedb".to_string(),
            chunk_table: "chunks".to_string(),
            parent_table: "parents".to_string(),
            rerank_url: "http://127.0.0.1:8080".to_string(),
            completion_url: "http://127.0.0.1:11434/v1".to_string(),
            completion_model: "llama3.1".to_string(),
            api_key: None,
            request_timeout_ms: 2000,
        }
    }
}

impl BackendConfig {
    pub fn tantivy_index_path(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.tantivy_index_dir)
    }

    pub fn lancedb_path(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.lancedb_uri)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
