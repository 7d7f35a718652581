//! ragline-embed
//!
//! Embedders used to turn query text (and, on demand, candidates that arrive
//! without a vector) into dense vectors. `CandleEmbedder` runs BGE-M3 locally;
//! `HashEmbedder` is a deterministic stand-in for tests and offline setups.
use std::sync::Arc;

use anyhow::Result;
use ragline_core::traits::Embedder;
use tracing::info;

pub mod hash;
pub mod model;
pub mod pool;

pub use hash::HashEmbedder;
pub use model::CandleEmbedder;
pub use pool::masked_mean_l2;

pub const DEFAULT_DIM: usize = 1024;

/// `APP_USE_FAKE_EMBEDDINGS=1` selects the hash embedder; otherwise the local
/// model is loaded from `APP_MODEL_DIR` / `MODEL_DIR` / `models/bge-m3`.
pub fn get_default_embedder() -> Result<Arc<dyn Embedder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if use_fake {
        info!(dim = DEFAULT_DIM, "using hash embedder");
        return Ok(Arc::new(HashEmbedder::new(DEFAULT_DIM)));
    }
    Ok(Arc::new(CandleEmbedder::load(&model::resolve_model_dir()?)?))
}
