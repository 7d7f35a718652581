use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use tracing::debug;

use ragline_core::config::BackendConfig;
use ragline_core::error::BackendError;
use ragline_core::traits::SemanticIndex;
use ragline_core::types::{Filters, IndexHit};

use crate::table::{distance_col, filter_predicate, open_db, open_table, opt_str, string_col, unavailable, vector_at};

/// Cosine nearest-neighbour search over the chunk table. Hits carry their
/// stored vector so the diversity stage does not have to re-embed them.
pub struct LanceSemanticIndex {
	table: Table,
}

impl LanceSemanticIndex {
	pub async fn open(uri: &str, table_name: &str) -> Result<Self> {
		let conn = open_db(uri).await?;
		Ok(Self { table: open_table(&conn, table_name).await? })
	}

	pub async fn from_config(backends: &BackendConfig, base: &Path) -> Result<Self> {
		let uri = backends.lancedb_path(base);
		Self::open(&uri.to_string_lossy(), &backends.chunk_table).await
	}

	pub fn from_table(table: Table) -> Self {
		Self { table }
	}
}

#[async_trait]
impl SemanticIndex for LanceSemanticIndex {
	async fn search(&self, query_vec: &[f32], k: usize, filters: &Filters) -> Result<Vec<IndexHit>, BackendError> {
		if k == 0 {
			return Ok(Vec::new());
		}
		let mut query = self
			.table
			.vector_search(query_vec.to_vec())
			.map_err(|e| BackendError::Malformed(format!("vector query: {e}")))?
			.distance_type(DistanceType::Cosine)
			.limit(k);
		if let Some(predicate) = filter_predicate(filters) {
			debug!(%predicate, "semantic search filter");
			query = query.only_if(predicate);
		}
		let mut stream = query.execute().await.map_err(|e| unavailable("lancedb search", e))?;

		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await.map_err(|e| unavailable("lancedb stream", e))? {
			let ids = string_col(&batch, "id")?;
			let contents = string_col(&batch, "content")?;
			let parents = string_col(&batch, "parent_id").ok();
			let distances = distance_col(&batch);
			for i in 0..batch.num_rows() {
				let score = distances.map_or(0.0, |d| 1.0 - d.value(i));
				hits.push(IndexHit {
					id: ids.value(i).to_string(),
					text: contents.value(i).to_string(),
					score,
					embedding: vector_at(&batch, i),
					parent_id: parents.and_then(|p| opt_str(p, i)),
				});
			}
		}
		// ordering is only guaranteed within a batch
		hits.sort_by(|a, b| b.score.total_cmp(&a.score));
		hits.truncate(k);
		Ok(hits)
	}
}
