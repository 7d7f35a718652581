use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Table;

use ragline_core::config::BackendConfig;
use ragline_core::error::BackendError;
use ragline_core::traits::ParentStore;
use ragline_core::types::ParentDocument;

use crate::table::{id_predicate, open_db, open_table, string_col, unavailable};

pub struct LanceParentStore {
	table: Table,
}

impl LanceParentStore {
	pub async fn open(uri: &str, table_name: &str) -> Result<Self> {
		let conn = open_db(uri).await?;
		Ok(Self { table: open_table(&conn, table_name).await? })
	}

	pub async fn from_config(backends: &BackendConfig, base: &Path) -> Result<Self> {
		let uri = backends.lancedb_path(base);
		Self::open(&uri.to_string_lossy(), &backends.parent_table).await
	}

	pub fn from_table(table: Table) -> Self {
		Self { table }
	}
}

#[async_trait]
impl ParentStore for LanceParentStore {
	async fn lookup(&self, parent_id: &str) -> Result<Option<ParentDocument>, BackendError> {
		let mut stream = self
			.table
			.query()
			.only_if(id_predicate(parent_id))
			.limit(1)
			.execute()
			.await
			.map_err(|e| unavailable("lancedb parent lookup", e))?;
		while let Some(batch) = stream.try_next().await.map_err(|e| unavailable("lancedb stream", e))? {
			if batch.num_rows() == 0 {
				continue;
			}
			let ids = string_col(&batch, "id")?;
			let contents = string_col(&batch, "content")?;
			return Ok(Some(ParentDocument { id: ids.value(0).to_string(), text: contents.value(0).to_string() }));
		}
		Ok(None)
	}
}
