use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Facet, Field, IndexRecordOption, Value};
use tantivy::{Index, IndexReader, TantivyDocument, Term};
use tracing::{debug, warn};

use ragline_core::config::BackendConfig;
use ragline_core::error::BackendError;
use ragline_core::traits::KeywordIndex;
use ragline_core::types::{Filters, IndexHit};

use crate::schema::{register_tokenizer, KeywordFields};

/// Read side of the keyword index. Cloning the reader is cheap, so each
/// search runs on the blocking pool against its own handle.
pub struct TantivyKeywordIndex {
	inner: Arc<Inner>,
}

struct Inner {
	index: Index,
	reader: IndexReader,
	fields: KeywordFields,
}

impl TantivyKeywordIndex {
	pub fn open(index_dir: &Path) -> Result<Self> {
		let index = Index::open_in_dir(index_dir)?;
		Self::from_index(index)
	}

	pub fn from_config(backends: &BackendConfig, base: &Path) -> Result<Self> {
		Self::open(&backends.tantivy_index_path(base))
	}

	pub fn from_index(index: Index) -> Result<Self> {
		register_tokenizer(&index);
		let reader = index.reader()?;
		let fields = KeywordFields::from_schema(&index.schema())?;
		Ok(Self { inner: Arc::new(Inner { index, reader, fields }) })
	}

	/// Picks up segments committed since the reader was opened.
	pub fn reload(&self) -> Result<()> {
		self.inner.reader.reload()?;
		Ok(())
	}
}

impl Inner {
	fn search(&self, query_text: &str, k: usize, filters: &Filters) -> Result<Vec<IndexHit>, BackendError> {
		if k == 0 {
			return Ok(Vec::new());
		}
		let parser = QueryParser::for_index(&self.index, vec![self.fields.text]);
		let (text_query, errors) = parser.parse_query_lenient(query_text);
		if !errors.is_empty() {
			debug!(query = query_text, errors = errors.len(), "lenient parse dropped query fragments");
		}
		let query = self.apply_filters(text_query, filters)?;

		let searcher = self.reader.searcher();
		let top_docs = searcher
			.search(&*query, &TopDocs::with_limit(k))
			.map_err(|e| BackendError::Unavailable(format!("tantivy search: {e}")))?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, address) in top_docs {
			let doc: TantivyDocument = searcher
				.doc(address)
				.map_err(|e| BackendError::Unavailable(format!("tantivy doc fetch: {e}")))?;
			let id = stored_str(&doc, self.fields.id).ok_or_else(|| BackendError::Malformed("indexed document without id".into()))?;
			let text = stored_str(&doc, self.fields.text).unwrap_or_default();
			let parent_id = stored_str(&doc, self.fields.parent_id).filter(|p| !p.is_empty());
			hits.push(IndexHit { id, text, score, embedding: None, parent_id });
		}
		Ok(hits)
	}

	fn apply_filters(&self, text_query: Box<dyn Query>, filters: &Filters) -> Result<Box<dyn Query>, BackendError> {
		let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Must, text_query)];
		for (key, value) in filters {
			match key.as_str() {
				"category" => {
					let path = if value.starts_with('/') { value.clone() } else { format!("/{value}") };
					let facet = Facet::from_text(&path).map_err(|e| BackendError::Malformed(format!("category filter '{value}': {e:?}")))?;
					let term = Term::from_facet(self.fields.category, &facet);
					clauses.push((Occur::Must, Box::new(TermQuery::new(term, IndexRecordOption::Basic))));
				}
				other => warn!(filter = other, "keyword index ignores unsupported filter"),
			}
		}
		if clauses.len() == 1 {
			return Ok(clauses.remove(0).1);
		}
		Ok(Box::new(BooleanQuery::new(clauses)))
	}
}

fn stored_str(doc: &TantivyDocument, field: Field) -> Option<String> {
	doc.get_first(field).and_then(|v| v.as_str()).map(str::to_string)
}

#[async_trait]
impl KeywordIndex for TantivyKeywordIndex {
	async fn search(&self, query: &str, k: usize, filters: &Filters) -> Result<Vec<IndexHit>, BackendError> {
		let inner = Arc::clone(&self.inner);
		let query = query.to_string();
		let filters = filters.clone();
		tokio::task::spawn_blocking(move || inner.search(&query, k, &filters))
			.await
			.map_err(|e| BackendError::Unavailable(format!("keyword search task: {e}")))?
	}
}
