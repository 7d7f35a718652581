//! Field layout shared by whoever builds the keyword index and by
//! `TantivyKeywordIndex`, which only reads it.
use anyhow::Result;
use tantivy::schema::{Field, FacetOptions, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

pub const TOKENIZER: &str = "text_with_stopwords";

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field("id", STRING | STORED);
	schema_builder.add_text_field("parent_id", STRING | STORED);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing).set_stored();
	schema_builder.add_text_field("text", text_options);
	schema_builder.add_facet_field("category", FacetOptions::default());
	schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
	let stop_words = [
		"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
	];
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(stop_words.iter().map(|s| s.to_string())))
		.build();
	index.tokenizers().register(TOKENIZER, tokenizer);
}

#[derive(Debug, Clone, Copy)]
pub struct KeywordFields {
	pub id: Field,
	pub parent_id: Field,
	pub text: Field,
	pub category: Field,
}

impl KeywordFields {
	pub fn from_schema(schema: &Schema) -> Result<Self> {
		Ok(Self {
			id: schema.get_field("id")?,
			parent_id: schema.get_field("parent_id")?,
			text: schema.get_field("text")?,
			category: schema.get_field("category")?,
		})
	}
}
