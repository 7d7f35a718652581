use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Chunk table: one row per independently indexed unit.
pub fn build_chunk_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("parent_id", DataType::Utf8, true),
		Field::new("doc_path", DataType::Utf8, false),
		Field::new("category", DataType::Utf8, false),
		Field::new("content", DataType::Utf8, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}

/// Parent table: the larger units chunks point at through `parent_id`.
pub fn build_parent_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("content", DataType::Utf8, false),
	]))
}
