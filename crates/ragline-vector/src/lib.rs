//! ragline-vector
//!
//! LanceDB-backed collaborators: nearest-neighbour search over the chunk table
//! (`LanceSemanticIndex`) and id lookups over the parent table
//! (`LanceParentStore`). Both tables are written by the ingestion side; the
//! expected layout is in `schema`.
pub mod parents;
pub mod schema;
pub mod search;
pub mod table;

pub use parents::LanceParentStore;
pub use search::LanceSemanticIndex;
