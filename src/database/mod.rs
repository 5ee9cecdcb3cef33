// Database module
// SQLite keeps the record snapshot and build manifest, LanceDB keeps the vectors

pub mod lancedb;
pub mod sqlite;

pub use self::lancedb::{EntryMetadata, IndexEntry, SearchHit, VectorStore};
pub use sqlite::Database;
pub use sqlite::models::{CategoryCount, IndexManifest, StoredRecord};
