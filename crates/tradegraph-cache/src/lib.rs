pub mod error;
pub mod memory;
pub mod reader;
pub mod reflections;
pub mod sqlite;

pub use error::CacheError;
pub use reader::CacheReader;
pub use reflections::{InMemoryReflectionStore, MemoryStore, SqliteReflectionStore};
pub use sqlite::SqliteCache;
