mod base;
mod memory;
mod sqlite;

pub use base::Exporter;
pub use memory::MemoryExporter;
pub use sqlite::SqliteExporter;
