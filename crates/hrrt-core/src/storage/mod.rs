pub mod models;
pub mod queries;
pub mod sqlite;

pub use models::{FileRecord, IndexCounts, RequiredFields, ScanRecord, SubjectRecord};
pub use sqlite::Index;
