pub mod class;
pub mod file;
pub mod scan;
pub mod subject;

pub use class::{ArchiveFormat, FileClass, COMPRESSED_SUFFIX};
pub use file::{Checksums, Location, PhysicalAttrs, ScanFile};
pub use scan::{Scan, ScanKey};
pub use subject::{clean_name, Subject, SubjectKey};
