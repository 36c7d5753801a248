pub mod checksum;
pub mod digest;

pub use checksum::{ChecksumService, ChecksumSource};
pub use digest::{digest_file, digest_reader};
