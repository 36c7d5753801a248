use crc32fast::Hasher as Crc32;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::model::Checksums;

const READ_BUFFER_LENGTH: usize = 1024 * 1024; // 1MB

/// Stream a reader once, computing CRC32 and optionally MD5 over every byte.
/// Raw list-mode files run to many gigabytes, so nothing is held in memory
/// beyond the read buffer.
pub fn digest_reader<R: Read>(mut reader: R, with_md5: bool) -> io::Result<Checksums> {
    let mut crc = Crc32::new();
    let mut md5 = with_md5.then(md5::Context::new);
    let mut buffer = vec![0; READ_BUFFER_LENGTH];

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        crc.update(&buffer[..n]);
        if let Some(ctx) = md5.as_mut() {
            ctx.consume(&buffer[..n]);
        }
    }

    Ok(Checksums {
        crc32: Some(format_crc32(crc.finalize())),
        md5: md5.map(|ctx| format!("{:x}", ctx.compute())),
    })
}

pub fn digest_file(path: &Path, with_md5: bool) -> io::Result<Checksums> {
    digest_reader(File::open(path)?, with_md5)
}

/// Eight uppercase hex digits.
pub fn format_crc32(value: u32) -> String {
    format!("{:08X}", value)
}
