use std::fmt;

/// Container suffix for compressed archive copies.
pub const COMPRESSED_SUFFIX: &str = "7z";

/// The three scanner artifacts making up one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileClass {
    /// Raw list-mode data.
    L64,
    /// Header for the list-mode data.
    L64Hdr,
    /// Histogram/calibration counts.
    Hc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    Native,
    Compressed,
}

pub struct ClassSpec {
    pub class: FileClass,
    pub suffix: &'static str,
    pub archive_format: ArchiveFormat,
    pub archive_suffix: Option<&'static str>,
}

/// Per-class naming and storage rules, consulted by value.
pub static CLASS_TABLE: [ClassSpec; 3] = [
    ClassSpec {
        class: FileClass::L64,
        suffix: "l64",
        archive_format: ArchiveFormat::Compressed,
        archive_suffix: Some(COMPRESSED_SUFFIX),
    },
    ClassSpec {
        class: FileClass::L64Hdr,
        suffix: "l64.hdr",
        archive_format: ArchiveFormat::Native,
        archive_suffix: None,
    },
    ClassSpec {
        class: FileClass::Hc,
        suffix: "hc",
        archive_format: ArchiveFormat::Native,
        archive_suffix: None,
    },
];

impl FileClass {
    pub const ALL: [FileClass; 3] = [FileClass::L64, FileClass::L64Hdr, FileClass::Hc];

    pub fn spec(&self) -> &'static ClassSpec {
        match self {
            FileClass::L64 => &CLASS_TABLE[0],
            FileClass::L64Hdr => &CLASS_TABLE[1],
            FileClass::Hc => &CLASS_TABLE[2],
        }
    }

    pub fn suffix(&self) -> &'static str {
        self.spec().suffix
    }

    /// Format used when this class is stored in a backup archive.
    pub fn archive_format(&self) -> ArchiveFormat {
        self.spec().archive_format
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileClass::L64 => "L64",
            FileClass::L64Hdr => "L64Hdr",
            FileClass::Hc => "Hc",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.as_str() == value)
    }

    /// Extension carried by a file of this class in the given format.
    pub fn extension(&self, format: ArchiveFormat) -> String {
        match (format, self.spec().archive_suffix) {
            (ArchiveFormat::Compressed, Some(archive_suffix)) => {
                format!("{}.{}", self.suffix(), archive_suffix)
            }
            _ => self.suffix().to_string(),
        }
    }

    /// Match a parsed extension against every class suffix, optionally
    /// followed by the class's archive suffix.
    pub fn match_extension(extension: &str) -> Option<(FileClass, ArchiveFormat)> {
        let extension = extension.to_ascii_lowercase();
        CLASS_TABLE.iter().find_map(|spec| {
            if extension == spec.suffix {
                return Some((spec.class, ArchiveFormat::Native));
            }
            match spec.archive_suffix {
                Some(archive_suffix)
                    if extension == format!("{}.{}", spec.suffix, archive_suffix) =>
                {
                    Some((spec.class, ArchiveFormat::Compressed))
                }
                _ => None,
            }
        })
    }
}

impl fmt::Display for FileClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ArchiveFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveFormat::Native => "native",
            ArchiveFormat::Compressed => "compressed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "native" => Some(ArchiveFormat::Native),
            "compressed" => Some(ArchiveFormat::Compressed),
            _ => None,
        }
    }
}
