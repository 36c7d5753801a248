use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File name matched neither naming grammar. Recoverable: the file is skipped.
    #[error("Unrecognised file name: {0}")]
    NameParse(String),

    /// Grammar matched but the date/time fields do not form a valid timestamp.
    #[error("Bad scan date/time in '{name}': {reason}")]
    Metadata { name: String, reason: String },

    /// The index returned something its unique constraints should have made impossible.
    #[error("Index consistency error: {0}")]
    Consistency(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Cloud storage error: {0}")]
    Cloud(String),

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Refusing to clear '{root}': {reason}")]
    Guard { root: String, reason: String },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Other(String),
}

impl From<sevenz_rust::Error> for Error {
    fn from(err: sevenz_rust::Error) -> Self {
        Error::Compression(err.to_string())
    }
}

impl Error {
    /// Errors that must stop the whole run rather than just the current file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Guard { .. })
    }
}
