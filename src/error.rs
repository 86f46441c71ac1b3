use thiserror::Error;

/// Custom Result type for this crate.
pub type Result<T> = std::result::Result<T, WnError>;

/// Enum representing all possible errors in the wordnet_dict library.
#[derive(Error, Debug)]
pub enum WnError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("ZIP archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Data directory not found or could not be determined")]
    DataDirNotFound,

    #[error("Required data file not found: {0}")]
    DataFileNotFound(String),

    #[error("Invalid UTF-8 in {path} at line {line}")]
    Decode { path: String, line: usize },

    #[error("Lemma not found: {0}")]
    LemmaNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String), // For unexpected situations
}
