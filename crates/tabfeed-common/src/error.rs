//! Error types for the tabfeed pipeline
//!
//! A single error type covers the whole import: source selection, structural
//! validation, mid-stream parsing and bulk submission. Structural errors carry
//! the 1-based data-row number they were detected on so the failure can be
//! traced back to the offending line of the uploaded file.

use thiserror::Error;

/// Result type alias for tabfeed operations
pub type Result<T> = std::result::Result<T, TabfeedError>;

/// Main error type for the tabfeed import pipeline
#[derive(Error, Debug)]
pub enum TabfeedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The source file does not exist or is not readable.
    #[error("File not found: '{0}'. Verify the file path exists and you have read permissions.")]
    FileNotFound(String),

    /// The uploaded file name has no extension to select a parser by.
    #[error("Invalid file name: '{0}'. The file name must carry an extension, e.g. 'data.csv'.")]
    InvalidFileName(String),

    /// No parser is registered for the extension of the uploaded file.
    #[error("Unsupported file type: '{0}'. Query the registry for the supported extensions.")]
    UnsupportedFileType(String),

    /// The configured header row is past the end of the file.
    #[error("Header row {offset} not found: the file contains only {lines} line(s).")]
    MissingHeaderRow { offset: u32, lines: usize },

    /// A row produced more columns than the header row declared.
    #[error("Error at row {row}: columns ({columns}) exceeded headers ({headers}).")]
    ColumnsExceededHeaders {
        row: u64,
        columns: usize,
        headers: usize,
    },

    /// A row finished with a column count different from the header count.
    #[error("Error at row {row}: values ({columns}) does not match headers ({headers}).")]
    ColumnsHeadersMismatch {
        row: u64,
        columns: usize,
        headers: usize,
    },

    /// The workbook could not be opened or read.
    #[error("Workbook error: {0}")]
    Workbook(String),

    /// Transport-level failure talking to the indexing engine.
    #[error("Network request failed: {0}. Check the Elasticsearch URL and that the cluster is up.")]
    Http(#[from] reqwest::Error),

    /// The indexing engine answered a bulk or delete request with an error status.
    #[error("Elasticsearch rejected the request with status {status}: {body}")]
    ElasticRejected { status: u16, body: String },

    /// The indexing engine answered with a body the client could not use.
    #[error("Unexpected Elasticsearch response: {0}")]
    ElasticResponse(String),

    /// Settings are missing or invalid.
    #[error("Configuration error: {0}. Check your environment variables.")]
    Config(String),
}

impl TabfeedError {
    /// Shorthand for a configuration error from any displayable cause.
    pub fn config(message: impl Into<String>) -> Self {
        TabfeedError::Config(message.into())
    }

    /// True when the error was raised by structural validation of the source
    /// file, i.e. before any write traffic may reach the indexing engine.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            TabfeedError::ColumnsExceededHeaders { .. }
                | TabfeedError::ColumnsHeadersMismatch { .. }
                | TabfeedError::MissingHeaderRow { .. }
        )
    }
}
