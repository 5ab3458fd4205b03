use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Error type covering the failures that can occur while the tool fetches,
/// reshapes, or publishes data.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Wrapper for IO failures such as creating the output directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport-level HTTP failures (connection, TLS, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Raised when an endpoint or base URL cannot be parsed.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Raised when a required environment variable is absent or empty.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// Raised when a configuration value is present but unusable.
    #[error("invalid configuration value '{value}' for {name}")]
    InvalidConfig { name: String, value: String },

    /// Raised when the cloud spreadsheet API answers with a failure status.
    #[error("spreadsheet API returned {status} for {action}: {body}")]
    SpreadsheetApi {
        action: String,
        status: u16,
        body: String,
    },

    /// Raised when no spreadsheet with the configured name is visible.
    #[error("spreadsheet not found: {0}")]
    SpreadsheetNotFound(String),

    /// Raised when every requested output target failed.
    #[error("no output written (failed targets: {0})")]
    NothingPublished(String),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
