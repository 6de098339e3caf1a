//! Error types for the importer

use thiserror::Error;

/// Importer errors
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Core(#[from] tsbulk_core::CoreError),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema mapping failed while reading a file header; nothing after it can be imported
    #[error("Header error: {0}")]
    Header(String),

    #[error("database is required, make sure `# CONTEXT-DATABASE:` token is exist or --database is set")]
    DatabaseRequired,

    #[error("measurement is required, set it with --measurement")]
    MeasurementRequired,

    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    #[error("write failed, code: {code}, partial write failure")]
    PartialWrite { code: i32 },

    #[error("write failed, code: {code}, write failure")]
    WriteFailed { code: i32 },

    #[error("unexpected response code: {0}")]
    UnexpectedResponse(i32),

    #[error("import cancelled")]
    Cancelled,

    #[error("{}", join_errors(.0))]
    Multiple(Vec<ImportError>),
}

impl ImportError {
    /// Whether the error must stop the import instead of being logged and skipped
    pub fn is_fatal(&self) -> bool {
        matches!(self, ImportError::Header(_) | ImportError::Cancelled)
    }

    /// Whether the error, or any error folded into it, is a cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            ImportError::Cancelled => true,
            ImportError::Multiple(errors) => errors.iter().any(ImportError::is_cancelled),
            _ => false,
        }
    }

    /// Fold a list of errors into a single one, `None` when the list is empty
    pub fn join(mut errors: Vec<ImportError>) -> Option<ImportError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(ImportError::Multiple(errors)),
        }
    }
}

fn join_errors(errors: &[ImportError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result type for importer operations
pub type Result<T> = std::result::Result<T, ImportError>;
