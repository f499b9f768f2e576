/// Errors of the mega-aa CLI.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Failed to read an input file.
    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Malformed JSON input.
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type of the mega-aa CLI.
pub type Result<T> = std::result::Result<T, CliError>;
