use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum VizError {
    #[error("{0}")]
    #[diagnostic(code(eqviz::validation))]
    Validation(String),

    #[error("invalid dataset id: {0}")]
    InvalidDatasetId(String),

    #[error("{0}")]
    #[diagnostic(help("expected header: Equipment Name,Type,Flowrate,Pressure,Temperature"))]
    InvalidCsv(String),

    #[error("invalid row at line {line}: {message}")]
    InvalidRow { line: u64, message: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("server sent an invalid dataset: {0}")]
    #[diagnostic(code(eqviz::invalid_data))]
    InvalidData(String),

    #[error("server returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("dataset not found: {0}")]
    NotFound(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl VizError {
    /// Plain-text message shown in a view's error state.
    pub fn user_message(&self) -> String {
        match self {
            VizError::NotFound(_) => "Dataset not found".to_string(),
            VizError::Api { message, .. } => message.clone(),
            VizError::Transport(message) => format!("Failed to connect to server: {message}"),
            VizError::Validation(message) | VizError::InvalidCsv(message) => message.clone(),
            other => other.to_string(),
        }
    }
}
