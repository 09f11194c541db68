//! Error taxonomy for every client operation.
//!
//! Each variant is scoped to the single operation that produced it; none of
//! them invalidates state held by the other components.

use thiserror::Error;

use crate::api::DatasetId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Please select a CSV file")]
    NoFileSelected,

    #[error("Enter username & password first")]
    MissingCredentials,

    /// Any non-2xx from the list, summary or report endpoints. Bad
    /// credentials and server faults look the same from here.
    #[error("Request rejected with HTTP {status} (wrong credentials or server error)")]
    AuthOrServerError { status: u16 },

    #[error("Upload failed: {0}")]
    UploadFailure(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Cannot read {path}: {reason}")]
    FileRead { path: String, reason: String },

    /// A 2xx response whose body did not decode.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No PDF report available for dataset {id}")]
    ReportUnavailable { id: DatasetId },

    #[error("Unknown dataset {id}")]
    UnknownDataset { id: DatasetId },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Short machine-friendly tag used in log records.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::NoFileSelected => "no_file_selected",
            ClientError::MissingCredentials => "missing_credentials",
            ClientError::AuthOrServerError { .. } => "auth_or_server_error",
            ClientError::UploadFailure(_) => "upload_failure",
            ClientError::NetworkError(_) => "network_error",
            ClientError::FileRead { .. } => "file_read",
            ClientError::InvalidResponse(_) => "invalid_response",
            ClientError::ReportUnavailable { .. } => "report_unavailable",
            ClientError::UnknownDataset { .. } => "unknown_dataset",
            ClientError::Config(_) => "config",
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::InvalidResponse(err.to_string())
        } else {
            ClientError::NetworkError(err.to_string())
        }
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::Config(format!("bad URL: {}", err))
    }
}
