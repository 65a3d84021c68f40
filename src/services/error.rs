use thiserror::Error;

/// Failures raised by analyzer backends.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("{backend} provisioning failed: {message}")]
    Provisioning { backend: String, message: String },

    #[error("{backend} inference failed: {message}")]
    Inference { backend: String, message: String },

    #[error("{backend} model handle already released")]
    Released { backend: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl AnalyzerError {
    pub fn provisioning(backend: &str, message: impl Into<String>) -> Self {
        AnalyzerError::Provisioning {
            backend: backend.to_string(),
            message: message.into(),
        }
    }

    pub fn inference(backend: &str, message: impl Into<String>) -> Self {
        AnalyzerError::Inference {
            backend: backend.to_string(),
            message: message.into(),
        }
    }

    /// Per-request failures, as opposed to setup-time ones.
    pub fn is_inference(&self) -> bool {
        !matches!(self, AnalyzerError::Provisioning { .. })
    }
}

pub type AnalyzerResult<T> = std::result::Result<T, AnalyzerError>;
