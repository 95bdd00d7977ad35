use thiserror::Error;

/// Failure talking to the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Transport(String),
    #[error("service responded {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed service payload: {0}")]
    MalformedPayload(String),
}

impl ServiceError {
    /// Message to surface when task creation fails with this error.
    pub fn submission_message(&self) -> String {
        match self {
            ServiceError::Rejected { message, .. } if !message.trim().is_empty() => {
                message.clone()
            }
            ServiceError::Transport(message) if !message.trim().is_empty() => message.clone(),
            _ => crate::GENERIC_SUBMIT_FAILURE.to_string(),
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        ServiceError::Transport(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("failed to parse {path}: {reason}")]
    File { path: String, reason: String },
}
