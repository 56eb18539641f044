use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Failures surfaced to console callers.
///
/// A superseded or cancelled operation is not an error; it resolves to
/// `Ok(None)`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{message}")]
    Network {
        message: String,
        status: Option<u16>,
    },
    #[error("not permitted: {0}")]
    Forbidden(String),
    #[error("failed to decode backend response: {0}")]
    Decode(String),
    #[error("console backend is unavailable")]
    Unavailable,
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status: None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            return Self::Decode(value.to_string());
        }
        Self::Network {
            message: value.to_string(),
            status: value.status().map(|status| status.as_u16()),
        }
    }
}
