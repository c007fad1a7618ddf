use thiserror::Error;

/// Failure of a single remote call. The rendered message is what a row
/// shows as its inline error text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else if value.is_builder() {
            Self::InvalidRequest(value.to_string())
        } else {
            Self::Network(value.to_string())
        }
    }
}
