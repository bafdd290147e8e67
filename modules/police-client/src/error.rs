use thiserror::Error;

pub type Result<T> = std::result::Result<T, PoliceApiError>;

#[derive(Debug, Error)]
pub enum PoliceApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for PoliceApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PoliceApiError::Parse(err.to_string())
        } else {
            PoliceApiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PoliceApiError {
    fn from(err: serde_json::Error) -> Self {
        PoliceApiError::Parse(err.to_string())
    }
}
