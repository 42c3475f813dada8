use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Failures talking to the gateway's `/system` API.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Connection refused, timed out, or dropped mid-request.
    #[error("Network error: {0}")]
    Network(String),

    /// The gateway rejected the basic-auth credentials (401 or 403).
    /// Usually a missing `BASIC_AUTH=true` or stale mounted secrets.
    #[error("Gateway rejected credentials (status {status})")]
    Unauthorized { status: u16 },

    #[error("Gateway returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// The response body was not the expected JSON.
    #[error("Unable to decode gateway response: {0}")]
    Parse(String),
}

impl GatewayError {
    /// HTTP status the gateway answered with, if it answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Unauthorized { status } | GatewayError::Api { status, .. } => {
                Some(*status)
            }
            GatewayError::Network(_) | GatewayError::Parse(_) => None,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Parse(err.to_string())
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Parse(err.to_string())
    }
}
