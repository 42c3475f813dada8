use std::sync::Arc;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConnectorError>;

/// Errors raised while constructing or running a controller.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Unable to list functions in namespace '{namespace}': {source}")]
    Lookup {
        namespace: String,
        #[source]
        source: gateway_client::GatewayError,
    },

    #[error("Gateway error: {0}")]
    Gateway(#[from] gateway_client::GatewayError),

    #[error("Unable to read credentials from {path}: {source}")]
    Credentials {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Topic map refresh already started")]
    RefreshAlreadyStarted,
}

/// Failure carried inside an `InvokerResponse`. Never raised out of `invoke`/`dispatch`.
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    #[error("no message to send")]
    NoPayload,

    #[error("invalid {name} header value for {function}")]
    InvalidHeader { function: String, name: &'static str },

    #[error("unable to invoke {function}: {source}")]
    Transport {
        function: String,
        #[source]
        source: Arc<reqwest::Error>,
    },

    #[error("unable to invoke {function}: request cancelled")]
    Cancelled { function: String },

    #[error("unable to read response from {function}: {source}")]
    Read {
        function: String,
        #[source]
        source: Arc<reqwest::Error>,
    },
}

impl InvokeError {
    /// Validation failures happen before any network activity.
    pub fn is_validation(&self) -> bool {
        matches!(self, InvokeError::NoPayload | InvokeError::InvalidHeader { .. })
    }
}
