pub mod error;
pub mod types;

pub use error::{GatewayError, Result};
pub use types::{BasicAuth, FunctionStatus, TOPIC_ANNOTATION};

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

/// Client for the gateway's `/system` API, used to discover deployed functions.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<BasicAuth>,
}

impl GatewayClient {
    pub fn new(base_url: &str, client: reqwest::Client, credentials: Option<BasicAuth>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List the namespaces the gateway manages functions in.
    pub async fn namespaces(&self) -> Result<Vec<String>> {
        let url = format!("{}/system/namespaces", self.base_url);
        self.get_json(&url, &[]).await
    }

    /// List functions in `namespace`. An empty namespace lets the gateway pick its default.
    pub async fn functions(&self, namespace: &str) -> Result<Vec<FunctionStatus>> {
        let url = format!("{}/system/functions", self.base_url);
        if namespace.is_empty() {
            self.get_json(&url, &[]).await
        } else {
            self.get_json(&url, &[("namespace", namespace)]).await
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        let mut req = self.client.get(url);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(ref auth) = self.credentials {
            req = req.basic_auth(&auth.username, Some(&auth.password));
        }

        let resp = req.send().await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!(url, status = status.as_u16(), "Gateway rejected credentials");
            return Err(GatewayError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            tracing::debug!(url, status = status.as_u16(), "Gateway returned non-success");
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
