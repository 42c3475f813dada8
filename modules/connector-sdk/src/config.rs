use std::fmt;
use std::time::Duration;

use tracing::info;
use typed_builder::TypedBuilder;

use crate::error::{ConnectorError, Result};
use crate::topic_map::MatchTopicFn;

pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_USER_AGENT: &str = "openfaas/connector-sdk";
pub const DEFAULT_TOPIC_DELIMITER: &str = ",";

/// Controller configuration. Immutable once built; every field has a default.
#[derive(Clone, TypedBuilder)]
pub struct ControllerConfig {
    /// Base URL of the gateway. Functions are invoked under `{gateway_url}/function`
    /// (or `/async-function`) and discovered under `{gateway_url}/system`.
    #[builder(default = DEFAULT_GATEWAY_URL.to_string(), setter(into))]
    pub gateway_url: String,

    /// Overall timeout for a single function invocation.
    #[builder(default = Duration::from_secs(30))]
    pub upstream_timeout: Duration,

    /// Interval between topic map rebuilds.
    #[builder(default = Duration::from_secs(3))]
    pub rebuild_interval: Duration,

    /// Separator for multi-topic `topic` annotations.
    #[builder(default = DEFAULT_TOPIC_DELIMITER.to_string(), setter(into))]
    pub topic_delimiter: String,

    /// Invoke through the asynchronous route.
    #[builder(default)]
    pub async_invocation: bool,

    /// Default `X-Callback-Url` for asynchronous invocations.
    #[builder(default, setter(into))]
    pub async_callback_url: String,

    /// Default `Content-Type` for invocations. Empty leaves the header unset.
    #[builder(default, setter(into))]
    pub content_type: String,

    /// Subscribe a [`crate::ResponsePrinter`] at construction.
    #[builder(default)]
    pub print_response: bool,

    #[builder(default)]
    pub print_response_body: bool,

    #[builder(default)]
    pub print_request_body: bool,

    /// Log every successful topic map sync.
    #[builder(default)]
    pub print_sync: bool,

    /// `User-Agent` sent on invocations, e.g. `company/NAME-connector`.
    #[builder(default = DEFAULT_USER_AGENT.to_string(), setter(into))]
    pub user_agent: String,

    /// Namespace whose functions are mapped. Empty maps every namespace.
    #[builder(default, setter(into))]
    pub namespace: String,

    /// Forward the triggering topic in `X-Topic`.
    #[builder(default)]
    pub send_topic: bool,

    /// Capacity of the invoker → subscriber queue. Values below 1 are raised to 1.
    #[builder(default = 1)]
    pub response_buffer: usize,

    /// Overrides topic matching. Defaults to equality.
    #[builder(default, setter(strip_option))]
    pub topic_matcher: Option<MatchTopicFn>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("GATEWAY_URL") {
            config.gateway_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("UPSTREAM_TIMEOUT") {
            config.upstream_timeout = parse_duration("UPSTREAM_TIMEOUT", &v)?;
        }
        if let Some(v) = get("REBUILD_INTERVAL") {
            config.rebuild_interval = parse_duration("REBUILD_INTERVAL", &v)?;
        }
        if let Some(v) = get("TOPIC_DELIMITER") {
            config.topic_delimiter = v;
        }
        if let Some(v) = get("ASYNC_INVOCATION") {
            config.async_invocation = parse_bool("ASYNC_INVOCATION", &v)?;
        }
        if let Some(v) = get("ASYNC_CALLBACK_URL") {
            config.async_callback_url = v;
        }
        if let Some(v) = get("CONTENT_TYPE") {
            config.content_type = v;
        }
        if let Some(v) = get("PRINT_RESPONSE") {
            config.print_response = parse_bool("PRINT_RESPONSE", &v)?;
        }
        if let Some(v) = get("PRINT_RESPONSE_BODY") {
            config.print_response_body = parse_bool("PRINT_RESPONSE_BODY", &v)?;
        }
        if let Some(v) = get("PRINT_REQUEST_BODY") {
            config.print_request_body = parse_bool("PRINT_REQUEST_BODY", &v)?;
        }
        if let Some(v) = get("PRINT_SYNC") {
            config.print_sync = parse_bool("PRINT_SYNC", &v)?;
        }
        if let Some(v) = get("USER_AGENT") {
            config.user_agent = v;
        }
        if let Some(v) = get("NAMESPACE") {
            config.namespace = v;
        }
        if let Some(v) = get("SEND_TOPIC") {
            config.send_topic = parse_bool("SEND_TOPIC", &v)?;
        }
        if let Some(v) = get("RESPONSE_BUFFER") {
            config.response_buffer = v.trim().parse().map_err(|_| {
                ConnectorError::Config(format!("RESPONSE_BUFFER must be a number, got '{v}'"))
            })?;
        }

        Ok(config)
    }

    /// Invocation route prefix, chosen once from `async_invocation`.
    pub fn gateway_route(&self) -> String {
        let base = self.gateway_url.trim_end_matches('/');
        if self.async_invocation {
            format!("{base}/async-function")
        } else {
            format!("{base}/function")
        }
    }

    pub fn log_redacted(&self) {
        info!(
            gateway_url = %self.gateway_url,
            route = %self.gateway_route(),
            upstream_timeout = ?self.upstream_timeout,
            rebuild_interval = ?self.rebuild_interval,
            topic_delimiter = %self.topic_delimiter,
            namespace = %self.namespace,
            send_topic = self.send_topic,
            content_type = %self.content_type,
            user_agent = %self.user_agent,
            async_callback_url = !self.async_callback_url.is_empty(),
            custom_matcher = self.topic_matcher.is_some(),
            "Connector configuration"
        );
    }
}

impl fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("gateway_url", &self.gateway_url)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("rebuild_interval", &self.rebuild_interval)
            .field("topic_delimiter", &self.topic_delimiter)
            .field("async_invocation", &self.async_invocation)
            .field("async_callback_url", &self.async_callback_url)
            .field("content_type", &self.content_type)
            .field("print_response", &self.print_response)
            .field("print_response_body", &self.print_response_body)
            .field("print_request_body", &self.print_request_body)
            .field("print_sync", &self.print_sync)
            .field("user_agent", &self.user_agent)
            .field("namespace", &self.namespace)
            .field("send_topic", &self.send_topic)
            .field("response_buffer", &self.response_buffer)
            .field("topic_matcher", &self.topic_matcher.as_ref().map(|_| "custom"))
            .finish()
    }
}

/// Parse `500ms`, `30s`, `2m`, `1h`, or a bare number of seconds.
pub fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    let value = value.trim();
    let invalid = || ConnectorError::Config(format!("{key} must be a duration, got '{value}'"));

    let (digits, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(i) => value.split_at(i),
        None => (value, "s"),
    };
    let n: u64 = digits.parse().map_err(|_| invalid())?;

    match unit {
        "ms" => Ok(Duration::from_millis(n)),
        "s" => Ok(Duration::from_secs(n)),
        "m" => Ok(Duration::from_secs(n.checked_mul(60).ok_or_else(invalid)?)),
        "h" => Ok(Duration::from_secs(n.checked_mul(3600).ok_or_else(invalid)?)),
        _ => Err(invalid()),
    }
}

pub fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ConnectorError::Config(format!(
            "{key} must be true/false/1/0, got '{value}'"
        ))),
    }
}
