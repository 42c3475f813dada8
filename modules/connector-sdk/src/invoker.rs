//! HTTP invocation of gateway functions.
//!
//! Every attempted invocation produces exactly one [`InvokerResponse`], which is
//! both returned to the caller and published on the bounded response queue.
//! A full queue makes `invoke` wait; that is the only backpressure in the pipeline.

use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::error::{ConnectorError, InvokeError, Result};

pub const X_TOPIC: HeaderName = HeaderName::from_static("x-topic");
pub const X_CALLBACK_URL: HeaderName = HeaderName::from_static("x-callback-url");
pub const X_CONNECTOR: HeaderName = HeaderName::from_static("x-connector");

/// Value of `X-Connector` when the caller did not supply one.
pub const CONNECTOR_ID: &str = "connector-sdk";

/// Per-invoker defaults. Per-call [`InvokeOptions`] take precedence where both apply.
#[derive(Debug, Clone, TypedBuilder)]
pub struct InvokerOptions {
    /// Route prefix functions are appended to, e.g. `http://gw:8080/function`.
    #[builder(setter(into))]
    pub gateway_route: String,
    #[builder(default, setter(into))]
    pub content_type: String,
    #[builder(default, setter(into))]
    pub callback_url: String,
    #[builder(default)]
    pub send_topic: bool,
    #[builder(default, setter(into))]
    pub user_agent: String,
    #[builder(default)]
    pub print_request_body: bool,
    #[builder(default = 1)]
    pub response_buffer: usize,
}

/// Per-call overrides. Empty strings count as absent.
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct InvokeOptions {
    #[builder(default, setter(strip_option, into))]
    pub topic: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub callback_url: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub content_type: Option<String>,
}

impl InvokeOptions {
    fn topic(&self) -> &str {
        self.topic.as_deref().unwrap_or_default()
    }
}

/// Outcome of one attempted invocation.
///
/// `error` is set only for validation, transport, and read failures. Any HTTP
/// status the function answers with, including 4xx and 5xx, is a normal response.
#[derive(Debug, Clone)]
pub struct InvokerResponse {
    /// Cancellation token the invocation was bound to.
    pub cancellation: CancellationToken,
    pub body: Option<Bytes>,
    pub headers: Option<HeaderMap>,
    /// `None` when the request was rejected before reaching the network.
    pub status: Option<StatusCode>,
    pub error: Option<InvokeError>,
    pub function: String,
    pub topic: String,
    pub duration: Duration,
}

impl InvokerResponse {
    fn failed(
        cancellation: &CancellationToken,
        function: &str,
        topic: &str,
        status: Option<StatusCode>,
        error: InvokeError,
        duration: Duration,
    ) -> Self {
        Self {
            cancellation: cancellation.clone(),
            body: None,
            headers: None,
            status,
            error: Some(error),
            function: function.to_string(),
            topic: topic.to_string(),
            duration,
        }
    }

    pub(crate) fn no_payload(cancellation: &CancellationToken, function: &str, topic: &str) -> Self {
        Self::failed(
            cancellation,
            function,
            topic,
            None,
            InvokeError::NoPayload,
            Duration::ZERO,
        )
    }

    /// Body as lossy UTF-8, empty when there is none.
    pub fn body_text(&self) -> String {
        self.body
            .as_deref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }
}

/// Sends payloads to functions through the gateway.
#[derive(Debug)]
pub struct Invoker {
    client: reqwest::Client,
    gateway_route: String,
    content_type: Option<HeaderValue>,
    callback_url: Option<HeaderValue>,
    user_agent: Option<HeaderValue>,
    send_topic: bool,
    print_request_body: bool,
    responses: mpsc::Sender<InvokerResponse>,
}

impl Invoker {
    /// Build an invoker and the receiving end of its response queue.
    pub fn new(
        client: reqwest::Client,
        options: InvokerOptions,
    ) -> Result<(Self, mpsc::Receiver<InvokerResponse>)> {
        let (tx, rx) = mpsc::channel(options.response_buffer.max(1));

        let invoker = Self {
            client,
            gateway_route: options.gateway_route.trim_end_matches('/').to_string(),
            content_type: configured_header("content type", &options.content_type)?,
            callback_url: configured_header("callback URL", &options.callback_url)?,
            user_agent: configured_header("user agent", &options.user_agent)?,
            send_topic: options.send_topic,
            print_request_body: options.print_request_body,
            responses: tx,
        };
        Ok((invoker, rx))
    }

    pub fn gateway_route(&self) -> &str {
        &self.gateway_route
    }

    /// Invoke `function` with `payload`, publish the outcome, and return it.
    pub async fn invoke(
        &self,
        cancel: &CancellationToken,
        function: &str,
        payload: Bytes,
        headers: HeaderMap,
        opts: &InvokeOptions,
    ) -> InvokerResponse {
        let topic = opts.topic();

        let response = if payload.is_empty() {
            InvokerResponse::no_payload(cancel, function, topic)
        } else {
            match self.build_headers(function, headers, opts) {
                Ok(headers) => self.send(cancel, function, topic, payload, headers).await,
                Err(err) => InvokerResponse::failed(
                    cancel,
                    function,
                    topic,
                    None,
                    err,
                    Duration::ZERO,
                ),
            }
        };

        self.publish(response.clone()).await;
        response
    }

    /// Push a response onto the queue, waiting while it is full.
    pub(crate) async fn publish(&self, response: InvokerResponse) {
        if self.responses.send(response).await.is_err() {
            debug!("Response queue closed, response not fanned out");
        }
    }

    fn build_headers(
        &self,
        function: &str,
        mut headers: HeaderMap,
        opts: &InvokeOptions,
    ) -> std::result::Result<HeaderMap, InvokeError> {
        let invalid = |name: &'static str| InvokeError::InvalidHeader {
            function: function.to_string(),
            name,
        };

        if let Some(ref ua) = self.user_agent {
            headers.insert(USER_AGENT, ua.clone());
        }

        let topic = opts.topic();
        if self.send_topic && !topic.is_empty() {
            let value = HeaderValue::from_str(topic).map_err(|_| invalid("X-Topic"))?;
            headers.insert(X_TOPIC, value);
        }

        let callback_url = match non_empty(&opts.callback_url) {
            Some(url) => Some(HeaderValue::from_str(url).map_err(|_| invalid("X-Callback-Url"))?),
            None => self.callback_url.clone(),
        };
        if let Some(value) = callback_url {
            headers.insert(X_CALLBACK_URL, value);
        }

        let content_type = match non_empty(&opts.content_type) {
            Some(ct) => Some(HeaderValue::from_str(ct).map_err(|_| invalid("Content-Type"))?),
            None => self.content_type.clone(),
        };
        if let Some(value) = content_type {
            headers.insert(CONTENT_TYPE, value);
        }

        if !headers.contains_key(X_CONNECTOR) {
            headers.insert(X_CONNECTOR, HeaderValue::from_static(CONNECTOR_ID));
        }

        Ok(headers)
    }

    async fn send(
        &self,
        cancel: &CancellationToken,
        function: &str,
        topic: &str,
        payload: Bytes,
        headers: HeaderMap,
    ) -> InvokerResponse {
        let url = format!("{}/{}", self.gateway_route, function);
        let started = Instant::now();

        info!(function, topic, "Invoke function");
        if self.print_request_body {
            info!(function, body = %String::from_utf8_lossy(&payload), "Request body");
        }

        let request = self.client.post(&url).headers(headers).body(payload).send();
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(InvokeError::Cancelled {
                function: function.to_string(),
            }),
            res = request => res.map_err(|e| InvokeError::Transport {
                function: function.to_string(),
                source: e.into(),
            }),
        };

        let resp = match sent {
            Ok(resp) => resp,
            Err(err) => {
                warn!(function, topic, error = %err, "Invocation failed");
                return InvokerResponse::failed(
                    cancel,
                    function,
                    topic,
                    Some(StatusCode::SERVICE_UNAVAILABLE),
                    err,
                    started.elapsed(),
                );
            }
        };

        let status = resp.status();
        let resp_headers = resp.headers().clone();

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(InvokeError::Cancelled {
                function: function.to_string(),
            }),
            bytes = resp.bytes() => bytes.map_err(|e| InvokeError::Read {
                function: function.to_string(),
                source: e.into(),
            }),
        };

        match body {
            Ok(body) => {
                debug!(function, topic, status = status.as_u16(), "Function responded");
                InvokerResponse {
                    cancellation: cancel.clone(),
                    body: Some(body),
                    headers: Some(resp_headers),
                    status: Some(status),
                    error: None,
                    function: function.to_string(),
                    topic: topic.to_string(),
                    duration: started.elapsed(),
                }
            }
            Err(err) => {
                warn!(function, topic, error = %err, "Error reading response body");
                InvokerResponse::failed(
                    cancel,
                    function,
                    topic,
                    Some(StatusCode::SERVICE_UNAVAILABLE),
                    err,
                    started.elapsed(),
                )
            }
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn configured_header(what: &str, value: &str) -> Result<Option<HeaderValue>> {
    if value.is_empty() {
        return Ok(None);
    }
    HeaderValue::from_str(value)
        .map(Some)
        .map_err(|_| ConnectorError::Config(format!("invalid {what} header value: '{value}'")))
}
