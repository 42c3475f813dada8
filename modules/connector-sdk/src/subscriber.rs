use async_trait::async_trait;
use tracing::{info, warn};

use crate::invoker::InvokerResponse;

/// Receives every invocation outcome.
///
/// Subscribers are awaited one after another on the fan-out task, so a slow
/// subscriber delays every later subscriber and, through the bounded queue,
/// every invocation. Hand long-running work off to another task.
/// Calling [`crate::Controller::subscribe`] from inside `response` deadlocks.
#[async_trait]
pub trait ResponseSubscriber: Send + Sync {
    async fn response(&self, res: &InvokerResponse);
}

/// Logs each response. Subscribed automatically when `print_response` is set.
#[derive(Debug, Clone, Default)]
pub struct ResponsePrinter {
    pub print_body: bool,
}

impl ResponsePrinter {
    pub fn new(print_body: bool) -> Self {
        Self { print_body }
    }
}

#[async_trait]
impl ResponseSubscriber for ResponsePrinter {
    async fn response(&self, res: &InvokerResponse) {
        if let Some(ref err) = res.error {
            warn!(
                function = %res.function,
                topic = %res.topic,
                status = res.status.map(|s| s.as_u16()),
                error = %err,
                "Invocation error"
            );
            return;
        }

        let status = res.status.map(|s| s.as_u16()).unwrap_or_default();
        let bytes = res.body.as_ref().map(|b| b.len()).unwrap_or_default();
        info!(
            function = %res.function,
            topic = %res.topic,
            status,
            bytes,
            duration_ms = res.duration.as_millis() as u64,
            "Function response"
        );

        if self.print_body {
            info!(function = %res.function, body = %res.body_text(), "Response body");
        }
    }
}
