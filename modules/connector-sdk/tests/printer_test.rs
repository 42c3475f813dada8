mod common;

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use common::{serve, FakeGateway};
use connector_sdk::{
    Controller, ControllerConfig, InvokeError, InvokeOptions, InvokerResponse, ResponsePrinter,
    ResponseSubscriber, TopicLookup,
};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

/// Collects formatted log output in memory.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn response(status: Option<StatusCode>, body: &str, error: Option<InvokeError>) -> InvokerResponse {
    InvokerResponse {
        cancellation: CancellationToken::new(),
        body: Some(Bytes::from(body.to_string())),
        headers: None,
        status,
        error,
        function: "fn1.openfaas-fn".to_string(),
        topic: "orders".to_string(),
        duration: Duration::from_millis(12),
    }
}

#[tokio::test]
async fn printer_logs_summary_and_optional_body() {
    let logs = LogBuffer::default();
    let _guard = logs.install();

    ResponsePrinter::new(false)
        .response(&response(Some(StatusCode::OK), "first-body", None))
        .await;
    ResponsePrinter::new(true)
        .response(&response(Some(StatusCode::OK), "second-body", None))
        .await;

    let out = logs.contents();
    assert_eq!(out.matches("Function response").count(), 2);
    assert!(out.contains("function=fn1.openfaas-fn"));
    assert!(out.contains("status=200"));
    assert!(!out.contains("first-body"));
    assert!(out.contains("second-body"));
}

#[tokio::test]
async fn printer_logs_errors_as_warnings() {
    let logs = LogBuffer::default();
    let _guard = logs.install();

    ResponsePrinter::new(true)
        .response(&response(None, "", Some(InvokeError::NoPayload)))
        .await;

    let out = logs.contents();
    assert!(out.contains("WARN"));
    assert!(out.contains("Invocation error"));
    assert!(out.contains("no message to send"));
    assert!(!out.contains("Function response"));
}

#[tokio::test]
async fn print_response_subscribes_a_printer() {
    let logs = LogBuffer::default();
    let _guard = logs.install();

    let gw = Arc::new(FakeGateway::default());
    gw.reply("fn1", StatusCode::OK, "printed-reply");
    let base = serve(gw.clone()).await;
    let config = ControllerConfig::builder()
        .gateway_url(base.as_str())
        .print_response(true)
        .print_response_body(true)
        .build();
    let controller = Controller::new(config, None).unwrap();
    controller
        .topic_map()
        .sync(TopicLookup::from_iter([("orders", vec!["fn1"])]));

    controller
        .invoke(
            "orders",
            Bytes::from_static(b"x"),
            HeaderMap::new(),
            InvokeOptions::default(),
        )
        .await;

    tokio::time::timeout(Duration::from_secs(2), async {
        while !logs.contents().contains("printed-reply") {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("printer did not log the response body");
    assert!(logs.contents().contains("Function response"));
}

#[tokio::test]
async fn printer_is_off_by_default() {
    let logs = LogBuffer::default();
    let _guard = logs.install();

    let gw = Arc::new(FakeGateway::default());
    let base = serve(gw.clone()).await;
    let config = ControllerConfig::builder().gateway_url(base.as_str()).build();
    let controller = Controller::new(config, None).unwrap();
    controller
        .topic_map()
        .sync(TopicLookup::from_iter([("orders", vec!["fn1"])]));

    controller
        .invoke(
            "orders",
            Bytes::from_static(b"x"),
            HeaderMap::new(),
            InvokeOptions::default(),
        )
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!logs.contents().contains("Function response"));
}
