use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use clap::Parser;
use connector_sdk::config::parse_duration;
use connector_sdk::{
    credentials_from_env, Controller, ControllerConfig, InvokeOptions, InvokerResponse,
    ResponseSubscriber,
};
use reqwest::header::HeaderMap;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Publish a message on a topic at a fixed interval and log what the functions answer.
#[derive(Debug, Parser)]
#[command(name = "connector-tester", version)]
struct Args {
    /// Topic to publish on.
    #[arg(long, default_value = "payment.received")]
    topic: String,

    /// Message body sent to every matching function.
    #[arg(long, default_value = r#"{"hello": "world"}"#)]
    message: String,

    /// Delay between publishes, e.g. `500ms`, `2s`, `1m`.
    #[arg(long, default_value = "2s", value_parser = parse_interval)]
    interval: Duration,

    /// Gateway URL. Overrides `GATEWAY_URL`.
    #[arg(long)]
    gateway: Option<String>,
}

fn parse_interval(value: &str) -> std::result::Result<Duration, String> {
    parse_duration("--interval", value).map_err(|e| e.to_string())
}

struct LoggingReceiver;

#[async_trait]
impl ResponseSubscriber for LoggingReceiver {
    async fn response(&self, res: &InvokerResponse) {
        match res.error {
            Some(ref err) => error!(
                function = %res.function,
                topic = %res.topic,
                error = %err,
                "Tester got error"
            ),
            None => info!(
                function = %res.function,
                topic = %res.topic,
                status = res.status.map(|s| s.as_u16()),
                bytes = res.body.as_ref().map(|b| b.len()).unwrap_or_default(),
                "Tester got result"
            ),
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v == "json");
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    anyhow::ensure!(!args.interval.is_zero(), "--interval must be greater than zero");

    info!("Connector tester starting...");

    let mut config = ControllerConfig::from_env()?;
    let first_sync_timeout = config.upstream_timeout;
    if let Some(gateway) = args.gateway {
        config.gateway_url = gateway.trim_end_matches('/').to_string();
    }
    if config.content_type.is_empty() {
        config.content_type = "application/json".to_string();
    }
    config.log_redacted();

    let credentials = credentials_from_env()?;
    if credentials.is_some() {
        info!("Gateway basic auth enabled");
    }

    let controller = Controller::new(config, credentials)?;
    controller.subscribe(Arc::new(LoggingReceiver)).await;
    controller.begin_map_builder()?;

    // Publishing before the first sync would match nothing.
    if !controller.wait_until_synced(first_sync_timeout).await {
        warn!(timeout = ?first_sync_timeout, "Topic map not synced yet, publishing anyway");
    }

    let payload = Bytes::from(args.message);
    let mut ticker = tokio::time::interval(args.interval);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                if let Err(e) = signal {
                    warn!(error = %e, "Unable to listen for shutdown signal");
                }
                break;
            }
            _ = ticker.tick() => {
                info!(topic = %args.topic, topics = ?controller.topics(), "Publishing message");
                controller
                    .invoke(&args.topic, payload.clone(), HeaderMap::new(), InvokeOptions::default())
                    .await;
            }
        }
    }

    info!("Shutting down...");
    controller.shutdown().await;
    Ok(())
}
