//! Ties the topic map, invoker, subscribers and the two background tasks together.
//!
//! - *fan-out* (spawned by [`Controller::new`]): drains the response queue and
//!   awaits every subscriber, in registration order, for each response.
//! - *refresh* (spawned by [`Controller::begin_map_builder`]): rebuilds the
//!   topic map immediately and then once per `rebuild_interval`. A failed
//!   rebuild keeps the last table and is retried on the next tick.
//!
//! Both tasks stop when [`Controller::shutdown`] is called or the controller is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use gateway_client::{BasicAuth, GatewayClient};
use reqwest::header::HeaderMap;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::error::{ConnectorError, Result};
use crate::invoker::{InvokeOptions, Invoker, InvokerOptions, InvokerResponse};
use crate::lookup::{FunctionLookupBuilder, LookupBuilder};
use crate::subscriber::{ResponsePrinter, ResponseSubscriber};
use crate::topic_map::TopicMap;

type Subscribers = Arc<RwLock<Vec<Arc<dyn ResponseSubscriber>>>>;

/// Outcome of the most recent topic map rebuilds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub synced_at: Option<DateTime<Utc>>,
    pub syncs: u64,
    pub topics: usize,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

/// Routes topic-tagged messages to the functions registered for them.
pub struct Controller {
    config: ControllerConfig,
    invoker: Arc<Invoker>,
    topic_map: Arc<TopicMap>,
    credentials: Option<BasicAuth>,
    subscribers: Subscribers,
    status: Arc<watch::Sender<SyncStatus>>,
    refresh_started: AtomicBool,
    runtime: Handle,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Controller {
    /// Build a controller and start its fan-out task. Must run inside a Tokio runtime.
    pub fn new(config: ControllerConfig, credentials: Option<BasicAuth>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| {
            ConnectorError::Config("controller must be created inside a Tokio runtime".into())
        })?;

        let (invoker, responses) = Invoker::new(
            make_client(config.upstream_timeout)?,
            InvokerOptions::builder()
                .gateway_route(config.gateway_route())
                .content_type(config.content_type.clone())
                .callback_url(config.async_callback_url.clone())
                .send_topic(config.send_topic)
                .user_agent(config.user_agent.clone())
                .print_request_body(config.print_request_body)
                .response_buffer(config.response_buffer)
                .build(),
        )?;

        let mut initial: Vec<Arc<dyn ResponseSubscriber>> = Vec::new();
        if config.print_response {
            initial.push(Arc::new(ResponsePrinter::new(config.print_response_body)));
        }
        let subscribers: Subscribers = Arc::new(RwLock::new(initial));

        let shutdown = CancellationToken::new();
        let fan_out = runtime.spawn(fan_out(
            responses,
            Arc::clone(&subscribers),
            shutdown.clone(),
        ));

        let (status, _) = watch::channel(SyncStatus::default());

        Ok(Self {
            topic_map: Arc::new(TopicMap::new(config.topic_matcher.clone())),
            config,
            invoker: Arc::new(invoker),
            credentials,
            subscribers,
            status: Arc::new(status),
            refresh_started: AtomicBool::new(false),
            runtime,
            shutdown,
            tasks: Mutex::new(vec![fan_out]),
        })
    }

    /// Register a subscriber for every future response. There is no unsubscribe.
    pub async fn subscribe(&self, subscriber: Arc<dyn ResponseSubscriber>) {
        self.subscribers.write().await.push(subscriber);
    }

    /// Invoke every function matching `topic`, in table order, one at a time.
    ///
    /// `cancel` bounds the HTTP calls only; responses already produced are still
    /// fanned out. The responses are returned in the same order they are published.
    pub async fn dispatch(
        &self,
        cancel: &CancellationToken,
        topic: &str,
        payload: Bytes,
        headers: HeaderMap,
        opts: InvokeOptions,
    ) -> Vec<InvokerResponse> {
        if payload.is_empty() {
            let res = InvokerResponse::no_payload(cancel, "", topic);
            self.invoker.publish(res.clone()).await;
            return vec![res];
        }

        let functions = self.topic_map.match_topic(topic);
        if functions.is_empty() {
            debug!(topic, "No functions registered for topic");
        }

        let opts = InvokeOptions {
            topic: Some(topic.to_string()),
            ..opts
        };

        let mut responses = Vec::with_capacity(functions.len());
        for function in &functions {
            let res = self
                .invoker
                .invoke(cancel, function, payload.clone(), headers.clone(), &opts)
                .await;
            responses.push(res);
        }
        responses
    }

    /// [`Controller::dispatch`] without a caller-supplied cancellation token.
    pub async fn invoke(
        &self,
        topic: &str,
        payload: Bytes,
        headers: HeaderMap,
        opts: InvokeOptions,
    ) -> Vec<InvokerResponse> {
        self.dispatch(&CancellationToken::new(), topic, payload, headers, opts)
            .await
    }

    /// Start refreshing the topic map from the gateway's function annotations.
    pub fn begin_map_builder(&self) -> Result<()> {
        let gateway = GatewayClient::new(
            &self.config.gateway_url,
            make_client(self.config.upstream_timeout)?,
            self.credentials.clone(),
        );
        self.begin_map_builder_with(FunctionLookupBuilder::new(
            gateway,
            &self.config.topic_delimiter,
            &self.config.namespace,
        ))
    }

    /// Start refreshing the topic map from `builder`. Can only be started once.
    pub fn begin_map_builder_with<B>(&self, builder: B) -> Result<()>
    where
        B: LookupBuilder + 'static,
    {
        if self.config.rebuild_interval.is_zero() {
            return Err(ConnectorError::Config(
                "rebuild interval must be greater than zero".into(),
            ));
        }
        if self.refresh_started.swap(true, Ordering::SeqCst) {
            return Err(ConnectorError::RefreshAlreadyStarted);
        }

        let task = self.runtime.spawn(synchronize_lookups(
            Arc::new(builder),
            Arc::clone(&self.topic_map),
            Arc::clone(&self.status),
            self.config.rebuild_interval,
            self.config.print_sync,
            self.shutdown.clone(),
        ));
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(task);

        info!(interval = ?self.config.rebuild_interval, "Topic map refresh started");
        Ok(())
    }

    /// Topics with at least one registered function.
    pub fn topics(&self) -> Vec<String> {
        self.topic_map.topics()
    }

    /// Watch the outcome of topic map rebuilds.
    pub fn sync_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Wait up to `timeout` for the first successful topic map sync.
    /// Returns `false` if no sync succeeded in time.
    pub async fn wait_until_synced(&self, timeout: Duration) -> bool {
        let mut status = self.status.subscribe();
        let synced = matches!(
            tokio::time::timeout(timeout, status.wait_for(|s| s.syncs > 0)).await,
            Ok(Ok(_))
        );
        synced
    }

    pub fn topic_map(&self) -> &Arc<TopicMap> {
        &self.topic_map
    }

    pub fn invoker(&self) -> &Arc<Invoker> {
        &self.invoker
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop the fan-out and refresh tasks and wait for them to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let tasks = std::mem::take(
            &mut *self
                .tasks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Controller stopped");
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// HTTP client shared by invocations, with `timeout` bounding each call.
pub fn make_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .tcp_keepalive(Duration::from_secs(1))
        .pool_max_idle_per_host(100)
        .pool_idle_timeout(Duration::from_secs(120))
        .build()?)
}

async fn fan_out(
    mut responses: mpsc::Receiver<InvokerResponse>,
    subscribers: Subscribers,
    shutdown: CancellationToken,
) {
    loop {
        let res = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            res = responses.recv() => match res {
                Some(res) => res,
                None => break,
            },
        };

        let subs = subscribers.read().await;
        for sub in subs.iter() {
            sub.response(&res).await;
        }
    }
    debug!("Response fan-out stopped");
}

async fn synchronize_lookups(
    builder: Arc<dyn LookupBuilder>,
    topic_map: Arc<TopicMap>,
    status: Arc<watch::Sender<SyncStatus>>,
    interval: Duration,
    print_sync: bool,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let built = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            built = builder.build() => built,
        };

        match built {
            Ok(lookup) => {
                let topics = lookup.len();
                if print_sync {
                    info!(topics, "Syncing topic map");
                }
                topic_map.sync(lookup);
                status.send_modify(|s| {
                    s.synced_at = Some(Utc::now());
                    s.syncs += 1;
                    s.topics = topics;
                    s.consecutive_failures = 0;
                    s.last_error = None;
                });
            }
            Err(err) => {
                let mut failures = 0;
                status.send_modify(|s| {
                    s.consecutive_failures += 1;
                    s.last_error = Some(err.to_string());
                    failures = s.consecutive_failures;
                });
                warn!(
                    error = %err,
                    consecutive_failures = failures,
                    "Failed to rebuild topic map, keeping last known table"
                );
            }
        }
    }
    debug!("Topic map refresh stopped");
}
