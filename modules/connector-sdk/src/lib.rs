//! Connector SDK: embed in an event-source bridge (queue, broker, cron) to invoke
//! gateway functions by topic.
//!
//! A [`Controller`] keeps a [`TopicMap`] refreshed from the `topic` annotation of
//! deployed functions, invokes every matching function for each dispatched
//! message, and fans the results out to registered [`ResponseSubscriber`]s.

pub mod config;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod invoker;
pub mod lookup;
pub mod subscriber;
pub mod topic_map;

pub use config::ControllerConfig;
pub use controller::{make_client, Controller, SyncStatus};
pub use credentials::{credentials_from_env, read_basic_auth};
pub use error::{ConnectorError, InvokeError, Result};
pub use invoker::{InvokeOptions, Invoker, InvokerOptions, InvokerResponse};
pub use lookup::{FunctionLookupBuilder, LookupBuilder};
pub use subscriber::{ResponsePrinter, ResponseSubscriber};
pub use topic_map::{MatchTopicFn, TopicLookup, TopicMap};

pub use gateway_client::{BasicAuth, GatewayClient};
