//! Builds the topic map from function annotations on the gateway.

use async_trait::async_trait;
use gateway_client::{FunctionStatus, GatewayClient};
use tracing::debug;

use crate::error::{ConnectorError, Result};
use crate::topic_map::TopicLookup;

/// Produces a fresh topic → functions mapping. Called once per refresh cycle.
#[async_trait]
pub trait LookupBuilder: Send + Sync {
    async fn build(&self) -> Result<TopicLookup>;
}

/// Lists functions on the gateway and maps each `topic` annotation to them.
#[derive(Debug, Clone)]
pub struct FunctionLookupBuilder {
    gateway: GatewayClient,
    topic_delimiter: String,
    namespace: String,
}

impl FunctionLookupBuilder {
    /// `namespace` empty means every namespace the gateway reports.
    pub fn new(gateway: GatewayClient, topic_delimiter: &str, namespace: &str) -> Self {
        Self {
            gateway,
            topic_delimiter: topic_delimiter.to_string(),
            namespace: namespace.to_string(),
        }
    }
}

#[async_trait]
impl LookupBuilder for FunctionLookupBuilder {
    async fn build(&self) -> Result<TopicLookup> {
        let mut namespaces = if self.namespace.is_empty() {
            self.gateway.namespaces().await?
        } else {
            vec![self.namespace.clone()]
        };

        // Gateways without namespace support report none.
        if namespaces.is_empty() {
            namespaces.push(String::new());
        }

        let mut lookup = TopicLookup::new();
        for namespace in &namespaces {
            let functions = self
                .gateway
                .functions(namespace)
                .await
                .map_err(|source| ConnectorError::Lookup {
                    namespace: namespace.clone(),
                    source,
                })?;
            debug!(namespace = %namespace, count = functions.len(), "Listed functions");
            add_functions(&mut lookup, &functions, &self.topic_delimiter, namespace);
        }

        Ok(lookup)
    }
}

/// Fold `functions` into `lookup`, splitting multi-topic annotations on `delimiter`.
pub fn add_functions(
    lookup: &mut TopicLookup,
    functions: &[FunctionStatus],
    delimiter: &str,
    namespace: &str,
) {
    for function in functions {
        let Some(topics) = function.topic_annotation() else {
            continue;
        };

        let target = function_path(&function.name, namespace);
        if !delimiter.is_empty() && topics.contains(delimiter) {
            for topic in topics.split(delimiter) {
                add_topic(lookup, topic, &target);
            }
        } else {
            add_topic(lookup, topics, &target);
        }
    }
}

fn add_topic(lookup: &mut TopicLookup, topic: &str, target: &str) {
    let topic = topic.trim();
    if !topic.is_empty() {
        lookup.push(topic, target);
    }
}

/// `name.namespace`, or just `name` outside any namespace.
pub fn function_path(name: &str, namespace: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{name}.{namespace}")
    }
}
