use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Annotation key functions use to register interest in topics.
pub const TOPIC_ANNOTATION: &str = "topic";

/// A deployed function as reported by `GET /system/functions`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionStatus {
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
    #[serde(default)]
    pub replicas: u64,
    #[serde(default)]
    pub available_replicas: u64,
    #[serde(default)]
    pub invocation_count: f64,
}

impl FunctionStatus {
    /// Raw value of the `topic` annotation, if the function carries one.
    pub fn topic_annotation(&self) -> Option<&str> {
        self.annotations
            .as_ref()
            .and_then(|a| a.get(TOPIC_ANNOTATION))
            .map(String::as_str)
    }
}

/// Basic-auth credentials for the gateway's system API.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}
