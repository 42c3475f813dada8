//! Topic → function routing table.
//!
//! The table is an immutable [`TopicLookup`] snapshot behind an [`ArcSwap`].
//! `sync` swaps the whole snapshot, so a concurrent `match_topic` sees either
//! the old table or the new one, never a mix.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

/// Decides whether a received topic is routed to a registered topic key.
/// Called as `(received, registered)`.
pub type MatchTopicFn = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Exact string equality. Used when no matcher is configured.
pub fn exact(received: &str, registered: &str) -> bool {
    received == registered
}

/// ASCII case-insensitive equality.
pub fn case_insensitive(received: &str, registered: &str) -> bool {
    received.eq_ignore_ascii_case(registered)
}

/// A registered key ending in `*` matches any received topic sharing its prefix;
/// other keys match exactly.
pub fn wildcard(received: &str, registered: &str) -> bool {
    match registered.strip_suffix('*') {
        Some(prefix) => received.starts_with(prefix),
        None => received == registered,
    }
}

/// Ordered topic → functions mapping.
///
/// Keys keep first-insertion order and each key's functions keep push order.
/// Duplicate functions are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicLookup {
    entries: Vec<(String, Vec<String>)>,
    index: HashMap<String, usize>,
}

impl TopicLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `function` to `topic`'s list, creating the key if needed.
    pub fn push(&mut self, topic: impl Into<String>, function: impl Into<String>) {
        let topic = topic.into();
        let function = function.into();
        match self.index.get(&topic) {
            Some(&i) => self.entries[i].1.push(function),
            None => {
                self.index.insert(topic.clone(), self.entries.len());
                self.entries.push((topic, vec![function]));
            }
        }
    }

    pub fn get(&self, topic: &str) -> Option<&[String]> {
        self.index.get(topic).map(|&i| self.entries[i].1.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(topic, functions)| (topic.as_str(), functions.as_slice()))
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(topic, _)| topic.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T, F> FromIterator<(T, Vec<F>)> for TopicLookup
where
    T: Into<String>,
    F: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (T, Vec<F>)>>(iter: I) -> Self {
        let mut lookup = TopicLookup::new();
        for (topic, functions) in iter {
            let topic = topic.into();
            if functions.is_empty() && !lookup.index.contains_key(&topic) {
                lookup.index.insert(topic.clone(), lookup.entries.len());
                lookup.entries.push((topic, Vec::new()));
                continue;
            }
            for function in functions {
                lookup.push(topic.clone(), function);
            }
        }
        lookup
    }
}

/// Concurrency-safe routing table queried through a pluggable matcher.
pub struct TopicMap {
    lookup: ArcSwap<TopicLookup>,
    match_fn: MatchTopicFn,
}

impl TopicMap {
    /// Create an empty map. `None` uses [`exact`].
    pub fn new(match_fn: Option<MatchTopicFn>) -> Self {
        Self {
            lookup: ArcSwap::from_pointee(TopicLookup::new()),
            match_fn: match_fn.unwrap_or_else(|| Arc::new(exact) as MatchTopicFn),
        }
    }

    /// Functions registered under every key that matches `topic`, concatenated in table order.
    pub fn match_topic(&self, topic: &str) -> Vec<String> {
        let lookup = self.lookup.load();
        let mut matched = Vec::new();
        for (key, functions) in lookup.iter() {
            if (self.match_fn)(topic, key) {
                matched.extend_from_slice(functions);
            }
        }
        matched
    }

    /// Replace the whole table.
    pub fn sync(&self, lookup: TopicLookup) {
        self.lookup.store(Arc::new(lookup));
    }

    pub fn topics(&self) -> Vec<String> {
        self.lookup.load().topics().map(String::from).collect()
    }

    /// Current table snapshot.
    pub fn snapshot(&self) -> Arc<TopicLookup> {
        self.lookup.load_full()
    }
}

impl Default for TopicMap {
    fn default() -> Self {
        Self::new(None)
    }
}

impl fmt::Debug for TopicMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicMap")
            .field("lookup", &self.lookup.load())
            .finish_non_exhaustive()
    }
}
