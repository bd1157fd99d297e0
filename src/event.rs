//! The flat event record and its extraction from a claimed flow.

use crate::config::Flow;
use crate::context::RequestContext;
use crate::selector::resolve_extract;
use std::collections::HashMap;

/// Flat record of extracted and derived values, threaded through the action
/// tree of one request. Keys are unique; later writes overwrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    data: HashMap<String, String>,
}

impl Event {
    /// Create an empty event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a value, overwriting any prior value under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), value.into());
    }

    /// Read a value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(|s| s.as_str())
    }

    /// Whether a key exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the event is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate over key/value pairs (unordered).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Build the event for a claimed flow.
///
/// Each event key resolves independently; re-running against the same
/// request view produces the same event.
pub fn extract(flow: &Flow, ctx: &RequestContext) -> Event {
    let mut event = Event::new();
    for event_key in &flow.event_keys {
        let value = resolve_extract(&event_key.selector, ctx);
        event.insert(event_key.key.clone(), value);
    }
    event
}
