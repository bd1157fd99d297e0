//! Named, pure string transforms applied by process actions.

use std::collections::HashMap;

/// A transform: pure string to string.
pub type TransformFn = fn(&str) -> String;

/// Table of named transforms, passed into the engine as an explicit
/// capability. Applying an unknown name returns a sentinel string rather
/// than an error; chained actions may depend on that placeholder value.
pub struct TransformRegistry {
    funcs: HashMap<String, TransformFn>,
}

impl TransformRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            funcs: HashMap::new(),
        }
    }

    /// Create a registry with the built-in transforms registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("getAnonymizedIP", anonymized_ip);
        registry.register("addToEvent", add_to_event);
        registry
    }

    /// Register a transform under a name, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, func: TransformFn) {
        self.funcs.insert(name.into(), func);
    }

    /// Apply the named transform, or return the unknown-name sentinel.
    pub fn apply(&self, name: &str, input: &str) -> String {
        match self.funcs.get(name) {
            Some(func) => func(input),
            None => format!("no such function: {name}"),
        }
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Identity transform: copy the input into the event unchanged.
fn add_to_event(input: &str) -> String {
    input.to_string()
}

/// Anonymize an IP address.
///
/// Dotted input is treated as IPv4: the last octet becomes `0`. Anything
/// else is treated as colon-delimited IPv6: the last five blocks are dropped
/// and the remainder is terminated with `::`. The five-block count is kept
/// for compatibility with existing downstream consumers; the block count
/// saturates at zero instead of panicking on short inputs.
fn anonymized_ip(input: &str) -> String {
    if input.contains('.') {
        let parts: Vec<&str> = input.split('.').collect();
        let mut anonymized = parts[..parts.len() - 1].join(".");
        anonymized.push_str(".0");
        return anonymized;
    }

    let parts: Vec<&str> = input.split(':').collect();
    let keep = parts.len().saturating_sub(5);
    let mut anonymized = parts[..keep].join(":");
    anonymized.push_str("::");
    anonymized
}
