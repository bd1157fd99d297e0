//! Inbound request view consumed by the engine.

use std::collections::HashMap;

/// Everything the engine is allowed to see about one inbound request.
///
/// Header names are stored lowercased; lookups are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// HTTP method
    pub method: String,
    /// Hostname (without port)
    pub hostname: String,
    /// Request path (without query string)
    pub path: String,
    /// Raw query string (without leading ?)
    pub query_string: Option<String>,
    /// Parsed query parameters
    pub query_params: HashMap<String, Vec<String>>,
    /// Request headers (names lowercased)
    pub headers: HashMap<String, Vec<String>>,
    /// Client remote address
    pub client_ip: String,
}

impl RequestContext {
    /// Create a minimal GET request view.
    pub fn new(hostname: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            hostname: hostname.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set the client remote address.
    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = ip.into();
        self
    }

    /// Add a request header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.to_lowercase())
            .or_default()
            .push(value.into());
        self
    }

    /// Add a query parameter.
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Set and parse the raw query string.
    pub fn with_query_string(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query_params = parse_query_string(Some(&query));
        self.query_string = Some(query);
        self
    }

    /// Get a single header value (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .and_then(|v| v.first())
            .map(|s| s.as_str())
    }

    /// Get a single query parameter value.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_params
            .get(name)
            .and_then(|v| v.first())
            .map(|s| s.as_str())
    }

    /// Hostname concatenated with path.
    pub fn request_uri(&self) -> String {
        format!("{}{}", self.hostname, self.path)
    }
}

/// Parse a query string into a parameter map.
pub fn parse_query_string(query: Option<&str>) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();

    if let Some(qs) = query {
        for part in qs.split('&') {
            if let Some((k, v)) = part.split_once('=') {
                let key = urlencoding::decode(k)
                    .unwrap_or_else(|_| k.into())
                    .to_string();
                let value = urlencoding::decode(v)
                    .unwrap_or_else(|_| v.into())
                    .to_string();
                params.entry(key).or_default().push(value);
            } else if !part.is_empty() {
                let key = urlencoding::decode(part)
                    .unwrap_or_else(|_| part.into())
                    .to_string();
                params.entry(key).or_default().push(String::new());
            }
        }
    }

    params
}
