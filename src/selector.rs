//! Dot-delimited selector resolution against a request view.
//!
//! Two vocabularies exist: the matching vocabulary used by responsibilities
//! (`request.*`) and the extraction vocabulary used by event keys
//! (`Function.* | Header.* | Query.*`). Resolution is total: an unrecognized
//! namespace or segment yields the empty string, never an error, so absence
//! is modeled as empty-string equality.

use crate::context::RequestContext;

/// Resolve a selector in the matching vocabulary.
///
/// Supports:
/// - `request.URL.Path`
/// - `request.URL.Hostname`
/// - `request.URL.RequestURI` (hostname concatenated with path)
/// - `request.Query.<name>`
/// - `request.Header.<name>`
pub fn resolve_match(selector: &str, ctx: &RequestContext) -> String {
    let parts: Vec<&str> = selector.split('.').collect();

    match parts.first().copied() {
        Some("request") => match parts.get(1).copied() {
            Some("URL") => match parts.get(2).copied() {
                Some("Path") => ctx.path.clone(),
                Some("Hostname") => ctx.hostname.clone(),
                Some("RequestURI") => ctx.request_uri(),
                _ => String::new(),
            },
            Some("Query") => match parts.get(2) {
                Some(name) => ctx.query(name).unwrap_or_default().to_string(),
                None => String::new(),
            },
            Some("Header") => match parts.get(2) {
                Some(name) => ctx.header(name).unwrap_or_default().to_string(),
                None => String::new(),
            },
            _ => String::new(),
        },
        _ => String::new(),
    }
}

/// Resolve a selector in the extraction vocabulary.
///
/// Supports:
/// - `Function.Hostname`
/// - `Function.Path`
/// - `Function.IP` (client remote address)
/// - `Header.<name>`
/// - `Query.<name>`
pub fn resolve_extract(selector: &str, ctx: &RequestContext) -> String {
    let parts: Vec<&str> = selector.split('.').collect();

    match parts.first().copied() {
        Some("Function") => match parts.get(1).copied() {
            Some("Hostname") => ctx.hostname.clone(),
            Some("Path") => ctx.path.clone(),
            Some("IP") => ctx.client_ip.clone(),
            _ => String::new(),
        },
        Some("Header") => match parts.get(1) {
            Some(name) => ctx.header(name).unwrap_or_default().to_string(),
            None => String::new(),
        },
        Some("Query") => match parts.get(1) {
            Some(name) => ctx.query(name).unwrap_or_default().to_string(),
            None => String::new(),
        },
        _ => String::new(),
    }
}
