//! Action tree interpretation: forwarding and processing.

use crate::config::{Action, ActionKind, FieldMapping, ForwardSpec, ProcessStep};
use crate::event::Event;
use crate::transform::TransformRegistry;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Fully assembled outbound request for a forward action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRequest {
    /// HTTP verb
    pub method: String,
    /// Target URL including the assembled query string
    pub url: String,
    /// Header name/value pairs
    pub headers: Vec<(String, String)>,
}

/// Errors from issuing a forward call.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("invalid request method: {0}")]
    InvalidMethod(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Seam for the outbound forward call.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Issue the request and return the response status code.
    async fn forward(&self, request: ForwardRequest) -> Result<u16, ForwardError>;
}

/// Production forwarder: reqwest with a bounded timeout.
pub struct HttpForwarder {
    client: reqwest::Client,
}

impl HttpForwarder {
    /// Create a forwarder whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ForwardError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, request: ForwardRequest) -> Result<u16, ForwardError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| ForwardError::InvalidMethod(request.method.clone()))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await?;
        Ok(response.status().as_u16())
    }
}

/// Walks the action trees of a claimed flow against one event.
pub struct ActionRunner {
    registry: TransformRegistry,
    forwarder: Box<dyn Forwarder>,
    forward_errors: AtomicU64,
}

impl ActionRunner {
    /// Create a runner over a transform registry and a forwarder.
    pub fn new(registry: TransformRegistry, forwarder: Box<dyn Forwarder>) -> Self {
        Self {
            registry,
            forwarder,
            forward_errors: AtomicU64::new(0),
        }
    }

    /// Total forward calls that failed since startup.
    pub fn forward_errors(&self) -> u64 {
        self.forward_errors.load(Ordering::Relaxed)
    }

    /// Execute the action trees depth-first, mutating the event in place.
    ///
    /// An explicit work-list keeps stack depth bounded. A node's children run
    /// after its own effect, unconditionally; a failed forward never blocks
    /// its subtree.
    pub async fn run(&self, actions: &[Action], event: &mut Event) {
        let mut stack: Vec<&Action> = actions.iter().rev().collect();

        while let Some(action) = stack.pop() {
            match &action.kind {
                ActionKind::Forward { target, how } => {
                    self.run_forward(target, how, event).await;
                }
                ActionKind::Process { steps } => {
                    self.run_process(steps, event);
                }
            }

            for child in action.then.iter().rev() {
                stack.push(child);
            }
        }
    }

    async fn run_forward(&self, target: &str, how: &ForwardSpec, event: &Event) {
        let url = build_forward_url(target, &how.query, event);

        let mut headers = Vec::new();
        for mapping in &how.headers {
            match event.get(&mapping.source) {
                Some(value) => headers.push((mapping.name.clone(), value.to_string())),
                None => warn!(
                    key = %mapping.source,
                    header = %mapping.name,
                    "Event has no key for forward header mapping, skipping"
                ),
            }
        }

        let request = ForwardRequest {
            method: how.request_method.clone(),
            url,
            headers,
        };

        match self.forwarder.forward(request).await {
            Ok(status) => debug!(target, status, "Forward action completed"),
            Err(e) => {
                self.forward_errors.fetch_add(1, Ordering::Relaxed);
                warn!(target, error = %e, "Forward action failed");
            }
        }
    }

    fn run_process(&self, steps: &[ProcessStep], event: &mut Event) {
        for step in steps {
            // Event lookup if the key exists, else the configured string is
            // the literal input.
            let input = match event.get(&step.source) {
                Some(value) => value.to_string(),
                None => step.source.clone(),
            };

            let output = self.registry.apply(&step.transform, &input);
            debug!(
                transform = %step.transform,
                dest = %step.dest,
                "Process step applied"
            );
            event.insert(step.dest.clone(), output);
        }
    }
}

/// Combine the target URL with a query string assembled from the mappings
/// whose source key exists in the event. Missing keys are skipped.
fn build_forward_url(target: &str, query: &[FieldMapping], event: &Event) -> String {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for mapping in query {
        match event.get(&mapping.source) {
            Some(value) => pairs.push((mapping.name.clone(), value.to_string())),
            None => warn!(
                key = %mapping.source,
                param = %mapping.name,
                "Event has no key for forward query mapping, skipping"
            ),
        }
    }

    if pairs.is_empty() {
        return target.to_string();
    }

    let query_string: String = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", target, query_string)
}
