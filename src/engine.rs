//! Per-request orchestration: match, extract, run actions.

use crate::action::ActionRunner;
use crate::config::{ConfigStore, Flow};
use crate::context::RequestContext;
use crate::event::{extract, Event};
use crate::matcher::find_responsible;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Result of handling one request.
#[derive(Debug)]
pub enum Outcome {
    /// A flow claimed the request; the event reflects all executed actions.
    Claimed {
        /// The claiming flow definition
        flow: Flow,
        /// The final event state
        event: Event,
    },
    /// No flow claimed the request. A distinct outcome, not an error.
    NotClaimed,
}

/// The rule-matching and action-execution engine.
///
/// Holds no cross-request mutable state beyond counters; each request reads
/// an immutable configuration snapshot and traverses its own action tree.
pub struct FlowEngine {
    store: ConfigStore,
    runner: ActionRunner,
    requests_total: AtomicU64,
    requests_claimed: AtomicU64,
}

impl FlowEngine {
    /// Create an engine over a configuration store and an action runner.
    pub fn new(store: ConfigStore, runner: ActionRunner) -> Self {
        Self {
            store,
            runner,
            requests_total: AtomicU64::new(0),
            requests_claimed: AtomicU64::new(0),
        }
    }

    /// The configuration store (for reload triggers).
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Total requests handled since startup.
    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Requests claimed by some flow since startup.
    pub fn requests_claimed(&self) -> u64 {
        self.requests_claimed.load(Ordering::Relaxed)
    }

    /// Forward calls that failed since startup.
    pub fn forward_errors(&self) -> u64 {
        self.runner.forward_errors()
    }

    /// Handle one request: pick the claiming flow, build its event, execute
    /// its action trees.
    pub async fn handle(&self, ctx: &RequestContext) -> Outcome {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        let config = self.store.snapshot().await;

        let Some(flow) = find_responsible(&config.flows, ctx) else {
            debug!(path = %ctx.path, "Request not claimed");
            return Outcome::NotClaimed;
        };

        self.requests_claimed.fetch_add(1, Ordering::Relaxed);
        debug!(path = %ctx.path, flow = %flow.name, "Request claimed");

        let mut event = extract(flow, ctx);
        self.runner.run(&flow.actions, &mut event).await;

        info!(
            flow = %flow.name,
            event_keys = event.len(),
            "Flow executed"
        );

        Outcome::Claimed {
            flow: flow.clone(),
            event,
        }
    }
}
