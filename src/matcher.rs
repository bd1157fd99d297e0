//! Flow matching: which flow, if any, claims a request.

use crate::config::{CompareMode, Flow};
use crate::context::RequestContext;
use crate::selector::resolve_match;
use tracing::trace;

impl CompareMode {
    /// Evaluate this comparison for a resolved value and an expected value.
    pub fn evaluate(self, resolved: &str, expected: &str) -> bool {
        match self {
            CompareMode::EqualsTrue => resolved == expected,
            CompareMode::EqualsFalse => resolved != expected,
            CompareMode::ContainsTrue => resolved.contains(expected),
            CompareMode::ContainsFalse => !resolved.contains(expected),
        }
    }
}

/// Check whether a flow claims the request: every responsibility must hold.
///
/// A flow with zero responsibilities vacuously claims.
pub fn flow_is_responsible(flow: &Flow, ctx: &RequestContext) -> bool {
    flow.responsibilities.iter().all(|responsibility| {
        let resolved = resolve_match(&responsibility.selector, ctx);
        let met = responsibility
            .mode
            .evaluate(&resolved, &responsibility.expected);
        trace!(
            flow = %flow.name,
            selector = %responsibility.selector,
            resolved = %resolved,
            expected = %responsibility.expected,
            met,
            "Evaluated responsibility"
        );
        met
    })
}

/// Find the flow claiming the request: first match in configuration order
/// wins, iteration stops at the first claim.
pub fn find_responsible<'a>(flows: &'a [Flow], ctx: &RequestContext) -> Option<&'a Flow> {
    flows.iter().find(|flow| flow_is_responsible(flow, ctx))
}
