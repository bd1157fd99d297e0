//! Declarative request-flow tracking and event forwarding engine.
//!
//! Incoming HTTP requests are classified against configured flows:
//!
//! - A flow claims a request when all of its responsibilities (selector,
//!   expected value, comparison mode) hold; first match in configuration
//!   order wins.
//! - A claimed flow extracts a flat event record from the request via
//!   dot-delimited selectors.
//! - The flow's action trees then run against the event: forwarding event
//!   data to external endpoints, or deriving new values via named transforms,
//!   with child actions chained after their parent.
//!
//! ## Configuration Example
//!
//! ```json
//! {
//!   "flows": [
//!     {
//!       "id": 1,
//!       "name": "track-pageview",
//!       "responsibilities": [
//!         { "where": "request.URL.Path", "what": "/track", "how": "equalsTrue" }
//!       ],
//!       "eventKeys": [
//!         { "where": "Function.IP", "what": "clientIP" }
//!       ],
//!       "actions": [
//!         {
//!           "what": "process",
//!           "howProcess": [
//!             { "where": "anonIP", "what": "clientIP", "how": "getAnonymizedIP" }
//!           ]
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```

pub mod action;
pub mod config;
pub mod context;
pub mod engine;
pub mod event;
pub mod matcher;
pub mod selector;
pub mod server;
pub mod transform;

pub use action::{ActionRunner, ForwardError, ForwardRequest, Forwarder, HttpForwarder};
pub use config::{ConfigStore, FlowConfig};
pub use context::RequestContext;
pub use engine::{FlowEngine, Outcome};
pub use event::Event;
pub use transform::TransformRegistry;
