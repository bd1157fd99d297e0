//! Integration tests for the flowtrack engine.

use async_trait::async_trait;
use flowtrack::action::{ActionRunner, ForwardError, ForwardRequest, Forwarder};
use flowtrack::config::{Action, ConfigStore, FlowConfig};
use flowtrack::{Event, FlowEngine, Outcome, RequestContext, TransformRegistry};
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Forwarder that records every request and answers with a fixed status.
#[derive(Clone, Default)]
struct RecordingForwarder {
    requests: Arc<Mutex<Vec<ForwardRequest>>>,
    fail: bool,
}

impl RecordingForwarder {
    fn failing() -> Self {
        Self {
            requests: Arc::default(),
            fail: true,
        }
    }

    fn recorded(&self) -> Vec<ForwardRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Forwarder for RecordingForwarder {
    async fn forward(&self, request: ForwardRequest) -> Result<u16, ForwardError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            Err(ForwardError::InvalidMethod(request.method))
        } else {
            Ok(200)
        }
    }
}

fn runner_with(forwarder: RecordingForwarder) -> ActionRunner {
    ActionRunner::new(TransformRegistry::with_builtins(), Box::new(forwarder))
}

fn engine_with(json: &str, forwarder: RecordingForwarder) -> FlowEngine {
    let config: FlowConfig = serde_json::from_str(json).unwrap();
    FlowEngine::new(ConfigStore::from_config(config), runner_with(forwarder))
}

// =============================================================================
// Configuration Parsing Tests
// =============================================================================

#[test]
fn test_parse_minimal_config() {
    let config: FlowConfig = serde_json::from_str(r#"{ "flows": [] }"#).unwrap();
    assert!(config.flows.is_empty());
}

#[test]
fn test_parse_full_config() {
    let json = r#"{
        "settings": {
            "listen_addr": "0.0.0.0:8080",
            "forward_timeout_ms": 1000
        },
        "flows": [
            {
                "id": 1,
                "name": "track-pageview",
                "responsibilities": [
                    { "where": "request.URL.Path", "what": "/track", "how": "equalsTrue" },
                    { "where": "request.Header.X-Bot", "what": "", "how": "equalsTrue" }
                ],
                "eventKeys": [
                    { "where": "Function.IP", "what": "clientIP" },
                    { "where": "Query.campaign", "what": "campaign" }
                ],
                "actions": [
                    {
                        "what": "process",
                        "howProcess": [
                            { "where": "anonIP", "what": "clientIP", "how": "getAnonymizedIP" }
                        ],
                        "then": [
                            {
                                "what": "forward",
                                "where": "http://analytics.internal/collect",
                                "howForward": {
                                    "requestMethod": "POST",
                                    "headers": [
                                        { "where": "X-Anon-IP", "what": "anonIP" }
                                    ],
                                    "query": [
                                        { "where": "c", "what": "campaign" }
                                    ]
                                }
                            }
                        ]
                    }
                ]
            }
        ]
    }"#;
    let config: FlowConfig = serde_json::from_str(json).unwrap();

    assert_eq!(config.settings.listen_addr, "0.0.0.0:8080");
    assert_eq!(config.settings.forward_timeout_ms, 1000);

    let flow = &config.flows[0];
    assert_eq!(flow.responsibilities.len(), 2);
    assert_eq!(flow.event_keys.len(), 2);
    assert_eq!(flow.actions.len(), 1);
    assert_eq!(flow.actions[0].then.len(), 1);
}

#[test]
fn test_parse_yaml_config() {
    let yaml = r#"
flows:
  - id: 2
    name: "header-routed"
    responsibilities:
      - where: "request.Header.X-Tenant"
        what: "acme"
        how: "equalsTrue"
    actions:
      - what: "forward"
        where: "http://tenant.internal/ingest"
        howForward:
          requestMethod: "GET"
"#;
    let config: FlowConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.flows[0].name, "header-routed");
    assert_eq!(config.flows[0].actions.len(), 1);
}

#[test]
fn test_flow_serializes_back_with_wire_names() {
    let json = r#"{
        "id": 3,
        "name": "roundtrip",
        "responsibilities": [
            { "where": "request.URL.Path", "what": "/x", "how": "containsFalse" }
        ],
        "eventKeys": [
            { "where": "Function.Path", "what": "path" }
        ]
    }"#;
    let flow: flowtrack::config::Flow = serde_json::from_str(json).unwrap();
    let value = serde_json::to_value(&flow).unwrap();

    assert_eq!(value["responsibilities"][0]["where"], "request.URL.Path");
    assert_eq!(value["responsibilities"][0]["how"], "containsFalse");
    assert_eq!(value["eventKeys"][0]["what"], "path");
}

#[test]
fn test_malformed_action_is_rejected() {
    // An action without its discriminator is not silently accepted.
    let result: Result<Action, _> = serde_json::from_str(r#"{ "where": "http://x" }"#);
    assert!(result.is_err());
}

#[tokio::test]
async fn test_config_store_degrades_on_malformed_file() {
    let mut file = tempfile::NamedTempFile::with_suffix(".json").unwrap();
    file.write_all(b"{ not json").unwrap();

    let store = ConfigStore::load(file.path());
    assert!(store.snapshot().await.flows.is_empty());
}

#[tokio::test]
async fn test_config_store_reload_swaps_snapshot() {
    let mut file = tempfile::NamedTempFile::with_suffix(".json").unwrap();
    file.write_all(br#"{ "flows": [ { "id": 1, "name": "a" } ] }"#)
        .unwrap();
    file.flush().unwrap();

    let store = ConfigStore::load(file.path());
    assert_eq!(store.snapshot().await.flows.len(), 1);

    std::fs::write(
        file.path(),
        br#"{ "flows": [ { "id": 1, "name": "a" }, { "id": 2, "name": "b" } ] }"#,
    )
    .unwrap();
    store.reload().await;
    assert_eq!(store.snapshot().await.flows.len(), 2);

    // A broken edit keeps the active configuration.
    std::fs::write(file.path(), b"{ not json").unwrap();
    store.reload().await;
    assert_eq!(store.snapshot().await.flows.len(), 2);
}

// =============================================================================
// Flow Matching Tests
// =============================================================================

#[tokio::test]
async fn test_first_match_wins_across_flows() {
    let json = r#"{
        "flows": [
            { "id": 1, "name": "first", "responsibilities": [
                { "where": "request.URL.Path", "what": "/track", "how": "equalsTrue" }
            ]},
            { "id": 2, "name": "second" }
        ]
    }"#;
    let engine = engine_with(json, RecordingForwarder::default());

    let ctx = RequestContext::new("example.com", "/track");
    let Outcome::Claimed { flow, .. } = engine.handle(&ctx).await else {
        panic!("expected a claim");
    };
    assert_eq!(flow.name, "first");

    // The catch-all still claims everything the first flow does not.
    let ctx = RequestContext::new("example.com", "/other");
    let Outcome::Claimed { flow, .. } = engine.handle(&ctx).await else {
        panic!("expected a claim");
    };
    assert_eq!(flow.name, "second");
}

#[tokio::test]
async fn test_zero_responsibility_flow_claims_any_request() {
    let engine = engine_with(
        r#"{ "flows": [ { "id": 1, "name": "catch-all" } ] }"#,
        RecordingForwarder::default(),
    );

    for path in ["/", "/track", "/deep/nested/path"] {
        let ctx = RequestContext::new("example.com", path);
        assert!(matches!(
            engine.handle(&ctx).await,
            Outcome::Claimed { .. }
        ));
    }
}

#[tokio::test]
async fn test_all_predicate_modes_in_one_flow() {
    let json = r#"{
        "flows": [
            { "id": 1, "name": "strict", "responsibilities": [
                { "where": "request.URL.Path", "what": "/track", "how": "equalsTrue" },
                { "where": "request.URL.Hostname", "what": "internal", "how": "equalsFalse" },
                { "where": "request.Header.User-Agent", "what": "curl", "how": "containsTrue" },
                { "where": "request.Query.debug", "what": "1", "how": "containsFalse" }
            ]}
        ]
    }"#;
    let engine = engine_with(json, RecordingForwarder::default());

    let ctx = RequestContext::new("example.com", "/track").with_header("User-Agent", "curl/8.0");
    assert!(matches!(
        engine.handle(&ctx).await,
        Outcome::Claimed { .. }
    ));

    let ctx = RequestContext::new("example.com", "/track")
        .with_header("User-Agent", "curl/8.0")
        .with_query("debug", "1");
    assert!(matches!(engine.handle(&ctx).await, Outcome::NotClaimed));
}

// =============================================================================
// Action Interpreter Tests
// =============================================================================

#[tokio::test]
async fn test_action_tree_runs_depth_first() {
    let forwarder = RecordingForwarder::default();
    let runner = runner_with(forwarder.clone());

    let actions: Vec<Action> = serde_json::from_str(
        r#"[
            {
                "what": "forward",
                "where": "http://first",
                "howForward": { "requestMethod": "GET" },
                "then": [
                    { "what": "forward", "where": "http://first-child-a", "howForward": { "requestMethod": "GET" } },
                    { "what": "forward", "where": "http://first-child-b", "howForward": { "requestMethod": "GET" } }
                ]
            },
            { "what": "forward", "where": "http://second", "howForward": { "requestMethod": "GET" } }
        ]"#,
    )
    .unwrap();

    let mut event = Event::new();
    runner.run(&actions, &mut event).await;

    let urls: Vec<String> = forwarder.recorded().into_iter().map(|r| r.url).collect();
    assert_eq!(
        urls,
        vec![
            "http://first",
            "http://first-child-a",
            "http://first-child-b",
            "http://second"
        ]
    );
}

#[tokio::test]
async fn test_children_run_even_when_parent_forward_fails() {
    let forwarder = RecordingForwarder::failing();
    let runner = runner_with(forwarder.clone());

    let actions: Vec<Action> = serde_json::from_str(
        r#"[
            {
                "what": "forward",
                "where": "http://unreachable",
                "howForward": { "requestMethod": "GET" },
                "then": [
                    { "what": "process", "howProcess": [
                        { "where": "a", "what": "A", "how": "addToEvent" }
                    ]},
                    { "what": "process", "howProcess": [
                        { "where": "b", "what": "B", "how": "addToEvent" }
                    ]}
                ]
            }
        ]"#,
    )
    .unwrap();

    let mut event = Event::new();
    runner.run(&actions, &mut event).await;

    assert_eq!(event.get("a"), Some("A"));
    assert_eq!(event.get("b"), Some("B"));
    assert_eq!(runner.forward_errors(), 1);
}

#[tokio::test]
async fn test_forward_assembles_headers_and_query_from_event() {
    let forwarder = RecordingForwarder::default();
    let runner = runner_with(forwarder.clone());

    let actions: Vec<Action> = serde_json::from_str(
        r#"[
            {
                "what": "forward",
                "where": "http://analytics.internal/collect",
                "howForward": {
                    "requestMethod": "POST",
                    "headers": [
                        { "where": "X-Anon-IP", "what": "anonIP" },
                        { "where": "X-Missing", "what": "absent" }
                    ],
                    "query": [
                        { "where": "page", "what": "path" },
                        { "where": "gone", "what": "absent" }
                    ]
                }
            }
        ]"#,
    )
    .unwrap();

    let mut event = Event::new();
    event.insert("anonIP", "203.0.113.0");
    event.insert("path", "/track");
    runner.run(&actions, &mut event).await;

    let recorded = forwarder.recorded();
    assert_eq!(recorded.len(), 1);

    let request = &recorded[0];
    assert_eq!(request.method, "POST");
    // Missing event keys are skipped, present ones are encoded.
    assert_eq!(request.url, "http://analytics.internal/collect?page=%2Ftrack");
    assert_eq!(
        request.headers,
        vec![("X-Anon-IP".to_string(), "203.0.113.0".to_string())]
    );
}

#[tokio::test]
async fn test_process_literal_source_and_chained_lookup() {
    let runner = runner_with(RecordingForwarder::default());

    // First step seeds a value from a literal; the second reads it back as
    // an event key and anonymizes it; the third records an unknown transform.
    let actions: Vec<Action> = serde_json::from_str(
        r#"[
            { "what": "process", "howProcess": [
                { "where": "rawIP", "what": "192.168.1.77", "how": "addToEvent" },
                { "where": "anonIP", "what": "rawIP", "how": "getAnonymizedIP" },
                { "where": "oops", "what": "rawIP", "how": "redactEverything" }
            ]}
        ]"#,
    )
    .unwrap();

    let mut event = Event::new();
    runner.run(&actions, &mut event).await;

    assert_eq!(event.get("rawIP"), Some("192.168.1.77"));
    assert_eq!(event.get("anonIP"), Some("192.168.1.0"));
    assert_eq!(event.get("oops"), Some("no such function: redactEverything"));
}

// =============================================================================
// End-to-End Scenarios
// =============================================================================

const TRACKING_CONFIG: &str = r#"{
    "flows": [
        {
            "id": 1,
            "name": "track-pageview",
            "responsibilities": [
                { "where": "request.URL.Path", "what": "/track", "how": "equalsTrue" }
            ],
            "eventKeys": [
                { "where": "Function.IP", "what": "clientIP" },
                { "where": "Function.Path", "what": "path" }
            ],
            "actions": [
                {
                    "what": "process",
                    "howProcess": [
                        { "where": "anonIP", "what": "clientIP", "how": "getAnonymizedIP" }
                    ],
                    "then": [
                        {
                            "what": "forward",
                            "where": "http://analytics.internal/collect",
                            "howForward": {
                                "requestMethod": "GET",
                                "query": [
                                    { "where": "ip", "what": "anonIP" },
                                    { "where": "page", "what": "path" }
                                ]
                            }
                        }
                    ]
                }
            ]
        }
    ]
}"#;

#[tokio::test]
async fn test_tracking_request_is_claimed_and_anonymized() {
    let forwarder = RecordingForwarder::default();
    let engine = engine_with(TRACKING_CONFIG, forwarder.clone());

    let ctx = RequestContext::new("example.com", "/track").with_client_ip("203.0.113.42");
    let Outcome::Claimed { flow, event } = engine.handle(&ctx).await else {
        panic!("expected a claim");
    };

    assert_eq!(flow.name, "track-pageview");
    assert_eq!(event.get("clientIP"), Some("203.0.113.42"));
    assert_eq!(event.get("anonIP"), Some("203.0.113.0"));

    let recorded = forwarder.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(
        recorded[0].url,
        "http://analytics.internal/collect?ip=203.0.113.0&page=%2Ftrack"
    );
}

#[tokio::test]
async fn test_other_path_is_not_claimed() {
    let forwarder = RecordingForwarder::default();
    let engine = engine_with(TRACKING_CONFIG, forwarder.clone());

    let ctx = RequestContext::new("example.com", "/other").with_client_ip("203.0.113.42");
    assert!(matches!(engine.handle(&ctx).await, Outcome::NotClaimed));

    assert!(forwarder.recorded().is_empty());
    assert_eq!(engine.requests_total(), 1);
    assert_eq!(engine.requests_claimed(), 0);
}

#[tokio::test]
async fn test_forward_failure_is_contained() {
    let forwarder = RecordingForwarder::failing();
    let engine = engine_with(TRACKING_CONFIG, forwarder.clone());

    let ctx = RequestContext::new("example.com", "/track").with_client_ip("203.0.113.42");
    let Outcome::Claimed { event, .. } = engine.handle(&ctx).await else {
        panic!("expected a claim despite the transport failure");
    };

    // The event still carries the processed values.
    assert_eq!(event.get("anonIP"), Some("203.0.113.0"));
    assert_eq!(engine.forward_errors(), 1);
}
