//! Configuration types and the process-wide configuration store.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Top-level configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FlowConfig {
    /// Global settings
    pub settings: Settings,
    /// Flows (evaluated in configuration order, first match wins)
    pub flows: Vec<Flow>,
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the HTTP listener binds to
    pub listen_addr: String,
    /// Timeout for outbound forward calls (ms)
    pub forward_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
            forward_timeout_ms: 5000,
        }
    }
}

/// One flow: a claim predicate set, event extraction rules, and an action tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    /// Opaque identifier, serialized back to the caller; never used for lookup
    #[serde(default)]
    pub id: i64,
    /// Flow name (for logging/debugging)
    pub name: String,
    /// Claim predicates (implicitly AND-ed)
    #[serde(default)]
    pub responsibilities: Vec<Responsibility>,
    /// Event extraction rules
    #[serde(default, rename = "eventKeys")]
    pub event_keys: Vec<EventKey>,
    /// Roots of the action trees executed on a claim
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// One claim predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Responsibility {
    /// Selector for the request attribute to compare (matching vocabulary)
    #[serde(rename = "where")]
    pub selector: String,
    /// Expected value
    #[serde(rename = "what")]
    pub expected: String,
    /// Comparison mode
    #[serde(rename = "how")]
    pub mode: CompareMode,
}

/// Comparison mode for a responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompareMode {
    /// Resolved value equals the expected value
    EqualsTrue,
    /// Resolved value differs from the expected value
    EqualsFalse,
    /// Expected value is a substring of the resolved value
    ContainsTrue,
    /// Expected value is not a substring of the resolved value
    ContainsFalse,
}

/// One event extraction rule.
///
/// The destination key is explicit and distinct from the source selector;
/// selectors are not unique or stable identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventKey {
    /// Selector for the request attribute to read (extraction vocabulary)
    #[serde(rename = "where")]
    pub selector: String,
    /// Event key the resolved value is stored under
    #[serde(rename = "what")]
    pub key: String,
}

/// One node in an action tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// What this node does
    #[serde(flatten)]
    pub kind: ActionKind,
    /// Child actions, executed after this node's own effect
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub then: Vec<Action>,
}

/// Action variants, discriminated by the `what` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "what", rename_all = "camelCase")]
pub enum ActionKind {
    /// Forward event data to an external endpoint
    Forward {
        /// Target URL
        #[serde(rename = "where")]
        target: String,
        /// Outbound request specifics
        #[serde(rename = "howForward")]
        how: ForwardSpec,
    },
    /// Derive new event values via named transforms
    Process {
        /// Steps applied in order
        #[serde(rename = "howProcess")]
        steps: Vec<ProcessStep>,
    },
}

/// Outbound request specifics for a forward action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardSpec {
    /// HTTP verb of the outbound request
    #[serde(rename = "requestMethod")]
    pub request_method: String,
    /// Header mappings: destination header name <- source event key
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<FieldMapping>,
    /// Query mappings: destination parameter name <- source event key
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query: Vec<FieldMapping>,
}

/// Destination name / source event key pair used by forward mappings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Destination header or parameter name
    #[serde(rename = "where")]
    pub name: String,
    /// Source event key
    #[serde(rename = "what")]
    pub source: String,
}

/// One step of a process action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessStep {
    /// Event key the result is written to
    #[serde(rename = "where")]
    pub dest: String,
    /// Source event key, or a literal if the key does not exist
    #[serde(rename = "what")]
    pub source: String,
    /// Transform name
    #[serde(rename = "how")]
    pub transform: String,
}

/// Errors surfaced by strict configuration parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parse a configuration file strictly, by extension (YAML or JSON).
pub fn parse_file(path: &Path) -> Result<FlowConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = if path.extension().is_some_and(|e| e == "yaml" || e == "yml") {
        serde_yaml::from_str(&content)?
    } else {
        serde_json::from_str(&content)?
    };
    Ok(config)
}

/// Process-wide configuration state.
///
/// Loaded once at startup; requests read cheap immutable snapshots. An
/// explicit [`reload`](ConfigStore::reload) re-reads the file and swaps the
/// snapshot atomically.
pub struct ConfigStore {
    path: Option<PathBuf>,
    current: RwLock<Arc<FlowConfig>>,
}

impl ConfigStore {
    /// Load from a file, degrading to the empty configuration on absence or
    /// parse failure: no flow will ever claim a request, but the process
    /// keeps serving.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = match parse_file(&path) {
            Ok(config) => {
                info!(path = %path.display(), flows = config.flows.len(), "Loaded configuration");
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load configuration, starting with no flows");
                FlowConfig::default()
            }
        };

        Self {
            path: Some(path),
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Wrap an already-parsed configuration (no backing file; reload is a no-op).
    pub fn from_config(config: FlowConfig) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Current configuration snapshot.
    pub async fn snapshot(&self) -> Arc<FlowConfig> {
        self.current.read().await.clone()
    }

    /// Re-read the backing file and swap the snapshot.
    ///
    /// A failed reload keeps the currently active configuration.
    pub async fn reload(&self) {
        let Some(ref path) = self.path else {
            debug!("Configuration has no backing file, reload skipped");
            return;
        };

        match parse_file(path) {
            Ok(config) => {
                let flows = config.flows.len();
                *self.current.write().await = Arc::new(config);
                info!(path = %path.display(), flows, "Reloaded configuration");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Reload failed, keeping active configuration");
            }
        }
    }
}
