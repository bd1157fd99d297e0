//! flowtrack CLI entry point.
//!
//! Serves the request-flow tracking engine over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use flowtrack::action::{ActionRunner, HttpForwarder};
use flowtrack::config::ConfigStore;
use flowtrack::server;
use flowtrack::{FlowEngine, TransformRegistry};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "flowtrack")]
#[command(
    author,
    version,
    about = "Declarative request-flow tracking and event forwarding"
)]
struct Args {
    /// Configuration file path (YAML or JSON)
    #[arg(short, long, default_value = "flowtrack.json")]
    config: PathBuf,

    /// Address to listen on (overrides the configured listen address)
    #[arg(long, env = "FLOWTRACK_LISTEN")]
    listen: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print example configuration and exit.
    #[arg(long)]
    example_config: bool,

    /// Validate configuration and exit.
    #[arg(long)]
    validate: bool,
}

fn print_example_config() {
    let example = r#"{
  "settings": {
    "listen_addr": "127.0.0.1:3000",
    "forward_timeout_ms": 5000
  },
  "flows": [
    {
      "id": 1,
      "name": "track-pageview",
      "responsibilities": [
        { "where": "request.URL.Path", "what": "/track", "how": "equalsTrue" }
      ],
      "eventKeys": [
        { "where": "Function.IP", "what": "clientIP" },
        { "where": "Function.Path", "what": "path" },
        { "where": "Header.User-Agent", "what": "userAgent" }
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
                "headers": [
                  { "where": "X-User-Agent", "what": "userAgent" }
                ],
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
    println!("{}", example);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }

    // Print example config if requested
    if args.example_config {
        print_example_config();
        return Ok(());
    }

    // Validate only if requested: strict parse, no degradation
    if args.validate {
        let config = flowtrack::config::parse_file(&args.config)
            .with_context(|| format!("Invalid config file: {}", args.config.display()))?;
        info!(flows = config.flows.len(), "Configuration is valid");
        return Ok(());
    }

    // Load configuration (degrades to an empty flow set on failure)
    let store = ConfigStore::load(&args.config);
    let settings = store.snapshot().await.settings.clone();

    let forwarder = HttpForwarder::new(Duration::from_millis(settings.forward_timeout_ms))
        .context("Failed to build the outbound HTTP client")?;
    let runner = ActionRunner::new(TransformRegistry::with_builtins(), Box::new(forwarder));
    let engine = Arc::new(FlowEngine::new(store, runner));

    // SIGHUP swaps in a freshly parsed configuration
    #[cfg(unix)]
    {
        let engine = engine.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let mut hangup = match signal(SignalKind::hangup()) {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install SIGHUP handler, reload disabled");
                    return;
                }
            };
            while hangup.recv().await.is_some() {
                info!("Received SIGHUP, reloading configuration");
                engine.store().reload().await;
            }
        });
    }

    let listen = args.listen.unwrap_or(settings.listen_addr);
    let addr: SocketAddr = listen
        .parse()
        .context("Invalid listen address format (expected host:port)")?;

    let app = server::router(engine);

    info!(
        config = %args.config.display(),
        listen = %addr,
        "Starting flowtrack"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Failed to run HTTP server")?;

    Ok(())
}
