//! Browser-facing studio server.
//!
//! Serves the vellum REST API and the sandboxed `/preview` document for a
//! single studio session backed by an on-disk history file.
//!
//! # Usage
//!
//! ```bash
//! OPENROUTER_KEY=sk-... cargo run -p vellum-web
//! OPENROUTER_KEY=sk-... cargo run -p vellum-web -- --port 8080 --store ./history.json
//! ```
//!
//! ## Generating
//!
//! ```bash
//! curl -X POST localhost:3001/api/generate \
//!      -H 'content-type: application/json' \
//!      -d '{"prompt": "a pomodoro timer", "style": "Retro"}'
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use vellum::prelude::*;
use vellum_web::{WebConfig, spawn_web};

/// Browser-facing studio server.
#[derive(Parser)]
#[command(about = "Generate and refine single-file web apps from a browser")]
struct Args {
    /// Model to use.
    #[arg(long, default_value = vellum::DEFAULT_MODEL)]
    model: String,

    /// Port for the web server.
    #[arg(long, default_value_t = 3001)]
    port: u16,

    /// Bind on all interfaces instead of loopback.
    #[arg(long)]
    public: bool,

    /// History file.
    #[arg(long)]
    store: Option<PathBuf>,

    /// Storage quota for the history file, in bytes.
    #[arg(long)]
    quota: Option<usize>,

    /// Reject cross-origin requests.
    #[arg(long)]
    strict_cors: bool,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_env("VELLUM_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = StudioConfig::default().with_model(&args.model);
    if let Some(path) = args.store {
        config = config.with_storage_path(path);
    }
    if let Some(quota) = args.quota {
        config = config.with_storage_quota(quota);
    }

    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "Set OPENROUTER_KEY env var to your OpenRouter API key")?;
    let client = OpenRouterClient::new(api_key, &config)
        .map_err(|e| format!("failed to create API client: {e}"))?;
    let gateway = Arc::new(SynthesisGateway::new(Arc::new(client), &config));

    let slot = FileSlot::new(&config.storage_path, Some(config.storage_quota_bytes));
    let studio = Studio::open(Box::new(slot));
    info!(
        "Loaded {} artifact(s) from {}",
        studio.history().len(),
        config.storage_path.display()
    );
    let studio = Arc::new(Mutex::new(studio));

    let host = if args.public {
        [0, 0, 0, 0]
    } else {
        [127, 0, 0, 1]
    };
    let web_config = WebConfig {
        bind_addr: (host, args.port).into(),
        permissive_cors: !args.strict_cors,
    };
    let addr = spawn_web(studio, gateway, web_config)
        .await
        .map_err(|e| format!("failed to bind: {e}"))?;
    println!("Studio API: http://{addr}/api/state");
    println!("Preview:    http://{addr}/preview");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to wait for Ctrl-C: {e}"))?;
    info!("Shutting down");
    Ok(())
}
