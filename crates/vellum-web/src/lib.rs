//! HTTP surface for a vellum studio session.
//!
//! `vellum-web` wraps a shared [`Studio`] in an axum server: a REST API for
//! generation, refinement, history, undo/redo and the element overlay, plus
//! `GET /preview`, which serves the active document in a sandboxed origin.
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::{Arc, Mutex};
//! use vellum::prelude::*;
//! use vellum_web::{WebConfig, spawn_web};
//!
//! let config = StudioConfig::default();
//! let client = OpenRouterClient::new(api_key, &config)?;
//! let gateway = Arc::new(SynthesisGateway::new(Arc::new(client), &config));
//! let slot = FileSlot::new(&config.storage_path, Some(config.storage_quota_bytes));
//! let studio = Arc::new(Mutex::new(Studio::open(Box::new(slot))));
//!
//! let addr = spawn_web(studio, gateway, WebConfig::default()).await?;
//! println!("Studio: http://{addr}");
//! ```
//!
//! # Concurrency
//!
//! The studio lock is never held across a remote call. Generation and
//! refinement take a ticket under the lock, run the request on a spawned
//! task, and re-lock to apply the result. While a ticket is out the studio
//! is busy and further requests get `409 Conflict`.

mod api;
mod server;

pub use api::AppState;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use vellum::studio::Studio;
use vellum::synthesis::SynthesisGateway;

/// Configuration for the web server.
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:3001`.
    pub bind_addr: SocketAddr,
    /// Allow cross-origin requests from any origin (for a front end served
    /// from a separate dev server). Default: `true`.
    pub permissive_cors: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            permissive_cors: true,
        }
    }
}

/// Spawn the web server on a Tokio task and return the bound address.
///
/// The server runs until the Tokio runtime shuts down.
pub async fn spawn_web(
    studio: Arc<Mutex<Studio>>,
    gateway: Arc<SynthesisGateway>,
    config: WebConfig,
) -> std::io::Result<SocketAddr> {
    let router = server::build_router(AppState { studio, gateway }, config.permissive_cors);
    server::start_server(router, config.bind_addr).await
}
