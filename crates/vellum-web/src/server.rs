//! Axum server setup and router construction.

use std::net::SocketAddr;

use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::api::{self, AppState};

/// Build the full axum router.
///
/// The router serves:
/// - the sandboxed preview at `/preview`
/// - REST API at `/api/*`
///
/// Every state-changing request passes [`api::guard_mutations`] first.
pub fn build_router(state: AppState, permissive_cors: bool) -> Router {
    let router = Router::new()
        .route("/preview", get(api::get_preview))
        .route("/api/state", get(api::get_state))
        .route("/api/history", get(api::get_history))
        .route("/api/active", get(api::get_active))
        .route("/api/notices", get(api::get_notices))
        .route("/api/generate", post(api::post_generate))
        .route("/api/refine", post(api::post_refine))
        .route("/api/undo", post(api::post_undo))
        .route("/api/redo", post(api::post_redo))
        .route("/api/activate", post(api::post_activate))
        .route("/api/rename", post(api::post_rename))
        .route("/api/artifacts/{id}", delete(api::delete_artifact))
        .route("/api/import", post(api::post_import))
        .route("/api/export/{id}", get(api::get_export))
        .route("/api/overlay/mode", post(api::post_mode))
        .route("/api/overlay/view", post(api::post_view))
        .route("/api/overlay/pointer", post(api::post_pointer))
        .route("/api/overlay/action", post(api::post_action))
        .route("/api/overlay/answer", post(api::post_answer))
        .route("/api/overlay/dismiss", post(api::post_dismiss))
        .layer(middleware::from_fn(api::guard_mutations))
        .with_state(state);

    if !permissive_cors {
        return router;
    }

    // CORS layer for development (front end on a different port).
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    router.layer(cors)
}

/// Start the axum server and return the bound address.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;
    info!("Listening on http://{addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("Server stopped: {e}");
        }
    });

    Ok(addr)
}
