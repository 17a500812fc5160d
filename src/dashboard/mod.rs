//! Status endpoint: a small Axum server exposing the engine's state.
//!
//! CORS allows GET from any origin.

pub mod routes;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use routes::AppState;

/// Start the status server in the background. Bind or serve failures are
/// logged; the bot keeps trading without it.
pub fn spawn_dashboard(state: AppState, port: u16) -> tokio::task::JoinHandle<()> {
    let app = build_router(state);

    tokio::spawn(async move {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(port, error = %e, "Failed to bind status port");
                return;
            }
        };
        info!(port, "Status server listening on http://0.0.0.0:{port}/info");

        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Status server error");
        }
    })
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/info", get(routes::get_info))
        .route("/api/status", get(routes::get_status))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
