//! Axum router construction for the multiverse API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for cross-origin browser clients.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /api/health` -- liveness probe
/// - `POST /api/universe` -- create a universe
/// - `POST /api/bigbang` -- remove every universe
/// - `POST /api/merge` -- tile all universes into one
/// - `GET /ws/updates` -- `WebSocket` multiverse stream
///
/// REST routes get the read (request body) and write (response) limits;
/// the upgrade route gets the handshake limit.
pub fn build_router(state: Arc<AppState>) -> Router {
    let timeouts = state.timeouts;
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/universe", post(handlers::create_universe))
        .route("/api/bigbang", post(handlers::reset))
        .route("/api/merge", post(handlers::merge))
        .layer(RequestBodyTimeoutLayer::new(timeouts.read))
        .layer(TimeoutLayer::new(timeouts.write));

    let stream = Router::new()
        .route("/ws/updates", get(ws::ws_updates))
        .layer(TimeoutLayer::new(timeouts.ws_handshake));

    api.merge(stream)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
