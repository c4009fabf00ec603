//! REST API endpoint handlers.
//!
//! Every mutating handler takes the multiverse lock for the duration of its
//! structural change, so it is serialized against the tick driver's
//! evolve-and-evict step.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/health` | Liveness probe |
//! | `POST` | `/api/universe` | Create a universe from `{cells, colour}` |
//! | `POST` | `/api/bigbang` | Remove every universe |
//! | `POST` | `/api/merge` | Tile all universes into one |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use multiverse_core::{MergeOutcome, Universe, UniverseSeed};
use tracing::{debug, info};

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// GET /api/health
// ---------------------------------------------------------------------------

/// Report that the server is up.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

// ---------------------------------------------------------------------------
// POST /api/universe
// ---------------------------------------------------------------------------

/// Decode a universe and insert it at the configured end of the multiverse.
///
/// Responds `201` on success, `400` when the body is not a valid
/// `{cells, colour}` object with a rectangular grid, and `409` when the
/// multiverse is full.
pub async fn create_universe(
    State(state): State<Arc<AppState>>,
    body: Result<Json<UniverseSeed>, JsonRejection>,
) -> Result<impl IntoResponse, ObserverError> {
    let Json(seed) = body.map_err(|rejection| {
        debug!(error = %rejection.body_text(), "Rejected universe body");
        ObserverError::InvalidBody(rejection.body_text())
    })?;

    let universe = Universe::from(seed);
    let (height, width) = (universe.grid().height(), universe.grid().width());
    let alive = universe.alive_count();

    let count = {
        let mut multiverse = state.multiverse.lock().await;
        multiverse.insert(universe, state.insert_mode)?;
        multiverse.len()
    };

    info!(height, width, alive, count, mode = ?state.insert_mode, "Universe created");

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "ok": true, "universes": count })),
    ))
}

// ---------------------------------------------------------------------------
// POST /api/bigbang
// ---------------------------------------------------------------------------

/// Remove every universe.
pub async fn reset(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let removed = state.multiverse.lock().await.reset();
    info!(removed, "Big bang: multiverse reset");
    Json(serde_json::json!({ "ok": true, "removed": removed }))
}

// ---------------------------------------------------------------------------
// POST /api/merge
// ---------------------------------------------------------------------------

/// Replace all universes with one tiled universe. A no-op with fewer than two.
pub async fn merge(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let outcome = state.multiverse.lock().await.merge();
    let merged = matches!(outcome, MergeOutcome::Merged { .. });
    Json(serde_json::json!({ "ok": true, "merged": merged }))
}
