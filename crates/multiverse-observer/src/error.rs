//! Error types for the multiverse HTTP API.
//!
//! [`ObserverError`] unifies all failure modes into a single enum that
//! can be converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use multiverse_core::MultiverseError;

/// Errors that can occur in the HTTP API layer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The request body could not be decoded into a universe.
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// The multiverse refused the operation.
    #[error(transparent)]
    Multiverse(#[from] MultiverseError),
}

impl ObserverError {
    /// HTTP status this error maps to.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::Multiverse(MultiverseError::Full { .. }) => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_multiverse_is_a_conflict() {
        let err = ObserverError::from(MultiverseError::Full { capacity: 3 });
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "multiverse is full (3 universes)");
    }

    #[test]
    fn invalid_body_is_a_bad_request() {
        let err = ObserverError::InvalidBody("expected value".to_owned());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
