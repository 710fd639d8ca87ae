use crate::AppState;
use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;

/// GET /*key
///
/// Sends the visitor to the stored destination. The key is the whole path
/// after the leading `/`. Unknown keys go to the "add a link" form with the
/// key pre-filled.
pub async fn redirect(State(state): State<Arc<AppState>>, Path(key): Path<String>) -> Response {
    // Blocks this worker while a `set` holds the write lock through its fsync.
    // Lookups are a map read, so they are not moved to the blocking pool.
    match state.store.get(&key) {
        Some(url) => temporary_redirect(&url),
        None => {
            tracing::debug!("No link for key '{}'", key);
            Redirect::temporary(&not_found_location(&key)).into_response()
        }
    }
}

/// GET /
pub async fn index() -> Redirect {
    Redirect::temporary("/setlink")
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// 307 to `location`. Unlike `Redirect::temporary` this never panics on a
/// destination that cannot be sent as a header.
pub(crate) fn temporary_redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, value)]).into_response()
        }
        Err(_) => {
            tracing::error!("Destination '{}' is not a valid Location header", location);
            (StatusCode::INTERNAL_SERVER_ERROR, "invalid destination").into_response()
        }
    }
}

fn not_found_location(key: &str) -> String {
    match serde_urlencoded::to_string(vec![("not_found", key)]) {
        Ok(query) => format!("/setlink?{query}"),
        Err(e) => {
            tracing::warn!("Could not encode not_found key '{}': {}", key, e);
            "/setlink".to_owned()
        }
    }
}
