use crate::{handlers::redirect::temporary_redirect, AppState};
use askama::Template;
use axum::{
    extract::{Form, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;

// ── Template structs ───────────────────────────────────────────────────────

#[derive(Template)]
#[template(path = "setlink.html")]
struct SetLinkTemplate {
    /// Key the visitor was looking for, empty when they came here directly.
    not_found_key: String,
}

// ── Form types ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SetLinkQuery {
    not_found: Option<String>,
}

#[derive(Deserialize)]
pub struct SetLinkForm {
    #[serde(default)]
    key: String,
    #[serde(default)]
    value: String,
}

// ── Handlers ───────────────────────────────────────────────────────────────

/// GET /setlink
pub async fn form(Query(query): Query<SetLinkQuery>) -> Response {
    SetLinkTemplate {
        not_found_key: query.not_found.unwrap_or_default(),
    }
    .into_response()
}

/// POST /setlink
///
/// Stores the link, then sends the visitor straight on to its destination.
/// The append may fsync, so it runs on the blocking pool.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SetLinkForm>,
) -> Response {
    // Fields are stored exactly as submitted; whitespace alone counts as empty.
    let SetLinkForm { key, value } = form;

    if key.trim().is_empty() || value.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "key and value query parameters are required",
        )
            .into_response();
    }

    // One record per line, two fields per record.
    if [&key, &value].iter().any(|s| s.contains([',', '\n', '\r'])) {
        return (
            StatusCode::BAD_REQUEST,
            "key and value must not contain commas or line breaks",
        )
            .into_response();
    }

    if HeaderValue::from_str(&value).is_err() {
        return (StatusCode::BAD_REQUEST, "value is not a usable URL").into_response();
    }

    let state_bg = state.clone();
    let (key_bg, value_bg) = (key.clone(), value.clone());
    let result =
        tokio::task::spawn_blocking(move || state_bg.store.set(key_bg, value_bg)).await;

    match result {
        Ok(Ok(())) => {
            tracing::info!("Link '{}' -> {} created", key, value);
            temporary_redirect(&value)
        }
        Ok(Err(e)) => {
            tracing::error!("Failed to save link '{}': {:?}", key, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("unexpected error occurred: {e}"),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Link write task for '{}' failed: {:?}", key, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "unexpected error occurred").into_response()
        }
    }
}

/// Any other method on /setlink
pub async fn invalid_method() -> impl IntoResponse {
    (StatusCode::NOT_IMPLEMENTED, "invalid method")
}
