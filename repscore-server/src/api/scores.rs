//! Score lookup endpoints
//!
//! Responses are always well-formed JSON. Unknown profiles get a
//! `last_updated: null` placeholder while a recomputation is scheduled.

use axum::{
    extract::{Path, State},
    http::{
        header::{CONTENT_TYPE, EXPIRES},
        HeaderMap, HeaderValue,
    },
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use repscore_common::service::ScoreLookup;
use repscore_common::time::http_expires;
use repscore_common::Identity;

use super::{ApiError, ApiResult};
use crate::AppState;

/// Longest handle the platform allows
const MAX_SCREEN_NAME_CHARS: usize = 15;

/// GET /v1/screen_name/:screen_name/score.json
pub async fn score_by_screen_name(
    State(state): State<AppState>,
    Path(screen_name): Path<String>,
) -> ApiResult<Response> {
    let chars = screen_name.chars().count();
    if chars == 0 || chars > MAX_SCREEN_NAME_CHARS {
        return Err(ApiError::NotFound(format!("screen name {}", screen_name)));
    }

    let lookup = state
        .service
        .lookup(&Identity::screen_name(&screen_name))
        .await;
    Ok(score_response(lookup))
}

/// GET /v1/platform_id/:platform_id/score.json
pub async fn score_by_platform_id(
    State(state): State<AppState>,
    Path(platform_id): Path<String>,
) -> ApiResult<Response> {
    let id = parse_platform_id(&platform_id)
        .ok_or_else(|| ApiError::NotFound(format!("platform id {}", platform_id)))?;

    let lookup = state.service.lookup(&Identity::platform_id(id)).await;
    Ok(score_response(lookup))
}

/// Digits only; signs and whitespace are rejected
fn parse_platform_id(raw: &str) -> Option<i64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

fn score_response(lookup: ScoreLookup) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(expires) = lookup.expires {
        if let Ok(value) = HeaderValue::from_str(&http_expires(expires)) {
            headers.insert(EXPIRES, value);
        }
    }
    (headers, lookup.body).into_response()
}

pub fn score_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/screen_name/:screen_name/score.json",
            get(score_by_screen_name),
        )
        .route(
            "/v1/platform_id/:platform_id/score.json",
            get(score_by_platform_id),
        )
}
