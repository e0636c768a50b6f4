//! CSV report endpoints

use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, HeaderValue},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use repscore_common::db::Facet;
use repscore_common::reports::{
    best, facet_csv, most_common, most_common_unknown_websites, ranked_csv, worst, FACET_SCAN_LIMIT,
    FACET_TOP, RANKED_LIMIT,
};

use super::ApiResult;
use crate::AppState;

fn csv_response(body: String) -> Response {
    (
        [(CONTENT_TYPE, HeaderValue::from_static("text/csv; charset=utf-8"))],
        body,
    )
        .into_response()
}

/// GET /v1/worst.csv
pub async fn worst_csv(State(state): State<AppState>) -> ApiResult<Response> {
    let rows = worst(state.store.as_ref(), RANKED_LIMIT).await?;
    Ok(csv_response(ranked_csv(&rows)))
}

/// GET /v1/best.csv
pub async fn best_csv(State(state): State<AppState>) -> ApiResult<Response> {
    let rows = best(state.store.as_ref(), RANKED_LIMIT).await?;
    Ok(csv_response(ranked_csv(&rows)))
}

/// GET /v1/worst_hashtags.csv
pub async fn worst_hashtags_csv(State(state): State<AppState>) -> ApiResult<Response> {
    let rows = most_common(state.store.as_ref(), Facet::Hashtags, FACET_SCAN_LIMIT, FACET_TOP).await?;
    Ok(csv_response(facet_csv(&rows)))
}

/// GET /v1/worst_websites.csv
pub async fn worst_websites_csv(State(state): State<AppState>) -> ApiResult<Response> {
    let rows = most_common(state.store.as_ref(), Facet::Websites, FACET_SCAN_LIMIT, FACET_TOP).await?;
    Ok(csv_response(facet_csv(&rows)))
}

/// GET /v1/worst_unknown_websites.csv
pub async fn worst_unknown_websites_csv(State(state): State<AppState>) -> ApiResult<Response> {
    let rows = most_common_unknown_websites(
        state.store.as_ref(),
        &state.known_websites,
        FACET_SCAN_LIMIT,
        FACET_TOP,
    )
    .await?;
    Ok(csv_response(facet_csv(&rows)))
}

pub fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/worst.csv", get(worst_csv))
        .route("/v1/best.csv", get(best_csv))
        .route("/v1/worst_hashtags.csv", get(worst_hashtags_csv))
        .route("/v1/worst_websites.csv", get(worst_websites_csv))
        .route("/v1/worst_unknown_websites.csv", get(worst_unknown_websites_csv))
}
