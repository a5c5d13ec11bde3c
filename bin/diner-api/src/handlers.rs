//! Request handlers
//!
//! Handlers only translate between HTTP and the coordinator. Query
//! parameters arrive as raw strings and are normalized leniently.

use crate::error::ApiError;
use crate::metrics::{api_metrics, export_memory_cache};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use diner_common::{ConfigSnapshot, QueryLimit, RatingThreshold, RestaurantView};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

type Result<T> = std::result::Result<T, ApiError>;

/// Body of `POST /restaurants`
#[derive(Debug, Deserialize)]
pub struct CreateRestaurantRequest {
    pub name: String,
    pub cuisine: String,
    pub region: String,
}

/// Body of `POST /restaurants/rating`
#[derive(Debug, Deserialize)]
pub struct RateRestaurantRequest {
    pub name: String,
    pub rating: f64,
}

/// Query string of the ranked endpoints
#[derive(Debug, Default, Deserialize)]
pub struct RankedParams {
    pub limit: Option<String>,
    #[serde(rename = "ratingGreaterThan")]
    pub rating_greater_than: Option<String>,
}

impl RankedParams {
    fn limit(&self) -> QueryLimit {
        QueryLimit::from_param(self.limit.as_deref())
    }

    fn threshold(&self) -> Option<RatingThreshold> {
        RatingThreshold::from_param(self.rating_greater_than.as_deref())
    }
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

const SUCCESS: Json<SuccessResponse> = Json(SuccessResponse { success: true });

/// GET /
pub async fn get_configuration(State(state): State<Arc<AppState>>) -> Json<ConfigSnapshot> {
    Json(state.config.snapshot())
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// GET /metrics
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut body = api_metrics().export_prometheus(
        &state.coordinator.stats().snapshot(),
        state.coordinator.caching_enabled(),
    );
    if let Some(cache) = &state.memory_cache {
        body.push_str(&export_memory_cache(cache));
    }
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

/// POST /restaurants
///
/// # Errors
/// 409 if the name is taken, 500 on store failure.
pub async fn create_restaurant(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRestaurantRequest>,
) -> Result<Json<SuccessResponse>> {
    state
        .coordinator
        .create(&req.name, &req.cuisine, &req.region)
        .await?;
    Ok(SUCCESS)
}

/// GET /restaurants/{name}
///
/// # Errors
/// 404 if the restaurant does not exist, 500 on store failure.
pub async fn get_restaurant(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<RestaurantView>> {
    let restaurant = state.coordinator.get_by_name(&name).await?;
    Ok(Json(restaurant.view()))
}

/// DELETE /restaurants/{name}
///
/// # Errors
/// 500 on store failure.
pub async fn delete_restaurant(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<SuccessResponse>> {
    state.coordinator.delete(&name).await?;
    Ok(SUCCESS)
}

/// POST /restaurants/rating
///
/// # Errors
/// 400 for a rating outside `[0, 5]`, 404 if the restaurant does not exist,
/// 500 on store failure.
pub async fn rate_restaurant(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RateRestaurantRequest>,
) -> Result<Json<SuccessResponse>> {
    state.coordinator.rate(&req.name, req.rating).await?;
    Ok(SUCCESS)
}

fn views(rows: &[diner_common::Restaurant]) -> Json<Vec<RestaurantView>> {
    Json(rows.iter().map(RestaurantView::from).collect())
}

/// GET /restaurants/cuisine/{cuisine}
///
/// # Errors
/// 404 when nothing matches, 500 on store failure.
pub async fn top_by_cuisine(
    State(state): State<Arc<AppState>>,
    Path(cuisine): Path<String>,
    Query(params): Query<RankedParams>,
) -> Result<Json<Vec<RestaurantView>>> {
    let rows = state
        .coordinator
        .query_by_cuisine(&cuisine, params.threshold(), params.limit())
        .await?;
    Ok(views(&rows))
}

/// GET /restaurants/region/{region}
///
/// # Errors
/// 404 when nothing matches, 500 on store failure.
pub async fn top_by_region(
    State(state): State<Arc<AppState>>,
    Path(region): Path<String>,
    Query(params): Query<RankedParams>,
) -> Result<Json<Vec<RestaurantView>>> {
    let rows = state
        .coordinator
        .query_by_region(&region, params.limit())
        .await?;
    Ok(views(&rows))
}

/// GET /restaurants/region/{region}/cuisine/{cuisine}
///
/// # Errors
/// 404 when nothing matches, 500 on store failure.
pub async fn top_by_region_and_cuisine(
    State(state): State<Arc<AppState>>,
    Path((region, cuisine)): Path<(String, String)>,
    Query(params): Query<RankedParams>,
) -> Result<Json<Vec<RestaurantView>>> {
    let rows = state
        .coordinator
        .query_by_region_and_cuisine(&region, &cuisine, params.limit())
        .await?;
    Ok(views(&rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranked_params_are_lenient() {
        let params = RankedParams {
            limit: Some("abc".into()),
            rating_greater_than: Some("x".into()),
        };
        assert_eq!(params.limit(), QueryLimit::DEFAULT);
        assert!(params.threshold().is_none());

        let params = RankedParams {
            limit: Some("5".into()),
            rating_greater_than: Some("3.5".into()),
        };
        assert_eq!(params.limit().get(), 5);
        assert_eq!(params.threshold().map(RatingThreshold::get), Some(3.5));

        let params = RankedParams::default();
        assert_eq!(params.limit(), QueryLimit::DEFAULT);
        assert!(params.threshold().is_none());
    }
}
