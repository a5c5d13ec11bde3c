//! Metrics middleware for automatic API operation tracking
//!
//! Intercepts all requests and records metrics based on HTTP method and path.

use crate::metrics::{ApiOperation, api_metrics};
use axum::{body::Body, extract::Request, http::Method, middleware::Next, response::Response};
use std::time::Instant;

/// Extract the API operation from HTTP method and path
fn extract_operation(method: &Method, path: &str) -> Option<ApiOperation> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method, segments.as_slice()) {
        (m, []) if m == Method::GET => Some(ApiOperation::GetConfiguration),
        (m, ["restaurants"]) if m == Method::POST => Some(ApiOperation::CreateRestaurant),
        (m, ["restaurants", "rating"]) if m == Method::POST => Some(ApiOperation::RateRestaurant),
        (m, ["restaurants", "cuisine", _]) if m == Method::GET => Some(ApiOperation::TopByCuisine),
        (m, ["restaurants", "region", _]) if m == Method::GET => Some(ApiOperation::TopByRegion),
        (m, ["restaurants", "region", _, "cuisine", _]) if m == Method::GET => {
            Some(ApiOperation::TopByRegionAndCuisine)
        }
        (m, ["restaurants", _]) if m == Method::GET => Some(ApiOperation::GetRestaurant),
        (m, ["restaurants", _]) if m == Method::DELETE => Some(ApiOperation::DeleteRestaurant),
        _ => None,
    }
}

/// Metrics middleware that records API operation metrics
pub async fn metrics_layer(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let operation = extract_operation(request.method(), request.uri().path());

    let response = next.run(request).await;

    if let Some(op) = operation {
        let latency_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
        api_metrics().record_operation(op, response.status().as_u16(), latency_us);
    }

    response
}
