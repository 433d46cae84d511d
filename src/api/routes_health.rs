//! # Public Endpoints
//!
//! | Endpoint | Purpose |
//! |----------|---------|
//! | `GET /` | Welcome payload with links to the main resources |
//! | `GET /api/` | Resource index |
//! | `GET /api/health/` | Database round-trip and environment summary |
//! | `GET /api-docs/` | Endpoint table as JSON |
//! | `GET /metrics` | Prometheus scraping endpoint |
//!
//! The health check runs `SELECT 1` with a 2-second timeout and answers 503
//! when the database is unreachable.

use super::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// (path, methods, description) for every documented route.
const ENDPOINTS: &[(&str, &str, &str)] = &[
    ("/api/health/", "GET", "Service and database health"),
    ("/api/plant-care/", "GET, POST", "Species care data; create fills missing care text"),
    ("/api/plant-care/{id}/", "GET, PUT, PATCH, DELETE", "Single species"),
    ("/api/care-summary/?plant_name=", "GET", "Stored or generated care summary for a plant name"),
    ("/api/plants/", "GET, POST", "Plants owned by the caller, with care data"),
    ("/api/plants/{id}/", "GET, PUT, PATCH, DELETE", "Single owned plant"),
    ("/api/plants/{id}/water/", "POST", "Mark a plant watered and schedule the next watering"),
    ("/api/user/", "GET, POST", "User accounts"),
    ("/api/user/{id}/", "GET, PUT, PATCH, DELETE", "Single user account"),
    ("/api/watering-schedules/", "GET, POST", "Watering schedule entries for the caller's plants"),
    ("/api/watering-schedules/{id}/", "GET, PUT, PATCH, DELETE", "Single schedule entry"),
    ("/api/ad-units/", "GET, POST", "Ad unit definitions"),
    ("/api/ad-units/{id}/", "GET, PUT, PATCH, DELETE", "Single ad unit"),
    ("/api/ad-units/active_ad_units/?platform=", "GET", "Active ad units for a platform"),
    ("/api/ad-units/app_config/?platform=", "GET", "Ad unit per placement for the app"),
    ("/api/ad-impressions/", "GET, POST", "Ad impressions with their clicks"),
    ("/api/ad-impressions/{id}/", "GET, DELETE", "Single impression"),
    ("/api/ad-impressions/stats/?days=", "GET", "Impression and click report"),
    ("/api/ad-clicks/", "GET, POST", "Ad clicks"),
    ("/api/ad-clicks/{id}/", "GET, DELETE", "Single click"),
    ("/api/ad-revenue/", "GET, POST", "Daily revenue per ad unit"),
    ("/api/ad-revenue/{id}/", "GET, PUT, PATCH, DELETE", "Single revenue row"),
    ("/api/ad-revenue/summary/?days=", "GET", "Revenue report"),
    ("/api/ad-revenue/process_admob_report/", "POST", "Import rows from an AdMob report"),
    ("/api/active-users/", "GET, POST", "Daily activity; POST records the caller as active"),
    ("/api/active-users/stats/?days=", "GET", "Active user report"),
    ("/api/ad-kpis/", "GET, POST", "Daily ad KPIs"),
    ("/api/ad-kpis/{id}/", "GET, PUT, PATCH, DELETE", "Single KPI row"),
    ("/api/ad-kpis/summary/?days=", "GET", "KPI report"),
    ("/api/ad-kpis/calculate_daily_kpi/", "POST", "Recompute the KPI row for one date"),
    ("/api/ad-kpis/calculate_historical_kpi/", "POST", "Recompute KPI rows for a date range"),
    ("/api/track-impression/", "POST", "Record an impression from the app"),
    ("/api/track-click/", "POST", "Record a click on an impression"),
    ("/api/admob-config/?platform=", "GET", "AdMob app id, test mode and ad units"),
    ("/api/test-ad-request/", "POST", "Create a test impression for a placement"),
];

pub async fn handler_welcome() -> impl IntoResponse {
    Json(json!({
        "message": "Welcome to PlantKeepers API",
        "status": "online",
        "version": VERSION,
        "documentation": "/api-docs/",
        "health": "/api/health/",
        "endpoints": {
            "plants": "/api/plants/",
            "plant_care": "/api/plant-care/",
            "users": "/api/user/",
            "watering_schedules": "/api/watering-schedules/",
            "admob_config": "/api/admob-config/",
        },
    }))
}

pub async fn handler_api_root() -> impl IntoResponse {
    let mut resources = Map::new();
    for (path, _, _) in ENDPOINTS {
        // Only collection roots: "/api/<name>/".
        let Some(name) = path.strip_prefix("/api/").and_then(|p| p.strip_suffix('/')) else {
            continue;
        };
        if !name.contains('/') {
            resources.insert(name.replace('-', "_"), Value::String(path.to_string()));
        }
    }
    Json(Value::Object(resources))
}

/// Public label for a database check. Failure details go to the log only.
fn database_status(
    check: Result<anyhow::Result<()>, tokio::time::error::Elapsed>,
) -> (bool, &'static str) {
    match check {
        Ok(Ok(())) => (true, "Connected"),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "health check: database query failed");
            (false, "disconnected")
        }
        Err(_) => {
            tracing::warn!("health check: database query timed out");
            (false, "disconnected")
        }
    }
}

pub async fn handler_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let start = Instant::now();
    let check = tokio::time::timeout(Duration::from_secs(2), state.db.health_check()).await;
    let (healthy, database) = database_status(check);
    let body = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "database": database,
        "environment": {
            "debug_mode": state.config.server.debug,
            "cors_origins": state.config.server.cors_origins,
            "hostname": state.hostname,
        },
        "response_time_seconds": start.elapsed().as_secs_f64(),
        "timestamp": chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
        "version": VERSION,
    });
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

pub async fn handler_docs() -> impl IntoResponse {
    let endpoints: Vec<Value> = ENDPOINTS
        .iter()
        .map(|(path, methods, description)| {
            json!({"path": path, "methods": methods, "description": description})
        })
        .collect();
    Json(json!({
        "title": "PlantKeepers API",
        "version": VERSION,
        "authentication": "Authorization: Bearer <token> on every path except /, /api/, /api/health/ and /api-docs/",
        "endpoints": endpoints,
    }))
}

pub async fn handler_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = state.prom_metrics.encode();
    (
        StatusCode::OK,
        [(
            "content-type",
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn api_root_lists_collection_roots_only() {
        let response = handler_api_root().await.into_response();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["plants"], "/api/plants/");
        assert_eq!(body["ad_kpis"], "/api/ad-kpis/");
        assert_eq!(body["watering_schedules"], "/api/watering-schedules/");
        assert!(body.get("health").is_some());
        assert!(body.as_object().unwrap().keys().all(|k| !k.contains('/')));
    }

    #[tokio::test]
    async fn database_failures_are_not_echoed() {
        let failed = Ok(Err(anyhow::anyhow!(
            "error connecting to server at 10.0.0.5:5432: password authentication failed"
        )));
        assert_eq!(database_status(failed), (false, "disconnected"));
        let timed_out =
            tokio::time::timeout(Duration::ZERO, std::future::pending::<anyhow::Result<()>>())
                .await;
        assert_eq!(database_status(timed_out), (false, "disconnected"));
        assert_eq!(database_status(Ok(Ok(()))), (true, "Connected"));
    }

    #[tokio::test]
    async fn docs_list_every_endpoint() {
        let response = handler_docs().await.into_response();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["endpoints"].as_array().unwrap().len(), ENDPOINTS.len());
    }
}
