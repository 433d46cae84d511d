//! # API: HTTP Server
//!
//! Axum server for the mobile client. Every resource lives under `/api/` with
//! trailing-slash paths; the root, API index, health check and docs are
//! public, everything else requires a bearer token (see [`middleware_auth`]).
//!
//! Handlers are grouped by resource:
//!
//! | Module | Resources |
//! |--------|-----------|
//! | `routes_health` | `/`, `/api/`, `/api/health/`, `/api-docs/`, `/metrics` |
//! | `routes_plants` | species, care summary, owned plants, watering schedules |
//! | `routes_users` | legacy user accounts |
//! | `routes_ads` | ad units, impressions, clicks, tracking, AdMob config |
//! | `routes_revenue` | revenue rows, AdMob report import, active users |
//! | `routes_kpis` | daily KPI rows and recomputation |

pub mod error;
pub mod extract;
pub mod middleware_auth;
mod routes_ads;
mod routes_health;
mod routes_kpis;
mod routes_plants;
mod routes_revenue;
mod routes_users;

use crate::care::CareService;
use crate::config::{AppConfig, Secrets};
use crate::db::Database;
use crate::prom_metrics::{self, Metrics};
use anyhow::Result;
use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::routing::{get, post};
use axum::Router;
use middleware_auth::TokenVerifier;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Instrument};

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

pub struct AppState {
    pub db: Database,
    pub config: AppConfig,
    pub care: CareService,
    pub auth: TokenVerifier,
    pub prom_metrics: Arc<Metrics>,
    pub hostname: String,
}

impl AppState {
    pub fn new(
        db: Database,
        config: AppConfig,
        care: CareService,
        auth: TokenVerifier,
        prom_metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        Arc::new(AppState {
            db,
            config,
            care,
            auth,
            prom_metrics,
            hostname: gethostname(),
        })
    }

    /// Production wiring: real collaborators and token verification from
    /// the environment.
    pub fn from_config(db: Database, config: AppConfig, secrets: &Secrets) -> Result<Arc<Self>> {
        let prom_metrics = Arc::new(Metrics::new());
        let care = CareService::from_config(&config.external, secrets, prom_metrics.clone())?;
        let auth = TokenVerifier::from_secrets(
            secrets,
            config.server.debug,
            crate::care::http_client(&config.external)?,
        )?;
        Ok(Self::new(db, config, care, auth, prom_metrics))
    }
}

pub(crate) fn gethostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .or_else(|_| sysinfo::System::host_name().ok_or(std::env::VarError::NotPresent))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Times each request into the duration histogram and runs it inside a
/// `request` span keyed by `x-request-id` (propagated or generated).
async fn metrics_middleware(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> axum::response::Response {
    let request_id = req
        .headers()
        .get(&REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let method = req.method().to_string();
    let raw_path = req.uri().path().to_string();
    let norm_path = normalize_path(&raw_path);
    let start = std::time::Instant::now();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %raw_path,
    );
    let mut response = next.run(req).instrument(span).await;

    state
        .prom_metrics
        .http_request_duration
        .get_or_create(&prom_metrics::HttpLabel {
            method,
            path: norm_path,
        })
        .observe(start.elapsed().as_secs_f64());

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID, value);
    }
    response
}

/// Collapse numeric ids and UUIDs so histogram labels stay bounded.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if seg.is_empty() {
                seg.to_string()
            } else if seg.chars().all(|c| c.is_ascii_digit()) {
                ":id".to_string()
            } else if seg.len() == 36 && seg.chars().filter(|c| *c == '-').count() == 4 {
                ":uuid".to_string()
            } else {
                seg.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);
    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(allowed))
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/", get(routes_health::handler_welcome))
        .route("/api/", get(routes_health::handler_api_root))
        .route("/api/health/", get(routes_health::handler_health))
        .route("/api-docs/", get(routes_health::handler_docs))
        .route("/metrics", get(routes_health::handler_metrics))
        // Species and owned plants
        .route(
            "/api/plant-care/",
            get(routes_plants::handler_species_list).post(routes_plants::handler_species_create),
        )
        .route(
            "/api/plant-care/{id}/",
            get(routes_plants::handler_species_get)
                .put(routes_plants::handler_species_update)
                .patch(routes_plants::handler_species_patch)
                .delete(routes_plants::handler_species_delete),
        )
        .route("/api/care-summary/", get(routes_plants::handler_care_summary))
        .route(
            "/api/plants/",
            get(routes_plants::handler_plants_list).post(routes_plants::handler_plant_create),
        )
        .route(
            "/api/plants/{id}/",
            get(routes_plants::handler_plant_get)
                .put(routes_plants::handler_plant_update)
                .patch(routes_plants::handler_plant_patch)
                .delete(routes_plants::handler_plant_delete),
        )
        .route("/api/plants/{id}/water/", post(routes_plants::handler_plant_water))
        .route(
            "/api/watering-schedules/",
            get(routes_plants::handler_watering_list).post(routes_plants::handler_watering_create),
        )
        .route(
            "/api/watering-schedules/{id}/",
            get(routes_plants::handler_watering_get)
                .put(routes_plants::handler_watering_update)
                .patch(routes_plants::handler_watering_patch)
                .delete(routes_plants::handler_watering_delete),
        )
        // Users
        .route(
            "/api/user/",
            get(routes_users::handler_users_list).post(routes_users::handler_user_create),
        )
        .route(
            "/api/user/{id}/",
            get(routes_users::handler_user_get)
                .put(routes_users::handler_user_update)
                .patch(routes_users::handler_user_patch)
                .delete(routes_users::handler_user_delete),
        )
        // Ads
        .route(
            "/api/ad-units/",
            get(routes_ads::handler_ad_units_list).post(routes_ads::handler_ad_unit_create),
        )
        .route(
            "/api/ad-units/active_ad_units/",
            get(routes_ads::handler_active_ad_units),
        )
        .route("/api/ad-units/app_config/", get(routes_ads::handler_app_config))
        .route(
            "/api/ad-units/{id}/",
            get(routes_ads::handler_ad_unit_get)
                .put(routes_ads::handler_ad_unit_update)
                .patch(routes_ads::handler_ad_unit_patch)
                .delete(routes_ads::handler_ad_unit_delete),
        )
        .route(
            "/api/ad-impressions/",
            get(routes_ads::handler_impressions_list).post(routes_ads::handler_impression_create),
        )
        .route("/api/ad-impressions/stats/", get(routes_ads::handler_impression_stats))
        .route(
            "/api/ad-impressions/{id}/",
            get(routes_ads::handler_impression_get).delete(routes_ads::handler_impression_delete),
        )
        .route(
            "/api/ad-clicks/",
            get(routes_ads::handler_clicks_list).post(routes_ads::handler_click_create),
        )
        .route(
            "/api/ad-clicks/{id}/",
            get(routes_ads::handler_click_get).delete(routes_ads::handler_click_delete),
        )
        .route("/api/track-impression/", post(routes_ads::handler_track_impression))
        .route("/api/track-click/", post(routes_ads::handler_track_click))
        .route("/api/admob-config/", get(routes_ads::handler_admob_config))
        .route("/api/test-ad-request/", post(routes_ads::handler_test_ad_request))
        // Revenue and activity
        .route(
            "/api/ad-revenue/",
            get(routes_revenue::handler_revenue_list).post(routes_revenue::handler_revenue_create),
        )
        .route("/api/ad-revenue/summary/", get(routes_revenue::handler_revenue_summary))
        .route(
            "/api/ad-revenue/process_admob_report/",
            post(routes_revenue::handler_process_admob_report),
        )
        .route(
            "/api/ad-revenue/{id}/",
            get(routes_revenue::handler_revenue_get)
                .put(routes_revenue::handler_revenue_update)
                .patch(routes_revenue::handler_revenue_patch)
                .delete(routes_revenue::handler_revenue_delete),
        )
        .route(
            "/api/active-users/",
            get(routes_revenue::handler_active_users_list)
                .post(routes_revenue::handler_active_user_record),
        )
        .route(
            "/api/active-users/stats/",
            get(routes_revenue::handler_active_user_stats),
        )
        // KPIs
        .route(
            "/api/ad-kpis/",
            get(routes_kpis::handler_kpis_list).post(routes_kpis::handler_kpi_create),
        )
        .route("/api/ad-kpis/summary/", get(routes_kpis::handler_kpi_summary))
        .route(
            "/api/ad-kpis/calculate_daily_kpi/",
            post(routes_kpis::handler_calculate_daily_kpi),
        )
        .route(
            "/api/ad-kpis/calculate_historical_kpi/",
            post(routes_kpis::handler_calculate_historical_kpi),
        )
        .route(
            "/api/ad-kpis/{id}/",
            get(routes_kpis::handler_kpi_get)
                .put(routes_kpis::handler_kpi_update)
                .patch(routes_kpis::handler_kpi_patch)
                .delete(routes_kpis::handler_kpi_delete),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware_auth::require_auth,
        ))
        .layer(cors)
        .layer(CatchPanicLayer::new())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .with_state(state)
}

pub async fn run(state: Arc<AppState>, bind: std::net::IpAddr, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::new(bind, port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "plantkeeper api listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("api shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
                info!("received SIGINT, shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT, shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_path_preserves_api_routes() {
        assert_eq!(normalize_path("/api/plants/"), "/api/plants/");
        assert_eq!(normalize_path("/api/ad-kpis/summary/"), "/api/ad-kpis/summary/");
        assert_eq!(normalize_path("/metrics"), "/metrics");
    }

    #[test]
    fn normalize_path_collapses_numeric_ids() {
        assert_eq!(normalize_path("/api/plants/42/"), "/api/plants/:id/");
        assert_eq!(normalize_path("/api/plants/7/water/"), "/api/plants/:id/water/");
    }

    #[test]
    fn normalize_path_collapses_uuids() {
        assert_eq!(
            normalize_path("/api/things/550e8400-e29b-41d4-a716-446655440000"),
            "/api/things/:uuid"
        );
    }

    #[test]
    fn normalize_path_handles_empty_and_root() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "");
    }

    #[test]
    fn cors_accepts_listed_and_wildcard_origins() {
        // Both shapes must build without panicking.
        let _ = cors_layer(&[]);
        let _ = cors_layer(&["https://app.plantkeeper.io".to_string(), "bad\norigin".to_string()]);
    }
}
