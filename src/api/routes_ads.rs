//! Ad units, impressions, clicks, app-side tracking and AdMob config.

use super::error::ApiError;
use super::extract::{Id, JsonBody, QueryParams};
use super::middleware_auth::Identity;
use super::AppState;
use crate::db::{day_bounds, AdClickRow, AdImpressionRow};
use crate::dto::{
    merge_patch, placement_config, AdUnitInput, AdUnitView, ClickInput, DaysQuery,
    ImpressionInput, ImpressionView, Platform, TestAdRequest, DEFAULT_AD_NETWORK,
};
use crate::kpi;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

const DEFAULT_LIST_LIMIT: i64 = 100;
const MAX_LIST_LIMIT: i64 = 1000;

#[derive(Deserialize)]
pub struct PlatformQuery {
    platform: Option<String>,
}

impl PlatformQuery {
    fn platform(&self) -> Platform {
        Platform::from_query(self.platform.as_deref())
    }
}

#[derive(Deserialize)]
pub struct LimitQuery {
    limit: Option<i64>,
}

impl LimitQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
    }
}

// ── Ad units ────────────────────────────────────────────────────

pub async fn handler_ad_units_list(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.db.list_ad_units(false).await?))
}

pub async fn handler_ad_unit_create(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let input = AdUnitInput::from_json(&body)?;
    let row = state.db.insert_ad_unit(&input).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn handler_ad_unit_get(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .db
        .get_ad_unit(id)
        .await?
        .ok_or(ApiError::not_found("Ad unit", id))?;
    Ok(Json(row))
}

pub async fn handler_ad_unit_update(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let input = AdUnitInput::from_json(&body)?;
    let row = state
        .db
        .update_ad_unit(id, &input)
        .await?
        .ok_or(ApiError::not_found("Ad unit", id))?;
    Ok(Json(row))
}

pub async fn handler_ad_unit_patch(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let current = state
        .db
        .get_ad_unit(id)
        .await?
        .ok_or(ApiError::not_found("Ad unit", id))?;
    let input = AdUnitInput::from_json(&merge_patch(AdUnitInput::patch_base(&current), &body))?;
    let row = state
        .db
        .update_ad_unit(id, &input)
        .await?
        .ok_or(ApiError::not_found("Ad unit", id))?;
    Ok(Json(row))
}

pub async fn handler_ad_unit_delete(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.delete_ad_unit(id).await? {
        return Err(ApiError::not_found("Ad unit", id));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handler_active_ad_units(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<PlatformQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let platform = query.platform();
    let units: Vec<AdUnitView> = state
        .db
        .list_ad_units(true)
        .await?
        .iter()
        .map(|u| AdUnitView::new(u, platform))
        .collect();
    Ok(Json(units))
}

pub async fn handler_app_config(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<PlatformQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let platform = query.platform();
    let units = state.db.list_ad_units(true).await?;
    Ok(Json(json!({
        "platform": platform,
        "placements": placement_config(&units, platform),
    })))
}

// ── Impressions ─────────────────────────────────────────────────

/// Attach each impression's clicks.
async fn with_clicks(
    state: &AppState,
    impressions: Vec<AdImpressionRow>,
) -> Result<Vec<ImpressionView>, ApiError> {
    let ids: Vec<i64> = impressions.iter().map(|i| i.id).collect();
    let mut by_impression: HashMap<i64, Vec<AdClickRow>> = HashMap::new();
    for click in state.db.clicks_for_impressions(&ids).await? {
        by_impression.entry(click.impression_id).or_default().push(click);
    }
    Ok(impressions
        .into_iter()
        .map(|impression| ImpressionView {
            clicks: by_impression.remove(&impression.id).unwrap_or_default(),
            impression,
        })
        .collect())
}

pub async fn handler_impressions_list(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let impressions = state.db.list_impressions(query.limit()).await?;
    Ok(Json(with_clicks(&state, impressions).await?))
}

pub async fn handler_impression_create(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let input = ImpressionInput::from_json(&body)?;
    let row = state.db.insert_impression(&input, Some(&identity.uid)).await?;
    Ok((
        StatusCode::CREATED,
        Json(ImpressionView {
            impression: row,
            clicks: Vec::new(),
        }),
    ))
}

pub async fn handler_impression_get(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .db
        .get_impression(id)
        .await?
        .ok_or(ApiError::not_found("Ad impression", id))?;
    let mut views = with_clicks(&state, vec![row]).await?;
    Ok(Json(views.pop()))
}

pub async fn handler_impression_delete(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.delete_impression(id).await? {
        return Err(ApiError::not_found("Ad impression", id));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handler_impression_stats(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<DaysQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let window = query.window(Utc::now());
    let total_impressions = state
        .db
        .count_impressions_between(window.start, window.end)
        .await?;
    let total_clicks = state
        .db
        .count_clicks_between(window.start, window.end)
        .await?;
    let estimated_revenue = state
        .db
        .impression_revenue_between(window.start, window.end)
        .await?;
    let by_placement = state
        .db
        .impressions_by_placement(window.start, window.end)
        .await?;

    let mut daily = Vec::new();
    for date in window.dates() {
        let (start, end) = day_bounds(date);
        let impressions = state.db.count_impressions_between(start, end).await?;
        let clicks = state.db.count_clicks_between(start, end).await?;
        daily.push(json!({
            "date": date,
            "impressions": impressions,
            "clicks": clicks,
            "ctr": round2(kpi::click_through_rate(clicks, impressions)),
        }));
    }

    Ok(Json(json!({
        "period_days": window.days,
        "start_date": window.start_date(),
        "end_date": window.end_date(),
        "total_impressions": total_impressions,
        "total_clicks": total_clicks,
        "ctr": round2(kpi::click_through_rate(total_clicks, total_impressions)),
        "estimated_revenue": estimated_revenue,
        "by_placement": by_placement,
        "daily": daily,
    })))
}

pub(super) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

// ── Clicks ──────────────────────────────────────────────────────

pub async fn handler_clicks_list(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.db.list_clicks(query.limit()).await?))
}

pub async fn handler_click_create(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let input = ClickInput::from_json(&body)?;
    let row = state.db.insert_click(&input).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn handler_click_get(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .db
        .get_click(id)
        .await?
        .ok_or(ApiError::not_found("Ad click", id))?;
    Ok(Json(row))
}

pub async fn handler_click_delete(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.delete_click(id).await? {
        return Err(ApiError::not_found("Ad click", id));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ── App-side tracking ───────────────────────────────────────────

/// Record an impression from whatever the app sent. Invalid payloads are
/// stored with generated defaults; an unknown ad unit is dropped.
pub async fn handler_track_impression(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let mut input = ImpressionInput::from_tracking_payload(&body);
    if let Some(unit_id) = input.ad_unit_id {
        if state.db.get_ad_unit(unit_id).await?.is_none() {
            tracing::warn!(ad_unit_id = unit_id, "tracked impression names unknown ad unit");
            input.ad_unit_id = None;
        }
    }
    let row = state.db.insert_impression(&input, Some(&identity.uid)).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn handler_track_click(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let input = ClickInput::from_json(&body)?;
    if state.db.get_impression(input.impression_id).await?.is_none() {
        return Err(ApiError::not_found("Ad impression", input.impression_id));
    }
    let row = state.db.insert_click(&input).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn handler_admob_config(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<PlatformQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let platform = query.platform();
    let units = state.db.list_ad_units(true).await?;
    Ok(Json(json!({
        "app_id": state.config.admob.app_id_for(platform),
        "test_mode": state.config.admob.test_mode,
        "platform": platform,
        "ad_units": placement_config(&units, platform),
    })))
}

/// Create a test impression against the active unit for a placement.
pub async fn handler_test_ad_request(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let request = TestAdRequest::from_json(&body)?;
    let unit = state.db.active_ad_unit_for(request.placement).await?;
    let platform_name = match request.platform {
        Platform::Android => "android",
        Platform::Ios => "ios",
    };
    let input = ImpressionInput {
        ad_id: format!("test-{}", uuid::Uuid::new_v4()),
        ad_network: DEFAULT_AD_NETWORK.to_string(),
        ad_unit_id: unit.as_ref().map(|u| u.id),
        placement: request.placement,
        device_id: request.device_id,
        device_platform: Some(platform_name.to_string()),
        device_model: None,
        estimated_revenue: Default::default(),
        is_test_ad: true,
        metadata: json!({"source": "test_ad_request"}),
    };
    let impression = state.db.insert_impression(&input, Some(&identity.uid)).await?;
    let unit_id = unit.map(|u| AdUnitView::new(&u, request.platform).unit_id);
    let message = match &unit_id {
        Some(_) => format!("Test impression recorded for {}", request.placement),
        None => format!(
            "Test impression recorded; no active ad unit for {}",
            request.placement
        ),
    };
    Ok(Json(json!({
        "impression_id": impression.id,
        "ad_unit_id": unit_id,
        "message": message,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        assert_eq!(LimitQuery { limit: None }.limit(), DEFAULT_LIST_LIMIT);
        assert_eq!(LimitQuery { limit: Some(0) }.limit(), 1);
        assert_eq!(LimitQuery { limit: Some(50_000) }.limit(), MAX_LIST_LIMIT);
    }

    #[test]
    fn round2_keeps_two_decimals() {
        assert_eq!(round2(kpi::click_through_rate(1, 3)), 33.33);
        assert_eq!(round2(kpi::click_through_rate(5, 0)), 0.0);
    }
}
