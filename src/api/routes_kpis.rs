//! Daily ad KPIs. Clients only ever supply the raw counts; derived columns
//! are computed by [`KpiMetrics::compute`] on every write.

use super::error::ApiError;
use super::extract::{Id, JsonBody, QueryParams};
use super::routes_ads::round2;
use super::AppState;
use crate::dto::{daily_kpi_date, historical_range, merge_patch, DaysQuery, KpiInput, KpiView};
use crate::kpi::KpiMetrics;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;

fn view(state: &AppState, row: crate::db::AdKpiRow) -> KpiView {
    KpiView::new(row, state.config.kpi.target_impressions_per_user)
}

fn metrics(state: &AppState, input: &KpiInput) -> KpiMetrics {
    KpiMetrics::compute(input.active_users, input.total_impressions, &state.config.kpi)
}

pub async fn handler_kpis_list(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state.db.list_kpis().await?;
    Ok(Json(
        rows.into_iter()
            .map(|row| view(&state, row))
            .collect::<Vec<_>>(),
    ))
}

pub async fn handler_kpi_create(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let input = KpiInput::from_json(&body, &state.config.kpi)?;
    let row = state
        .db
        .insert_kpi(input.date, &metrics(&state, &input))
        .await?;
    Ok((StatusCode::CREATED, Json(view(&state, row))))
}

pub async fn handler_kpi_get(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .db
        .get_kpi(id)
        .await?
        .ok_or(ApiError::not_found("Ad KPI", id))?;
    Ok(Json(view(&state, row)))
}

pub async fn handler_kpi_update(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let input = KpiInput::from_json(&body, &state.config.kpi)?;
    let row = state
        .db
        .update_kpi(id, input.date, &metrics(&state, &input))
        .await?
        .ok_or(ApiError::not_found("Ad KPI", id))?;
    Ok(Json(view(&state, row)))
}

pub async fn handler_kpi_patch(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let current = state
        .db
        .get_kpi(id)
        .await?
        .ok_or(ApiError::not_found("Ad KPI", id))?;
    let merged = merge_patch(KpiInput::patch_base(&current), &body);
    let input = KpiInput::from_json(&merged, &state.config.kpi)?;
    let row = state
        .db
        .update_kpi(id, input.date, &metrics(&state, &input))
        .await?
        .ok_or(ApiError::not_found("Ad KPI", id))?;
    Ok(Json(view(&state, row)))
}

pub async fn handler_kpi_delete(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.delete_kpi(id).await? {
        return Err(ApiError::not_found("Ad KPI", id));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handler_kpi_summary(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<DaysQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let window = query.window(Utc::now());
    let rows = state
        .db
        .kpis_between(window.start_date(), window.end_date())
        .await?;

    let days_with_data = rows.len();
    let average_ipu = if rows.is_empty() {
        0.0
    } else {
        round2(rows.iter().map(|r| r.impressions_per_user).sum::<f64>() / rows.len() as f64)
    };
    let days_target_achieved = rows.iter().filter(|r| r.target_achieved).count();
    let total_revenue: Decimal = rows.iter().map(|r| r.estimated_revenue).sum();

    let target = state.config.kpi.target_impressions_per_user;
    Ok(Json(json!({
        "period_days": window.days,
        "start_date": window.start_date(),
        "end_date": window.end_date(),
        "target_impressions_per_user": target,
        "days_with_data": days_with_data,
        "average_impressions_per_user": average_ipu,
        "average_target_percentage": crate::kpi::target_percentage(average_ipu, target),
        "days_target_achieved": days_target_achieved,
        "total_estimated_revenue": total_revenue,
        "daily": rows.into_iter().map(|row| view(&state, row)).collect::<Vec<_>>(),
    })))
}

/// Recompute one date (today when the body is empty).
pub async fn handler_calculate_daily_kpi(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let date = daily_kpi_date(&body, Utc::now().date_naive())?;
    let row = state.db.recompute_kpi(date, &state.config.kpi).await?;
    tracing::info!(%date, active_users = row.active_users, total_impressions = row.total_impressions, "daily kpi recomputed");
    Ok(Json(json!({
        "message": format!("KPI calculated for {}", date),
        "kpi": view(&state, row),
    })))
}

/// Recompute every date in an inclusive range, one day at a time.
pub async fn handler_calculate_historical_kpi(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let (start, end) = historical_range(&body)?;
    let mut kpis = Vec::new();
    for date in start.iter_days().take_while(|d| *d <= end) {
        let row = state.db.recompute_kpi(date, &state.config.kpi).await?;
        kpis.push(view(&state, row));
    }
    tracing::info!(%start, %end, days = kpis.len(), "historical kpis recomputed");
    Ok(Json(json!({
        "message": format!("KPIs calculated for {} days", kpis.len()),
        "start_date": start,
        "end_date": end,
        "days_processed": kpis.len(),
        "kpis": kpis,
    })))
}
