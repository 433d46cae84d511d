//! Daily revenue per ad unit, AdMob report import, and active-user tracking.

use super::error::ApiError;
use super::extract::{Id, JsonBody, QueryParams};
use super::middleware_auth::Identity;
use super::routes_ads::round2;
use super::AppState;
use crate::dto::{
    merge_patch, parse_date, AdmobReportRow, DaysQuery, FieldErrors, RevenueInput, UnitRef,
};
use crate::kpi;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct RevenueQuery {
    ad_unit_id: Option<i64>,
}

pub async fn handler_revenue_list(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<RevenueQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.db.list_revenue(query.ad_unit_id).await?))
}

pub async fn handler_revenue_create(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let input = RevenueInput::from_json(&body)?;
    let row = state.db.insert_revenue(&input).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn handler_revenue_get(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .db
        .get_revenue(id)
        .await?
        .ok_or(ApiError::not_found("Ad revenue", id))?;
    Ok(Json(row))
}

pub async fn handler_revenue_update(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let input = RevenueInput::from_json(&body)?;
    let row = state
        .db
        .update_revenue(id, &input)
        .await?
        .ok_or(ApiError::not_found("Ad revenue", id))?;
    Ok(Json(row))
}

pub async fn handler_revenue_patch(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let current = state
        .db
        .get_revenue(id)
        .await?
        .ok_or(ApiError::not_found("Ad revenue", id))?;
    let mut base = RevenueInput::patch_base(&current);
    // A patch that changes revenue or impressions without an eCPM gets it recomputed.
    if body.get("ecpm").is_none()
        && (body.get("revenue").is_some() || body.get("impressions").is_some())
    {
        if let Some(map) = base.as_object_mut() {
            map.remove("ecpm");
        }
    }
    let input = RevenueInput::from_json(&merge_patch(base, &body))?;
    let row = state
        .db
        .update_revenue(id, &input)
        .await?
        .ok_or(ApiError::not_found("Ad revenue", id))?;
    Ok(Json(row))
}

pub async fn handler_revenue_delete(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.delete_revenue(id).await? {
        return Err(ApiError::not_found("Ad revenue", id));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handler_revenue_summary(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<DaysQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let window = query.window(Utc::now());
    let rows = state
        .db
        .revenue_between(window.start_date(), window.end_date())
        .await?;

    let total_impressions: i64 = rows.iter().map(|r| r.impressions).sum();
    let total_clicks: i64 = rows.iter().map(|r| r.clicks).sum();
    let total_revenue: Decimal = rows.iter().map(|r| r.revenue).sum();
    let (avg_ecpm, avg_fill_rate) = if rows.is_empty() {
        (Decimal::ZERO, 0.0)
    } else {
        let n = rows.len();
        let ecpm_sum: Decimal = rows.iter().map(|r| r.ecpm).sum();
        let fill_sum: f64 = rows.iter().map(|r| r.fill_rate).sum();
        (
            (ecpm_sum / Decimal::from(n as i64)).round_dp(kpi::MONEY_SCALE),
            round2(fill_sum / n as f64),
        )
    };

    let mut daily = Vec::new();
    for date in window.dates() {
        let totals = state.db.revenue_totals_on(date).await?;
        daily.push(json!({
            "date": date,
            "impressions": totals.impressions,
            "clicks": totals.clicks,
            "revenue": totals.revenue,
            "ecpm": kpi::ecpm(totals.revenue, totals.impressions),
        }));
    }

    Ok(Json(json!({
        "period_days": window.days,
        "start_date": window.start_date(),
        "end_date": window.end_date(),
        "total_impressions": total_impressions,
        "total_clicks": total_clicks,
        "total_revenue": total_revenue,
        "average_ecpm": avg_ecpm,
        "average_fill_rate": avg_fill_rate,
        "ctr": round2(kpi::click_through_rate(total_clicks, total_impressions)),
        "daily": daily,
    })))
}

/// Upsert one revenue row per report row, keyed by (ad unit, date). Rows
/// that fail validation, name an unknown unit, or are rejected by the
/// database are reported and skipped; the accepted rows commit together.
pub async fn handler_process_admob_report(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let (rows, rejected) = AdmobReportRow::parse_report(&body)?;
    let mut errors: Vec<(usize, FieldErrors)> = rejected;

    let mut inputs = Vec::with_capacity(rows.len());
    for (index, row) in rows {
        let unit = match &row.unit {
            UnitRef::Id(id) => state.db.get_ad_unit(*id).await?,
            UnitRef::AdmobId(unit_id) => state.db.find_ad_unit_by_admob_id(unit_id).await?,
        };
        let Some(unit) = unit else {
            let name = match &row.unit {
                UnitRef::Id(id) => id.to_string(),
                UnitRef::AdmobId(s) => s.clone(),
            };
            errors.push((
                index,
                FieldErrors::single("ad_unit_id", format!("Unknown ad unit {}.", name)),
            ));
            continue;
        };
        if row.clicks > row.impressions {
            errors.push((
                index,
                FieldErrors::single("clicks", "Clicks cannot exceed impressions."),
            ));
            continue;
        }
        inputs.push((
            index,
            RevenueInput {
                ad_unit_id: unit.id,
                date: row.date,
                impressions: row.impressions,
                clicks: row.clicks,
                revenue: row.revenue,
                ecpm: row.ecpm,
                fill_rate: row.fill_rate,
            },
        ));
    }

    let batch = state.db.upsert_revenue_batch(&inputs).await?;
    for (index, err) in batch.rejected {
        tracing::warn!(row = index, error = %err, "admob report row rejected by database");
        errors.push((index, ApiError::from(err).into_field_errors()));
    }
    errors.sort_by_key(|(index, _)| *index);

    tracing::info!(
        created = batch.created,
        updated = batch.updated,
        rejected = errors.len(),
        "admob report processed"
    );
    Ok(Json(json!({
        "created": batch.created,
        "updated": batch.updated,
        "processed": batch.created + batch.updated,
        "errors": errors
            .into_iter()
            .map(|(row, errors)| json!({"row": row, "errors": errors}))
            .collect::<Vec<_>>(),
    })))
}

// ── Active users ────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ActiveUserQuery {
    date: Option<String>,
}

pub async fn handler_active_users_list(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<ActiveUserQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let date = match query.date.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            parse_date(raw)
                .ok_or_else(|| ApiError::field("date", "Date has wrong format. Use YYYY-MM-DD."))?,
        ),
    };
    Ok(Json(state.db.list_active_users(date).await?))
}

/// Record the caller as active today. The first call of the day answers
/// 201, repeats bump the session count and answer 200.
pub async fn handler_active_user_record(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .db
        .record_activity(&identity.uid, Utc::now().date_naive())
        .await?;
    let status = if row.session_count == 1 {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(row)))
}

pub async fn handler_active_user_stats(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<DaysQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let window = query.window(Utc::now());
    let (distinct_users, total_sessions) = state
        .db
        .activity_totals(window.start_date(), window.end_date())
        .await?;

    let mut daily = Vec::new();
    let mut user_days = 0i64;
    for date in window.dates() {
        let count = state.db.count_active_users_on(date).await?;
        user_days += count;
        daily.push(json!({"date": date, "active_users": count}));
    }
    let average_daily = if daily.is_empty() {
        0.0
    } else {
        round2(user_days as f64 / daily.len() as f64)
    };

    Ok(Json(json!({
        "period_days": window.days,
        "start_date": window.start_date(),
        "end_date": window.end_date(),
        "unique_users": distinct_users,
        "total_sessions": total_sessions,
        "average_daily_active_users": average_daily,
        "average_sessions_per_user": if distinct_users > 0 {
            round2(total_sessions as f64 / distinct_users as f64)
        } else {
            0.0
        },
        "daily": daily,
    })))
}
