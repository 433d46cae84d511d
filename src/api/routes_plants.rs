//! Species, care summary, owned plants and watering schedules.
//!
//! Owned plants and schedule entries are always scoped to the caller's
//! identity; another user's id reads as not found.

use super::error::ApiError;
use super::extract::{Id, JsonBody, QueryParams};
use super::middleware_auth::Identity;
use super::AppState;
use crate::care::species_from_summary;
use crate::db::{PlantRow, WateringScheduleRow};
use crate::dto::{
    merge_patch, next_watering_due, FieldReader, PlantInput, PlantView, SpeciesInput,
    WateringInput,
};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

fn to_patch_base<T: serde::Serialize>(row: &T) -> Result<Value, ApiError> {
    serde_json::to_value(row).map_err(|e| ApiError::Internal(e.into()))
}

// ── Species ─────────────────────────────────────────────────────

pub async fn handler_species_list(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.db.list_species().await?))
}

/// Create a species. Missing light requirements and care text are filled
/// from the text generator when it is reachable.
pub async fn handler_species_create(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let mut input = SpeciesInput::from_json(&body)?;
    state.care.autofill_species(&state.db, &mut input).await;
    let row = state.db.insert_species(&input).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn handler_species_get(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .db
        .get_species(id)
        .await?
        .ok_or(ApiError::not_found("Plant care", id))?;
    Ok(Json(row))
}

pub async fn handler_species_update(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let input = SpeciesInput::from_json(&body)?;
    let row = state
        .db
        .update_species(id, &input)
        .await?
        .ok_or(ApiError::not_found("Plant care", id))?;
    Ok(Json(row))
}

pub async fn handler_species_patch(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let current = state
        .db
        .get_species(id)
        .await?
        .ok_or(ApiError::not_found("Plant care", id))?;
    let merged = merge_patch(to_patch_base(&current)?, &body);
    let input = SpeciesInput::from_json(&merged)?;
    let row = state
        .db
        .update_species(id, &input)
        .await?
        .ok_or(ApiError::not_found("Plant care", id))?;
    Ok(Json(row))
}

pub async fn handler_species_delete(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.delete_species(id).await? {
        return Err(ApiError::not_found("Plant care", id));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct CareSummaryQuery {
    plant_name: Option<String>,
}

/// A stored species whose name contains `plant_name`, or a freshly
/// generated summary (persisted as a species under the generated name).
/// Generation failure is reported in a 200 body with `error` and `message`.
pub async fn handler_care_summary(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<CareSummaryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let plant_name = query.plant_name.unwrap_or_default();
    let plant_name = plant_name.trim();
    if plant_name.is_empty() {
        return Err(ApiError::BadRequest("Plant name is required".to_string()));
    }

    if let Some(species) = state.db.search_species(plant_name).await? {
        return Ok(Json(to_patch_base(&species)?));
    }

    match state.care.generate(&state.db, plant_name).await {
        Ok((summary, info)) => {
            let name = if summary.plant_name.trim().is_empty() {
                plant_name
            } else {
                summary.plant_name.trim()
            };
            let input = species_from_summary(name, &summary, &info);
            state.db.upsert_species_by_name(&input).await?;
            Ok(Json(to_patch_base(&summary)?))
        }
        Err(message) => Ok(Json(json!({
            "plant_name": plant_name,
            "error": "Failed to generate care summary",
            "message": message,
        }))),
    }
}

// ── Owned plants ────────────────────────────────────────────────

/// Plant with its linked species, without triggering generation.
async fn linked_view(state: &AppState, plant: PlantRow) -> Result<PlantView, ApiError> {
    let care = match plant.species_id {
        Some(species_id) => state.db.get_species(species_id).await?,
        None => None,
    };
    Ok(PlantView::new(plant, care))
}

pub async fn handler_plants_list(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<impl IntoResponse, ApiError> {
    let plants = state.db.list_plants(&identity.uid).await?;
    let mut views = Vec::with_capacity(plants.len());
    for plant in plants {
        views.push(state.care.fill_care(&state.db, plant).await?);
    }
    Ok(Json(views))
}

pub async fn handler_plant_create(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let input = PlantInput::from_json(&body)?;
    let plant = state.db.insert_plant(&identity.uid, &input).await?;
    Ok((StatusCode::CREATED, Json(linked_view(&state, plant).await?)))
}

pub async fn handler_plant_get(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Id(id): Id,
) -> Result<impl IntoResponse, ApiError> {
    let plant = state
        .db
        .get_plant(id, &identity.uid)
        .await?
        .ok_or(ApiError::not_found("Plant", id))?;
    Ok(Json(state.care.fill_care(&state.db, plant).await?))
}

pub async fn handler_plant_update(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Id(id): Id,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let input = PlantInput::from_json(&body)?;
    let plant = state
        .db
        .update_plant(id, &identity.uid, &input)
        .await?
        .ok_or(ApiError::not_found("Plant", id))?;
    Ok(Json(linked_view(&state, plant).await?))
}

pub async fn handler_plant_patch(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Id(id): Id,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let current = state
        .db
        .get_plant(id, &identity.uid)
        .await?
        .ok_or(ApiError::not_found("Plant", id))?;
    let merged = merge_patch(PlantView::patch_base(&current), &body);
    let input = PlantInput::from_json(&merged)?;
    let plant = state
        .db
        .update_plant(id, &identity.uid, &input)
        .await?
        .ok_or(ApiError::not_found("Plant", id))?;
    Ok(Json(linked_view(&state, plant).await?))
}

pub async fn handler_plant_delete(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Id(id): Id,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.delete_plant(id, &identity.uid).await? {
        return Err(ApiError::not_found("Plant", id));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Species watering interval for a plant, if it has a species.
async fn water_frequency(state: &AppState, plant: &PlantRow) -> Result<Option<i32>, ApiError> {
    Ok(match plant.species_id {
        Some(species_id) => state
            .db
            .get_species(species_id)
            .await?
            .map(|s| s.water_frequency),
        None => None,
    })
}

/// Mark a plant watered (now, or `last_watered` from the body) and append a
/// schedule entry due after the species interval.
pub async fn handler_plant_water(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Id(id): Id,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let watered_at = if body.is_null() {
        Utc::now()
    } else {
        let mut r = FieldReader::new(&body);
        let at = r.optional_datetime("last_watered");
        r.finish()?;
        at.unwrap_or_else(Utc::now)
    };

    let plant = state
        .db
        .set_last_watered(id, &identity.uid, watered_at)
        .await?
        .ok_or(ApiError::not_found("Plant", id))?;
    let next = next_watering_due(watered_at, water_frequency(&state, &plant).await?);
    let schedule = state
        .db
        .insert_watering(plant.id, watered_at, next, true)
        .await?;
    Ok(Json(json!({
        "plant": linked_view(&state, plant).await?,
        "schedule": schedule,
    })))
}

// ── Watering schedules ──────────────────────────────────────────

#[derive(Deserialize)]
pub struct WateringQuery {
    plant_id: Option<i64>,
}

pub async fn handler_watering_list(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    QueryParams(query): QueryParams<WateringQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state
            .db
            .list_watering(&identity.uid, query.plant_id)
            .await?,
    ))
}

/// Resolve the timestamps of a schedule write. The plant must belong to the
/// caller; a missing next-due time is derived from the species interval.
async fn resolve_watering(
    state: &AppState,
    uid: &str,
    input: &WateringInput,
) -> Result<(chrono::DateTime<Utc>, chrono::DateTime<Utc>), ApiError> {
    let plant = state
        .db
        .get_plant(input.plant_id, uid)
        .await?
        .ok_or_else(|| {
            ApiError::field(
                "plant_id",
                format!("Invalid pk \"{}\" - object does not exist.", input.plant_id),
            )
        })?;
    let last = input.last_watered.unwrap_or_else(Utc::now);
    let next = match input.next_watering_due {
        Some(next) => next,
        None => next_watering_due(last, water_frequency(state, &plant).await?),
    };
    if next < last {
        return Err(ApiError::field(
            "next_watering_due",
            "Next watering cannot be before the last watering.",
        ));
    }
    Ok((last, next))
}

pub async fn handler_watering_create(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let input = WateringInput::from_json(&body)?;
    let (last, next) = resolve_watering(&state, &identity.uid, &input).await?;
    let row = state
        .db
        .insert_watering(input.plant_id, last, next, input.is_watered)
        .await?;
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn handler_watering_get(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Id(id): Id,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .db
        .get_watering(id, &identity.uid)
        .await?
        .ok_or(ApiError::not_found("Watering schedule", id))?;
    Ok(Json(row))
}

async fn write_watering(
    state: &AppState,
    uid: &str,
    id: i64,
    input: WateringInput,
) -> Result<WateringScheduleRow, ApiError> {
    let (last, next) = resolve_watering(state, uid, &input).await?;
    state
        .db
        .update_watering(id, uid, input.plant_id, last, next, input.is_watered)
        .await?
        .ok_or(ApiError::not_found("Watering schedule", id))
}

pub async fn handler_watering_update(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Id(id): Id,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let input = WateringInput::from_json(&body)?;
    Ok(Json(write_watering(&state, &identity.uid, id, input).await?))
}

pub async fn handler_watering_patch(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Id(id): Id,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let current = state
        .db
        .get_watering(id, &identity.uid)
        .await?
        .ok_or(ApiError::not_found("Watering schedule", id))?;
    let merged = merge_patch(to_patch_base(&current)?, &body);
    let input = WateringInput::from_json(&merged)?;
    Ok(Json(write_watering(&state, &identity.uid, id, input).await?))
}

pub async fn handler_watering_delete(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Id(id): Id,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.delete_watering(id, &identity.uid).await? {
        return Err(ApiError::not_found("Watering schedule", id));
    }
    Ok(StatusCode::NO_CONTENT)
}
