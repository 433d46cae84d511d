//! Legacy user accounts. Duplicate usernames or emails are rejected by the
//! database and reported as field errors.

use super::error::ApiError;
use super::extract::{Id, JsonBody};
use super::AppState;
use crate::dto::{merge_patch, UserInput};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

pub async fn handler_users_list(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.db.list_users().await?))
}

pub async fn handler_user_create(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let input = UserInput::from_json(&body)?;
    let row = state.db.insert_user(&input).await?;
    tracing::info!(user_id = row.id, "user created");
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn handler_user_get(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .db
        .get_user(id)
        .await?
        .ok_or(ApiError::not_found("User", id))?;
    Ok(Json(row))
}

pub async fn handler_user_update(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let input = UserInput::from_json(&body)?;
    let row = state
        .db
        .update_user(id, &input)
        .await?
        .ok_or(ApiError::not_found("User", id))?;
    Ok(Json(row))
}

pub async fn handler_user_patch(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError> {
    let current = state
        .db
        .get_user(id)
        .await?
        .ok_or(ApiError::not_found("User", id))?;
    let base = serde_json::to_value(&current).map_err(|e| ApiError::Internal(e.into()))?;
    let input = UserInput::from_json(&merge_patch(base, &body))?;
    let row = state
        .db
        .update_user(id, &input)
        .await?
        .ok_or(ApiError::not_found("User", id))?;
    Ok(Json(row))
}

pub async fn handler_user_delete(
    State(state): State<Arc<AppState>>,
    Id(id): Id,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.delete_user(id).await? {
        return Err(ApiError::not_found("User", id));
    }
    Ok(StatusCode::NO_CONTENT)
}
