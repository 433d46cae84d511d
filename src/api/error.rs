//! HTTP-facing error type. Every handler returns `Result<_, ApiError>`; the
//! response bodies are always JSON with an `error` key.

use crate::db::{constraint_violation, ConstraintViolation};
use crate::dto::FieldErrors;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Field-level validation failure, reported as `{"error", "fields"}`.
    #[error("invalid input: {0}")]
    Validation(FieldErrors),
    #[error("{0}")]
    BadRequest(String),
    #[error("{entity} with ID {id} does not exist")]
    NotFound { entity: &'static str, id: i64 },
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error(transparent)]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        ApiError::NotFound { entity, id }
    }

    pub fn field(field: &str, message: impl Into<String>) -> Self {
        ApiError::Validation(FieldErrors::single(field, message))
    }

    /// Field errors for a rejected write, or a single `non_field_errors`
    /// entry when the error is not a validation failure.
    pub fn into_field_errors(self) -> FieldErrors {
        match self {
            ApiError::Validation(fields) => fields,
            other => FieldErrors::single("non_field_errors", other.to_string()),
        }
    }
}

impl From<FieldErrors> for ApiError {
    fn from(errors: FieldErrors) -> Self {
        ApiError::Validation(errors)
    }
}

/// Database errors: unique and foreign-key violations become 400s naming the
/// offending field, numeric overflow a 400 without one, everything else is
/// a 500.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match constraint_violation(&err) {
            Some(ConstraintViolation::Unique(constraint)) => {
                let (field, message) = unique_message(&constraint);
                ApiError::field(field, message)
            }
            Some(ConstraintViolation::ForeignKey(constraint)) => ApiError::field(
                foreign_key_field(&constraint),
                "Invalid pk - object does not exist.",
            ),
            Some(ConstraintViolation::OutOfRange) => {
                ApiError::field("non_field_errors", OUT_OF_RANGE)
            }
            None => ApiError::Internal(err),
        }
    }
}

const OUT_OF_RANGE: &str = "A numeric value is out of range for its field.";

fn unique_message(constraint: &str) -> (&'static str, &'static str) {
    match constraint {
        "users_username_key" => ("username", "user with this username already exists."),
        "users_email_key" => ("email", "user with this email already exists."),
        "ad_revenue_unit_date_key" => (
            "non_field_errors",
            "The fields ad_unit, date must make a unique set.",
        ),
        "ad_kpis_date_key" => ("date", "ad kpi with this date already exists."),
        "active_users_uid_date_key" => (
            "non_field_errors",
            "The fields uid, date must make a unique set.",
        ),
        _ => ("non_field_errors", "A record with these values already exists."),
    }
}

/// Postgres names foreign keys `<table>_<column>_fkey`.
fn foreign_key_field(constraint: &str) -> &'static str {
    const COLUMNS: [&str; 4] = ["species_id", "plant_id", "ad_unit_id", "impression_id"];
    COLUMNS
        .into_iter()
        .find(|col| constraint.ends_with(&format!("{}_fkey", col)))
        .unwrap_or("non_field_errors")
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(fields) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Invalid input", "fields": fields})),
            )
                .into_response(),
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
            }
            e @ ApiError::NotFound { .. } => {
                (StatusCode::NOT_FOUND, Json(json!({"error": e.to_string()}))).into_response()
            }
            ApiError::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, Json(json!({"error": message}))).into_response()
            }
            ApiError::Internal(e) => {
                tracing::error!(error = ?e, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "Internal server error"})),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_entity_and_id() {
        let e = ApiError::not_found("Plant", 42);
        assert_eq!(e.to_string(), "Plant with ID 42 does not exist");
        assert_eq!(e.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            ApiError::field("name", "bad").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthorized("Invalid or expired token")
                .into_response()
                .status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(anyhow::anyhow!("boom")).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn validation_errors_convert_back_to_fields() {
        let fields = ApiError::field("revenue", "too large").into_field_errors();
        assert_eq!(fields.get("revenue").unwrap(), ["too large".to_string()]);
        let fields = ApiError::BadRequest("nope".to_string()).into_field_errors();
        assert_eq!(fields.get("non_field_errors").unwrap(), ["nope".to_string()]);
    }

    #[test]
    fn constraint_names_map_to_fields() {
        assert_eq!(unique_message("users_username_key").0, "username");
        assert_eq!(unique_message("users_email_key").0, "email");
        assert_eq!(unique_message("something_else").0, "non_field_errors");
        assert_eq!(foreign_key_field("plants_species_id_fkey"), "species_id");
        assert_eq!(foreign_key_field("ad_clicks_impression_id_fkey"), "impression_id");
        assert_eq!(foreign_key_field("mystery"), "non_field_errors");
    }
}
