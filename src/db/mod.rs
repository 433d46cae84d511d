//! # Database: PostgreSQL Storage Layer
//!
//! Async persistence for plants, species care data, watering schedules and
//! ad telemetry via `sqlx::PgPool`. Schema lives in `migrations/` and is
//! applied with [`Database::migrate`].
//!
//! ## Module Structure
//!
//! Operations are split into submodules by domain, each adding methods to
//! [`Database`]:
//!
//! - [`species`]: shared species care data, name lookups
//! - [`plants`]: owned plants scoped by identity subject
//! - [`users`]: legacy user accounts
//! - [`watering`]: watering schedule entries
//! - [`ad_units`]: ad unit configuration
//! - [`impressions`]: impressions, clicks and their per-window aggregates
//! - [`revenue`]: per-unit daily revenue rows
//! - [`active_users`]: daily activity tracking
//! - [`kpis`]: daily KPI rows and their recomputation
//! - [`api_usage`]: outbound API call log
//!
//! Lookups by id return `Result<Option<Row>>`; the HTTP layer maps `None` to
//! a 404. Constraint violations are recognised with [`constraint_violation`].

mod active_users;
mod ad_units;
mod api_usage;
mod impressions;
mod kpis;
mod plants;
mod revenue;
mod species;
mod users;
mod watering;

pub use api_usage::ApiUsageRecord;
pub use impressions::PlacementCount;
pub use revenue::{RevenueBatch, RevenueTotals};

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};

// ── Plant types ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PlantSpeciesRow {
    pub id: i64,
    pub name: String,
    pub scientific_name: Option<String>,
    pub water_frequency: i32,
    pub light_requirements: String,
    pub humidity_level: Option<String>,
    pub temperature_range: Option<String>,
    pub soil_type: Option<String>,
    pub fertilizer_frequency: Option<String>,
    pub care_summary: Option<String>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PlantRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub uid: String,
    pub species_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_watered: Option<DateTime<Utc>>,
    pub last_fertilized: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub birthname: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub createdat: NaiveDate,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WateringScheduleRow {
    pub id: i64,
    pub plant_id: i64,
    pub last_watered: DateTime<Utc>,
    pub next_watering_due: DateTime<Utc>,
    pub is_watered: bool,
}

// ── Ad types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AdUnitRow {
    pub id: i64,
    pub name: String,
    pub format: String,
    pub placement: String,
    pub unit_id_android: String,
    pub unit_id_ios: String,
    pub is_active: bool,
    pub is_test: bool,
    pub refresh_rate: i32,
    pub targeting_keywords: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AdImpressionRow {
    pub id: i64,
    pub ad_id: String,
    pub ad_network: String,
    pub ad_unit_id: Option<i64>,
    pub ad_unit_name: Option<String>,
    pub placement: String,
    pub impression_time: DateTime<Utc>,
    pub device_id: Option<String>,
    pub device_platform: Option<String>,
    pub device_model: Option<String>,
    pub uid: Option<String>,
    pub estimated_revenue: Decimal,
    pub is_test_ad: bool,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AdClickRow {
    pub id: i64,
    pub impression_id: i64,
    pub click_time: DateTime<Utc>,
    pub conversion_type: Option<String>,
    pub conversion_value: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AdRevenueRow {
    pub id: i64,
    pub ad_unit_id: i64,
    pub ad_unit_name: String,
    pub ad_format: String,
    pub date: NaiveDate,
    pub impressions: i64,
    pub clicks: i64,
    pub revenue: Decimal,
    pub ecpm: Decimal,
    pub fill_rate: f64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ActiveUserRow {
    pub id: i64,
    pub uid: String,
    pub date: NaiveDate,
    pub last_active_time: DateTime<Utc>,
    pub session_count: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct AdKpiRow {
    pub id: i64,
    pub date: NaiveDate,
    pub active_users: i64,
    pub total_impressions: i64,
    pub impressions_per_user: f64,
    pub estimated_revenue: Decimal,
    pub estimated_arpu: Decimal,
    pub target_achieved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Half-open UTC bounds `[00:00, next 00:00)` of a calendar day.
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    (start, start + chrono::Duration::days(1))
}

/// A rejected write, classified by SQLSTATE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintViolation {
    /// `23505`, with the constraint name.
    Unique(String),
    /// `23503`, with the constraint name.
    ForeignKey(String),
    /// `22003`: a value overflowed its column type.
    OutOfRange,
}

/// Classify a database error surfaced through `anyhow`.
pub fn constraint_violation(err: &anyhow::Error) -> Option<ConstraintViolation> {
    let sqlx::Error::Database(db_err) = err.downcast_ref::<sqlx::Error>()? else {
        return None;
    };
    let constraint = db_err.constraint().unwrap_or_default().to_string();
    match db_err.code().as_deref() {
        Some("23505") => Some(ConstraintViolation::Unique(constraint)),
        Some("23503") => Some(ConstraintViolation::ForeignKey(constraint)),
        Some("22003") => Some(ConstraintViolation::OutOfRange),
        _ => None,
    }
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL using the provided database URL.
    ///
    /// User and password are percent-decoded by hand so pooler usernames of
    /// the form `user.project` survive intact. `sslmode` is honoured from the
    /// query string.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with(database_url, 10).await
    }

    pub async fn connect_with(database_url: &str, max_connections: u32) -> Result<Self> {
        let url = url::Url::parse(database_url)?;
        let username = urlencoding::decode(url.username())?.into_owned();
        let password = url
            .password()
            .map(|p| urlencoding::decode(p).map(|s| s.into_owned()))
            .transpose()?;
        let mut opts = PgConnectOptions::new()
            .host(url.host_str().unwrap_or("localhost"))
            .port(url.port().unwrap_or(5432))
            .database(url.path().trim_start_matches('/'))
            .username(&username);
        if let Some(ref pw) = password {
            opts = opts.password(pw);
        }
        if let Some((_, mode)) = url.query_pairs().find(|(k, _)| k == "sslmode") {
            let mode: PgSslMode = mode.parse()?;
            opts = opts.ssl_mode(mode);
        }
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;
        Ok(Database { pool })
    }

    /// Wrap an existing pool (used by tests that share one pool).
    pub fn from_pool(pool: PgPool) -> Self {
        Database { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending migrations from `migrations/`.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Execute `SELECT 1` to verify database connectivity.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_bounds_cover_one_utc_day() {
        let date = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        let (start, end) = day_bounds(date);
        assert_eq!(start.to_rfc3339(), "2025-05-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2025-05-02T00:00:00+00:00");
    }

    #[test]
    fn non_database_errors_are_not_violations() {
        let err = anyhow::anyhow!("connection reset");
        assert_eq!(constraint_violation(&err), None);
        let err: anyhow::Error = sqlx::Error::RowNotFound.into();
        assert_eq!(constraint_violation(&err), None);
    }
}
