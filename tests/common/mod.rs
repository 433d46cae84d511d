//! Shared test helpers for integration tests.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use plantkeeper::api::middleware_auth::TokenVerifier;
use plantkeeper::api::{build_router, AppState};
use plantkeeper::care::{CareService, CareSummary, CareTextGenerator, PlantInfo, PlantInfoProvider};
use plantkeeper::config::AppConfig;
use plantkeeper::db::Database;
use plantkeeper::prom_metrics::Metrics;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

pub const JWT_SECRET: &str = "integration-test-secret";
pub const ALICE: &str = "uid-alice";
pub const BOB: &str = "uid-bob";

/// Returns the test database URL from the `TEST_DATABASE_URL` environment variable.
/// Panics if the variable is not set.
pub fn test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set for integration tests")
}

/// Returns true if the test database URL is configured.
pub fn has_test_db() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

static SCHEMA_INIT: OnceCell<()> = OnceCell::const_new();

/// Connect to the test database, apply migrations once per test binary and
/// start from empty tables.
pub async fn setup_test_db() -> Database {
    let db = Database::connect(&test_db_url())
        .await
        .expect("Failed to connect to test database");
    SCHEMA_INIT
        .get_or_init(|| async { db.migrate().await.expect("migrations failed") })
        .await;
    truncate_all_tables(db.pool()).await;
    db
}

/// Truncate all tables to ensure test isolation.
pub async fn truncate_all_tables(pool: &sqlx::PgPool) {
    sqlx::raw_sql(
        "TRUNCATE TABLE ad_clicks, ad_impressions, ad_revenue, ad_units, active_users,
                        ad_kpis, watering_schedules, plants, plant_species, users, api_usage
         RESTART IDENTITY CASCADE",
    )
    .execute(pool)
    .await
    .unwrap();
}

/// Provider that always returns one canned record.
pub struct StubProvider;

#[async_trait]
impl PlantInfoProvider for StubProvider {
    fn name(&self) -> &'static str {
        "Stub"
    }

    fn endpoint(&self, plant_name: &str) -> String {
        format!("stub://search?q={}", plant_name)
    }

    async fn search(&self, plant_name: &str) -> Result<Vec<Value>> {
        Ok(vec![json!({
            "common_name": plant_name,
            "scientific_name": ["Stubbus plantae"],
        })])
    }
}

/// Generator returning a fixed summary, or failing when `fail` is set.
/// Counts calls so tests can assert caching.
pub struct StubGenerator {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl StubGenerator {
    pub fn new(fail: bool) -> Arc<Self> {
        Arc::new(StubGenerator {
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CareTextGenerator for StubGenerator {
    fn name(&self) -> &'static str {
        "StubAI"
    }

    fn endpoint(&self) -> String {
        "stub://generate".to_string()
    }

    async fn generate(&self, plant_name: &str, _info: &PlantInfo) -> Result<CareSummary> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("generator offline");
        }
        Ok(CareSummary {
            plant_name: plant_name.to_string(),
            scientific_name: Some("Stubbus plantae".to_string()),
            watering_needs: Some("Keep the soil lightly moist".to_string()),
            light_needs: Some("Bright indirect light".to_string()),
            summary: Some(format!("{} is easy to keep.", plant_name)),
            tips: vec!["Rotate weekly".to_string()],
            watering_days: Some(5),
        })
    }
}

pub struct TestApp {
    pub router: axum::Router,
    pub db: Database,
    pub generator: Arc<StubGenerator>,
}

/// Build the router over a clean database with stub collaborators and
/// HS256 token verification.
pub async fn build_test_app_with(fail_generation: bool) -> TestApp {
    let db = setup_test_db().await;
    let generator = StubGenerator::new(fail_generation);
    let metrics = Arc::new(Metrics::new());
    let care = CareService::new(
        vec![Arc::new(StubProvider)],
        generator.clone(),
        metrics.clone(),
    );
    let state = AppState::new(
        db.clone(),
        AppConfig::default(),
        care,
        TokenVerifier::shared_secret(JWT_SECRET),
        metrics,
    );
    TestApp {
        router: build_router(state),
        db,
        generator,
    }
}

pub async fn build_test_app() -> TestApp {
    build_test_app_with(false).await
}

/// HS256 token for `uid`, valid for an hour.
pub fn token_for(uid: &str) -> String {
    let claims = json!({
        "sub": uid,
        "exp": chrono::Utc::now().timestamp() + 3600,
    });
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}
