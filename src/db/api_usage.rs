use super::Database;
use anyhow::Result;
use serde::Serialize;

/// One outbound API call, as logged by the care adapters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiUsageRecord {
    pub api_name: String,
    pub endpoint: String,
    pub response_time_ms: i32,
    pub success: bool,
    pub error_message: Option<String>,
}

impl Database {
    pub async fn insert_api_usage(&self, record: &ApiUsageRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO api_usage (api_name, endpoint, response_time, success, error_message)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&record.api_name)
        .bind(&record.endpoint)
        .bind(record.response_time_ms)
        .bind(record.success)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Count of logged calls for `api_name`, split into (successes, failures).
    pub async fn api_usage_counts(&self, api_name: &str) -> Result<(i64, i64)> {
        let counts = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*) FILTER (WHERE success), COUNT(*) FILTER (WHERE NOT success)
             FROM api_usage WHERE api_name = $1",
        )
        .bind(api_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(counts)
    }
}
