//! Ad impressions and clicks. Both are write-once: there is no update path.

use super::{AdClickRow, AdImpressionRow, Database};
use crate::dto::{ClickInput, ImpressionInput};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

const IMPRESSION_SELECT: &str = "SELECT i.id, i.ad_id, i.ad_network, i.ad_unit_id,
       u.name AS ad_unit_name, i.placement, i.impression_time, i.device_id,
       i.device_platform, i.device_model, i.uid, i.estimated_revenue,
       i.is_test_ad, i.metadata";

const CLICK_COLUMNS: &str = "id, impression_id, click_time, conversion_type, conversion_value";

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PlacementCount {
    pub placement: String,
    pub count: i64,
}

impl Database {
    pub async fn list_impressions(&self, limit: i64) -> Result<Vec<AdImpressionRow>> {
        let sql = format!(
            "{} FROM ad_impressions i
             LEFT JOIN ad_units u ON u.id = i.ad_unit_id
             ORDER BY i.impression_time DESC, i.id DESC
             LIMIT $1",
            IMPRESSION_SELECT
        );
        let rows = sqlx::query_as::<_, AdImpressionRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get_impression(&self, id: i64) -> Result<Option<AdImpressionRow>> {
        let sql = format!(
            "{} FROM ad_impressions i
             LEFT JOIN ad_units u ON u.id = i.ad_unit_id
             WHERE i.id = $1",
            IMPRESSION_SELECT
        );
        let row = sqlx::query_as::<_, AdImpressionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Insert an impression stamped with the current time.
    pub async fn insert_impression(
        &self,
        input: &ImpressionInput,
        uid: Option<&str>,
    ) -> Result<AdImpressionRow> {
        let sql = format!(
            "WITH i AS (
               INSERT INTO ad_impressions
                 (ad_id, ad_network, ad_unit_id, placement, device_id, device_platform,
                  device_model, uid, estimated_revenue, is_test_ad, metadata)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
               RETURNING *
             )
             {} FROM i LEFT JOIN ad_units u ON u.id = i.ad_unit_id",
            IMPRESSION_SELECT
        );
        let row = sqlx::query_as::<_, AdImpressionRow>(&sql)
            .bind(&input.ad_id)
            .bind(&input.ad_network)
            .bind(input.ad_unit_id)
            .bind(input.placement.as_str())
            .bind(&input.device_id)
            .bind(&input.device_platform)
            .bind(&input.device_model)
            .bind(uid)
            .bind(input.estimated_revenue)
            .bind(input.is_test_ad)
            .bind(&input.metadata)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn delete_impression(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM ad_impressions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Clicks belonging to any of `impression_ids`, oldest first.
    pub async fn clicks_for_impressions(&self, impression_ids: &[i64]) -> Result<Vec<AdClickRow>> {
        if impression_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM ad_clicks WHERE impression_id = ANY($1) ORDER BY click_time, id",
            CLICK_COLUMNS
        );
        let rows = sqlx::query_as::<_, AdClickRow>(&sql)
            .bind(impression_ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn list_clicks(&self, limit: i64) -> Result<Vec<AdClickRow>> {
        let sql = format!(
            "SELECT {} FROM ad_clicks ORDER BY click_time DESC, id DESC LIMIT $1",
            CLICK_COLUMNS
        );
        let rows = sqlx::query_as::<_, AdClickRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get_click(&self, id: i64) -> Result<Option<AdClickRow>> {
        let sql = format!("SELECT {} FROM ad_clicks WHERE id = $1", CLICK_COLUMNS);
        let row = sqlx::query_as::<_, AdClickRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn insert_click(&self, input: &ClickInput) -> Result<AdClickRow> {
        let sql = format!(
            "INSERT INTO ad_clicks (impression_id, conversion_type, conversion_value)
             VALUES ($1, $2, $3)
             RETURNING {}",
            CLICK_COLUMNS
        );
        let row = sqlx::query_as::<_, AdClickRow>(&sql)
            .bind(input.impression_id)
            .bind(&input.conversion_type)
            .bind(input.conversion_value)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn delete_click(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM ad_clicks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Window aggregates over [start, end) ─────────────────────

    pub async fn count_impressions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM ad_impressions
             WHERE impression_time >= $1 AND impression_time < $2",
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn count_clicks_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM ad_clicks WHERE click_time >= $1 AND click_time < $2",
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn impression_revenue_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Decimal> {
        let total = sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(estimated_revenue), 0) FROM ad_impressions
             WHERE impression_time >= $1 AND impression_time < $2",
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    pub async fn impressions_by_placement(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PlacementCount>> {
        let rows = sqlx::query_as::<_, PlacementCount>(
            "SELECT placement, COUNT(*) AS count FROM ad_impressions
             WHERE impression_time >= $1 AND impression_time < $2
             GROUP BY placement
             ORDER BY count DESC, placement",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
