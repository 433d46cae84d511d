use super::{constraint_violation, AdRevenueRow, Database};
use crate::dto::RevenueInput;
use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{Connection, PgConnection};

const REVENUE_SELECT: &str = "SELECT r.id, r.ad_unit_id, u.name AS ad_unit_name,
       u.format AS ad_format, r.date, r.impressions, r.clicks, r.revenue,
       r.ecpm, r.fill_rate";

/// Summed revenue columns for one day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct RevenueTotals {
    pub impressions: i64,
    pub clicks: i64,
    pub revenue: Decimal,
}

/// Outcome of [`Database::upsert_revenue_batch`]. `rejected` pairs each
/// caller-supplied row index with the database error that rolled it back.
#[derive(Debug, Default)]
pub struct RevenueBatch {
    pub created: u32,
    pub updated: u32,
    pub rejected: Vec<(usize, anyhow::Error)>,
}

/// Returns true when the row was inserted, false when an existing
/// (unit, date) row was updated.
async fn upsert_revenue_on(conn: &mut PgConnection, input: &RevenueInput) -> Result<bool> {
    let inserted = sqlx::query_scalar::<_, bool>(
        "INSERT INTO ad_revenue (ad_unit_id, date, impressions, clicks, revenue, ecpm, fill_rate)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT ON CONSTRAINT ad_revenue_unit_date_key DO UPDATE SET
           impressions = EXCLUDED.impressions,
           clicks = EXCLUDED.clicks,
           revenue = EXCLUDED.revenue,
           ecpm = EXCLUDED.ecpm,
           fill_rate = EXCLUDED.fill_rate
         RETURNING (xmax = 0)",
    )
    .bind(input.ad_unit_id)
    .bind(input.date)
    .bind(input.impressions)
    .bind(input.clicks)
    .bind(input.revenue)
    .bind(input.ecpm)
    .bind(input.fill_rate)
    .fetch_one(&mut *conn)
    .await?;
    Ok(inserted)
}

impl Database {
    pub async fn list_revenue(&self, ad_unit_id: Option<i64>) -> Result<Vec<AdRevenueRow>> {
        let sql = format!(
            "{} FROM ad_revenue r JOIN ad_units u ON u.id = r.ad_unit_id
             WHERE ($1::BIGINT IS NULL OR r.ad_unit_id = $1)
             ORDER BY r.date DESC, r.id DESC",
            REVENUE_SELECT
        );
        let rows = sqlx::query_as::<_, AdRevenueRow>(&sql)
            .bind(ad_unit_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get_revenue(&self, id: i64) -> Result<Option<AdRevenueRow>> {
        let sql = format!(
            "{} FROM ad_revenue r JOIN ad_units u ON u.id = r.ad_unit_id WHERE r.id = $1",
            REVENUE_SELECT
        );
        let row = sqlx::query_as::<_, AdRevenueRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Rows with `start <= date <= end`.
    pub async fn revenue_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AdRevenueRow>> {
        let sql = format!(
            "{} FROM ad_revenue r JOIN ad_units u ON u.id = r.ad_unit_id
             WHERE r.date >= $1 AND r.date <= $2
             ORDER BY r.date, r.id",
            REVENUE_SELECT
        );
        let rows = sqlx::query_as::<_, AdRevenueRow>(&sql)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn revenue_totals_on(&self, date: NaiveDate) -> Result<RevenueTotals> {
        let row = sqlx::query_as::<_, RevenueTotals>(
            "SELECT COALESCE(SUM(impressions), 0)::BIGINT AS impressions,
                    COALESCE(SUM(clicks), 0)::BIGINT AS clicks,
                    COALESCE(SUM(revenue), 0) AS revenue
             FROM ad_revenue WHERE date = $1",
        )
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn insert_revenue(&self, input: &RevenueInput) -> Result<AdRevenueRow> {
        let sql = format!(
            "WITH r AS (
               INSERT INTO ad_revenue (ad_unit_id, date, impressions, clicks, revenue, ecpm, fill_rate)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING *
             )
             {} FROM r JOIN ad_units u ON u.id = r.ad_unit_id",
            REVENUE_SELECT
        );
        let row = sqlx::query_as::<_, AdRevenueRow>(&sql)
            .bind(input.ad_unit_id)
            .bind(input.date)
            .bind(input.impressions)
            .bind(input.clicks)
            .bind(input.revenue)
            .bind(input.ecpm)
            .bind(input.fill_rate)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn update_revenue(&self, id: i64, input: &RevenueInput) -> Result<Option<AdRevenueRow>> {
        let sql = format!(
            "WITH r AS (
               UPDATE ad_revenue SET
                 ad_unit_id = $2, date = $3, impressions = $4, clicks = $5,
                 revenue = $6, ecpm = $7, fill_rate = $8
               WHERE id = $1
               RETURNING *
             )
             {} FROM r JOIN ad_units u ON u.id = r.ad_unit_id",
            REVENUE_SELECT
        );
        let row = sqlx::query_as::<_, AdRevenueRow>(&sql)
            .bind(id)
            .bind(input.ad_unit_id)
            .bind(input.date)
            .bind(input.impressions)
            .bind(input.clicks)
            .bind(input.revenue)
            .bind(input.ecpm)
            .bind(input.fill_rate)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Insert or replace the row for `(ad_unit_id, date)`. Returns `true`
    /// when a new row was created.
    pub async fn upsert_revenue(&self, input: &RevenueInput) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        upsert_revenue_on(&mut conn, input).await
    }

    /// Upsert `rows` in one transaction, each behind its own savepoint. A
    /// row rejected by a constraint or range check is rolled back and
    /// reported; any other failure aborts the batch with nothing written.
    pub async fn upsert_revenue_batch(&self, rows: &[(usize, RevenueInput)]) -> Result<RevenueBatch> {
        let mut tx = self.pool.begin().await?;
        let mut batch = RevenueBatch::default();
        for (index, input) in rows {
            let mut savepoint = Connection::begin(&mut *tx).await?;
            match upsert_revenue_on(&mut savepoint, input).await {
                Ok(true) => {
                    savepoint.commit().await?;
                    batch.created += 1;
                }
                Ok(false) => {
                    savepoint.commit().await?;
                    batch.updated += 1;
                }
                Err(e) if constraint_violation(&e).is_some() => {
                    savepoint.rollback().await?;
                    batch.rejected.push((*index, e));
                }
                Err(e) => return Err(e),
            }
        }
        tx.commit().await?;
        Ok(batch)
    }

    pub async fn delete_revenue(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM ad_revenue WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
