//! Daily KPI rows. Every write takes a [`KpiMetrics`], so derived columns are
//! always the ones computed from the stored counts.

use super::{day_bounds, AdKpiRow, Database};
use crate::kpi::{KpiMetrics, KpiSettings};
use anyhow::Result;
use chrono::NaiveDate;

const KPI_COLUMNS: &str = "id, date, active_users, total_impressions, impressions_per_user,
     estimated_revenue, estimated_arpu, target_achieved, created_at, updated_at";

impl Database {
    pub async fn list_kpis(&self) -> Result<Vec<AdKpiRow>> {
        let sql = format!("SELECT {} FROM ad_kpis ORDER BY date DESC", KPI_COLUMNS);
        let rows = sqlx::query_as::<_, AdKpiRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get_kpi(&self, id: i64) -> Result<Option<AdKpiRow>> {
        let sql = format!("SELECT {} FROM ad_kpis WHERE id = $1", KPI_COLUMNS);
        let row = sqlx::query_as::<_, AdKpiRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get_kpi_by_date(&self, date: NaiveDate) -> Result<Option<AdKpiRow>> {
        let sql = format!("SELECT {} FROM ad_kpis WHERE date = $1", KPI_COLUMNS);
        let row = sqlx::query_as::<_, AdKpiRow>(&sql)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Rows with `start <= date <= end`, oldest first.
    pub async fn kpis_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<AdKpiRow>> {
        let sql = format!(
            "SELECT {} FROM ad_kpis WHERE date >= $1 AND date <= $2 ORDER BY date",
            KPI_COLUMNS
        );
        let rows = sqlx::query_as::<_, AdKpiRow>(&sql)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Plain insert; a second row for the same date is a unique violation.
    pub async fn insert_kpi(&self, date: NaiveDate, m: &KpiMetrics) -> Result<AdKpiRow> {
        let sql = format!(
            "INSERT INTO ad_kpis
               (date, active_users, total_impressions, impressions_per_user,
                estimated_revenue, estimated_arpu, target_achieved)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {}",
            KPI_COLUMNS
        );
        let row = sqlx::query_as::<_, AdKpiRow>(&sql)
            .bind(date)
            .bind(m.active_users)
            .bind(m.total_impressions)
            .bind(m.impressions_per_user)
            .bind(m.estimated_revenue)
            .bind(m.estimated_arpu)
            .bind(m.target_achieved)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn update_kpi(
        &self,
        id: i64,
        date: NaiveDate,
        m: &KpiMetrics,
    ) -> Result<Option<AdKpiRow>> {
        let sql = format!(
            "UPDATE ad_kpis SET
               date = $2, active_users = $3, total_impressions = $4,
               impressions_per_user = $5, estimated_revenue = $6,
               estimated_arpu = $7, target_achieved = $8, updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            KPI_COLUMNS
        );
        let row = sqlx::query_as::<_, AdKpiRow>(&sql)
            .bind(id)
            .bind(date)
            .bind(m.active_users)
            .bind(m.total_impressions)
            .bind(m.impressions_per_user)
            .bind(m.estimated_revenue)
            .bind(m.estimated_arpu)
            .bind(m.target_achieved)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Insert or replace the row for `date`. `updated_at` only moves when a
    /// stored value actually changes, so repeating an upsert with the same
    /// metrics leaves the row untouched.
    pub async fn upsert_kpi(&self, date: NaiveDate, m: &KpiMetrics) -> Result<AdKpiRow> {
        let sql = format!(
            "INSERT INTO ad_kpis
               (date, active_users, total_impressions, impressions_per_user,
                estimated_revenue, estimated_arpu, target_achieved)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT ON CONSTRAINT ad_kpis_date_key DO UPDATE SET
               active_users = EXCLUDED.active_users,
               total_impressions = EXCLUDED.total_impressions,
               impressions_per_user = EXCLUDED.impressions_per_user,
               estimated_revenue = EXCLUDED.estimated_revenue,
               estimated_arpu = EXCLUDED.estimated_arpu,
               target_achieved = EXCLUDED.target_achieved,
               updated_at = CASE
                 WHEN (ad_kpis.active_users, ad_kpis.total_impressions,
                       ad_kpis.estimated_revenue, ad_kpis.target_achieved)
                      IS DISTINCT FROM
                      (EXCLUDED.active_users, EXCLUDED.total_impressions,
                       EXCLUDED.estimated_revenue, EXCLUDED.target_achieved)
                 THEN NOW()
                 ELSE ad_kpis.updated_at
               END
             RETURNING {}",
            KPI_COLUMNS
        );
        let row = sqlx::query_as::<_, AdKpiRow>(&sql)
            .bind(date)
            .bind(m.active_users)
            .bind(m.total_impressions)
            .bind(m.impressions_per_user)
            .bind(m.estimated_revenue)
            .bind(m.estimated_arpu)
            .bind(m.target_achieved)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn delete_kpi(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM ad_kpis WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Recompute the KPI row for one UTC day from the activity and
    /// impression tables.
    pub async fn recompute_kpi(&self, date: NaiveDate, settings: &KpiSettings) -> Result<AdKpiRow> {
        let active = self.count_active_users_on(date).await?;
        let (start, end) = day_bounds(date);
        let impressions = self.count_impressions_between(start, end).await?;
        let metrics = KpiMetrics::compute(active, impressions, settings);
        self.upsert_kpi(date, &metrics).await
    }
}
