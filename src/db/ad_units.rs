use super::{AdUnitRow, Database};
use crate::dto::{AdUnitInput, Placement};
use anyhow::Result;

const AD_UNIT_COLUMNS: &str = "id, name, format, placement, unit_id_android, unit_id_ios,
     is_active, is_test, refresh_rate, targeting_keywords, created_at, updated_at";

impl Database {
    /// All ad units, ordered by placement then id so that the first unit of
    /// each placement is the preferred one.
    pub async fn list_ad_units(&self, active_only: bool) -> Result<Vec<AdUnitRow>> {
        let sql = format!(
            "SELECT {} FROM ad_units
             WHERE ($1 = FALSE OR is_active)
             ORDER BY placement, id",
            AD_UNIT_COLUMNS
        );
        let rows = sqlx::query_as::<_, AdUnitRow>(&sql)
            .bind(active_only)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get_ad_unit(&self, id: i64) -> Result<Option<AdUnitRow>> {
        let sql = format!("SELECT {} FROM ad_units WHERE id = $1", AD_UNIT_COLUMNS);
        let row = sqlx::query_as::<_, AdUnitRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// First active unit configured for `placement`.
    pub async fn active_ad_unit_for(&self, placement: Placement) -> Result<Option<AdUnitRow>> {
        let sql = format!(
            "SELECT {} FROM ad_units
             WHERE placement = $1 AND is_active
             ORDER BY id LIMIT 1",
            AD_UNIT_COLUMNS
        );
        let row = sqlx::query_as::<_, AdUnitRow>(&sql)
            .bind(placement.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Look up a unit by its AdMob unit id on either platform.
    pub async fn find_ad_unit_by_admob_id(&self, unit_id: &str) -> Result<Option<AdUnitRow>> {
        let sql = format!(
            "SELECT {} FROM ad_units
             WHERE unit_id_android = $1 OR unit_id_ios = $1
             ORDER BY id LIMIT 1",
            AD_UNIT_COLUMNS
        );
        let row = sqlx::query_as::<_, AdUnitRow>(&sql)
            .bind(unit_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn insert_ad_unit(&self, input: &AdUnitInput) -> Result<AdUnitRow> {
        let sql = format!(
            "INSERT INTO ad_units
               (name, format, placement, unit_id_android, unit_id_ios,
                is_active, is_test, refresh_rate, targeting_keywords)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {}",
            AD_UNIT_COLUMNS
        );
        let row = sqlx::query_as::<_, AdUnitRow>(&sql)
            .bind(&input.name)
            .bind(input.format.as_str())
            .bind(input.placement.as_str())
            .bind(&input.unit_id_android)
            .bind(&input.unit_id_ios)
            .bind(input.is_active)
            .bind(input.is_test)
            .bind(input.refresh_rate)
            .bind(&input.targeting_keywords)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn update_ad_unit(&self, id: i64, input: &AdUnitInput) -> Result<Option<AdUnitRow>> {
        let sql = format!(
            "UPDATE ad_units SET
               name = $2, format = $3, placement = $4, unit_id_android = $5,
               unit_id_ios = $6, is_active = $7, is_test = $8, refresh_rate = $9,
               targeting_keywords = $10, updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            AD_UNIT_COLUMNS
        );
        let row = sqlx::query_as::<_, AdUnitRow>(&sql)
            .bind(id)
            .bind(&input.name)
            .bind(input.format.as_str())
            .bind(input.placement.as_str())
            .bind(&input.unit_id_android)
            .bind(&input.unit_id_ios)
            .bind(input.is_active)
            .bind(input.is_test)
            .bind(input.refresh_rate)
            .bind(&input.targeting_keywords)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn delete_ad_unit(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM ad_units WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
