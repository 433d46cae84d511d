//! Watering schedule entries, visible only through the owning plant's uid.

use super::{Database, WateringScheduleRow};
use anyhow::Result;
use chrono::{DateTime, Utc};

impl Database {
    pub async fn list_watering(
        &self,
        uid: &str,
        plant_id: Option<i64>,
    ) -> Result<Vec<WateringScheduleRow>> {
        let rows = sqlx::query_as::<_, WateringScheduleRow>(
            "SELECT w.id, w.plant_id, w.last_watered, w.next_watering_due, w.is_watered
             FROM watering_schedules w
             JOIN plants p ON p.id = w.plant_id
             WHERE p.uid = $1 AND ($2::BIGINT IS NULL OR w.plant_id = $2)
             ORDER BY w.next_watering_due, w.id",
        )
        .bind(uid)
        .bind(plant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_watering(&self, id: i64, uid: &str) -> Result<Option<WateringScheduleRow>> {
        let row = sqlx::query_as::<_, WateringScheduleRow>(
            "SELECT w.id, w.plant_id, w.last_watered, w.next_watering_due, w.is_watered
             FROM watering_schedules w
             JOIN plants p ON p.id = w.plant_id
             WHERE w.id = $1 AND p.uid = $2",
        )
        .bind(id)
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn insert_watering(
        &self,
        plant_id: i64,
        last_watered: DateTime<Utc>,
        next_watering_due: DateTime<Utc>,
        is_watered: bool,
    ) -> Result<WateringScheduleRow> {
        let row = sqlx::query_as::<_, WateringScheduleRow>(
            "INSERT INTO watering_schedules (plant_id, last_watered, next_watering_due, is_watered)
             VALUES ($1, $2, $3, $4)
             RETURNING id, plant_id, last_watered, next_watering_due, is_watered",
        )
        .bind(plant_id)
        .bind(last_watered)
        .bind(next_watering_due)
        .bind(is_watered)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn update_watering(
        &self,
        id: i64,
        uid: &str,
        plant_id: i64,
        last_watered: DateTime<Utc>,
        next_watering_due: DateTime<Utc>,
        is_watered: bool,
    ) -> Result<Option<WateringScheduleRow>> {
        let row = sqlx::query_as::<_, WateringScheduleRow>(
            "UPDATE watering_schedules w SET
               plant_id = $3, last_watered = $4, next_watering_due = $5, is_watered = $6
             FROM plants p
             WHERE w.id = $1 AND p.id = w.plant_id AND p.uid = $2
             RETURNING w.id, w.plant_id, w.last_watered, w.next_watering_due, w.is_watered",
        )
        .bind(id)
        .bind(uid)
        .bind(plant_id)
        .bind(last_watered)
        .bind(next_watering_due)
        .bind(is_watered)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn delete_watering(&self, id: i64, uid: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM watering_schedules w
             USING plants p
             WHERE w.id = $1 AND p.id = w.plant_id AND p.uid = $2",
        )
        .bind(id)
        .bind(uid)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
