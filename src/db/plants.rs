//! Owned plants. Every query is scoped to the owner's identity subject, so a
//! caller can never see or touch another user's plants.

use super::{Database, PlantRow};
use crate::dto::PlantInput;
use anyhow::Result;
use chrono::{DateTime, Utc};

const PLANT_COLUMNS: &str = "id, name, description, image_url, uid, species_id,
     created_at, updated_at, last_watered, last_fertilized";

impl Database {
    pub async fn list_plants(&self, uid: &str) -> Result<Vec<PlantRow>> {
        let sql = format!(
            "SELECT {} FROM plants WHERE uid = $1 ORDER BY created_at DESC, id DESC",
            PLANT_COLUMNS
        );
        let rows = sqlx::query_as::<_, PlantRow>(&sql)
            .bind(uid)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get_plant(&self, id: i64, uid: &str) -> Result<Option<PlantRow>> {
        let sql = format!(
            "SELECT {} FROM plants WHERE id = $1 AND uid = $2",
            PLANT_COLUMNS
        );
        let row = sqlx::query_as::<_, PlantRow>(&sql)
            .bind(id)
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn insert_plant(&self, uid: &str, input: &PlantInput) -> Result<PlantRow> {
        let sql = format!(
            "INSERT INTO plants
               (name, description, image_url, uid, species_id, last_watered, last_fertilized)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {}",
            PLANT_COLUMNS
        );
        let row = sqlx::query_as::<_, PlantRow>(&sql)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.image_url)
            .bind(uid)
            .bind(input.species_id)
            .bind(input.last_watered)
            .bind(input.last_fertilized)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn update_plant(
        &self,
        id: i64,
        uid: &str,
        input: &PlantInput,
    ) -> Result<Option<PlantRow>> {
        let sql = format!(
            "UPDATE plants SET
               name = $3, description = $4, image_url = $5, species_id = $6,
               last_watered = $7, last_fertilized = $8, updated_at = NOW()
             WHERE id = $1 AND uid = $2
             RETURNING {}",
            PLANT_COLUMNS
        );
        let row = sqlx::query_as::<_, PlantRow>(&sql)
            .bind(id)
            .bind(uid)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.image_url)
            .bind(input.species_id)
            .bind(input.last_watered)
            .bind(input.last_fertilized)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn delete_plant(&self, id: i64, uid: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM plants WHERE id = $1 AND uid = $2")
            .bind(id)
            .bind(uid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Attach a species to a plant. An empty description is filled from
    /// `description`; an existing one is kept.
    pub async fn link_species(
        &self,
        plant_id: i64,
        species_id: i64,
        description: Option<&str>,
    ) -> Result<Option<PlantRow>> {
        let sql = format!(
            "UPDATE plants SET
               species_id = $2,
               description = COALESCE(NULLIF(BTRIM(description), ''), $3),
               updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            PLANT_COLUMNS
        );
        let row = sqlx::query_as::<_, PlantRow>(&sql)
            .bind(plant_id)
            .bind(species_id)
            .bind(description)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn set_last_watered(
        &self,
        id: i64,
        uid: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<PlantRow>> {
        let sql = format!(
            "UPDATE plants SET last_watered = $3, updated_at = NOW()
             WHERE id = $1 AND uid = $2
             RETURNING {}",
            PLANT_COLUMNS
        );
        let row = sqlx::query_as::<_, PlantRow>(&sql)
            .bind(id)
            .bind(uid)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}
