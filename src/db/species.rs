use super::{Database, PlantSpeciesRow};
use crate::dto::{SpeciesInput, DEFAULT_WATER_FREQUENCY_DAYS};
use anyhow::Result;

const SPECIES_COLUMNS: &str = "id, name, scientific_name, water_frequency, light_requirements,
     humidity_level, temperature_range, soil_type, fertilizer_frequency,
     care_summary, last_updated";

impl Database {
    pub async fn list_species(&self) -> Result<Vec<PlantSpeciesRow>> {
        let sql = format!(
            "SELECT {} FROM plant_species ORDER BY LOWER(name), id",
            SPECIES_COLUMNS
        );
        let rows = sqlx::query_as::<_, PlantSpeciesRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get_species(&self, id: i64) -> Result<Option<PlantSpeciesRow>> {
        let sql = format!("SELECT {} FROM plant_species WHERE id = $1", SPECIES_COLUMNS);
        let row = sqlx::query_as::<_, PlantSpeciesRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Oldest species whose name equals `name`, ignoring case.
    pub async fn find_species_by_name(&self, name: &str) -> Result<Option<PlantSpeciesRow>> {
        let sql = format!(
            "SELECT {} FROM plant_species
             WHERE LOWER(name) = LOWER($1)
             ORDER BY id LIMIT 1",
            SPECIES_COLUMNS
        );
        let row = sqlx::query_as::<_, PlantSpeciesRow>(&sql)
            .bind(name.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Oldest species whose name contains `fragment`, ignoring case.
    /// `%` and `_` in the fragment match literally.
    pub async fn search_species(&self, fragment: &str) -> Result<Option<PlantSpeciesRow>> {
        let sql = format!(
            "SELECT {} FROM plant_species
             WHERE STRPOS(LOWER(name), LOWER($1)) > 0
             ORDER BY id LIMIT 1",
            SPECIES_COLUMNS
        );
        let row = sqlx::query_as::<_, PlantSpeciesRow>(&sql)
            .bind(fragment.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn insert_species(&self, input: &SpeciesInput) -> Result<PlantSpeciesRow> {
        let sql = format!(
            "INSERT INTO plant_species
               (name, scientific_name, water_frequency, light_requirements, humidity_level,
                temperature_range, soil_type, fertilizer_frequency, care_summary)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {}",
            SPECIES_COLUMNS
        );
        let row = sqlx::query_as::<_, PlantSpeciesRow>(&sql)
            .bind(&input.name)
            .bind(&input.scientific_name)
            .bind(input.water_frequency.unwrap_or(DEFAULT_WATER_FREQUENCY_DAYS))
            .bind(input.light_requirements.as_deref().unwrap_or_default())
            .bind(&input.humidity_level)
            .bind(&input.temperature_range)
            .bind(&input.soil_type)
            .bind(&input.fertilizer_frequency)
            .bind(&input.care_summary)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn update_species(
        &self,
        id: i64,
        input: &SpeciesInput,
    ) -> Result<Option<PlantSpeciesRow>> {
        let sql = format!(
            "UPDATE plant_species SET
               name = $2, scientific_name = $3, water_frequency = $4,
               light_requirements = $5, humidity_level = $6, temperature_range = $7,
               soil_type = $8, fertilizer_frequency = $9, care_summary = $10,
               last_updated = NOW()
             WHERE id = $1
             RETURNING {}",
            SPECIES_COLUMNS
        );
        let row = sqlx::query_as::<_, PlantSpeciesRow>(&sql)
            .bind(id)
            .bind(&input.name)
            .bind(&input.scientific_name)
            .bind(input.water_frequency.unwrap_or(DEFAULT_WATER_FREQUENCY_DAYS))
            .bind(input.light_requirements.as_deref().unwrap_or_default())
            .bind(&input.humidity_level)
            .bind(&input.temperature_range)
            .bind(&input.soil_type)
            .bind(&input.fertilizer_frequency)
            .bind(&input.care_summary)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Replace the care data of the species named like `input.name`, or
    /// insert a new one.
    pub async fn upsert_species_by_name(&self, input: &SpeciesInput) -> Result<PlantSpeciesRow> {
        match self.find_species_by_name(&input.name).await? {
            Some(existing) => Ok(self
                .update_species(existing.id, input)
                .await?
                .unwrap_or(existing)),
            None => self.insert_species(input).await,
        }
    }

    pub async fn delete_species(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM plant_species WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
