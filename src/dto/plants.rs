//! Species, owned-plant and watering-schedule payloads.

use super::{FieldErrors, FieldReader};
use crate::db::{PlantRow, PlantSpeciesRow};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;

/// Watering interval used when neither the request nor the species gives one.
pub const DEFAULT_WATER_FREQUENCY_DAYS: i32 = 7;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeciesInput {
    pub name: String,
    pub scientific_name: Option<String>,
    pub water_frequency: Option<i32>,
    pub light_requirements: Option<String>,
    pub humidity_level: Option<String>,
    pub temperature_range: Option<String>,
    pub soil_type: Option<String>,
    pub fertilizer_frequency: Option<String>,
    pub care_summary: Option<String>,
}

impl SpeciesInput {
    pub fn from_json(body: &Value) -> Result<Self, FieldErrors> {
        let mut r = FieldReader::new(body);
        let name = r.required_str("name", 255);
        let water_frequency = r
            .optional_i64("water_frequency", 1..=365)
            .and_then(|n| i32::try_from(n).ok());
        let input = SpeciesInput {
            name: name.unwrap_or_default(),
            scientific_name: r.optional_str("scientific_name", 255),
            water_frequency,
            light_requirements: r.optional_str("light_requirements", 100),
            humidity_level: r.optional_str("humidity_level", 100),
            temperature_range: r.optional_str("temperature_range", 100),
            soil_type: r.optional_str("soil_type", 100),
            fertilizer_frequency: r.optional_str("fertilizer_frequency", 100),
            care_summary: r.optional_str("care_summary", 10_000),
        };
        r.finish()?;
        Ok(input)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlantInput {
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub species_id: Option<i64>,
    pub last_watered: Option<DateTime<Utc>>,
    pub last_fertilized: Option<DateTime<Utc>>,
}

impl PlantInput {
    pub fn from_json(body: &Value) -> Result<Self, FieldErrors> {
        let mut r = FieldReader::new(body);
        let input = PlantInput {
            name: r.required_str("name", 255).unwrap_or_default(),
            description: r.optional_str("description", 10_000),
            image_url: r.optional_url("image_url"),
            species_id: r.optional_i64_any(&["species_id", "care"], super::ID),
            last_watered: r.optional_datetime("last_watered"),
            last_fertilized: r.optional_datetime("last_fertilized"),
        };
        r.finish()?;
        Ok(input)
    }
}

/// An owned plant with its species care data nested under `care`.
#[derive(Debug, Clone, Serialize)]
pub struct PlantView {
    #[serde(flatten)]
    pub plant: PlantRow,
    pub care: Option<PlantSpeciesRow>,
}

impl PlantView {
    pub fn new(plant: PlantRow, care: Option<PlantSpeciesRow>) -> Self {
        PlantView { plant, care }
    }

    /// Serialize a stored plant for use as a PATCH merge base. The nested
    /// species is flattened back to its id.
    pub fn patch_base(plant: &PlantRow) -> Value {
        serde_json::json!({
            "name": plant.name,
            "description": plant.description,
            "image_url": plant.image_url,
            "species_id": plant.species_id,
            "last_watered": plant.last_watered,
            "last_fertilized": plant.last_fertilized,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WateringInput {
    pub plant_id: i64,
    pub last_watered: Option<DateTime<Utc>>,
    pub next_watering_due: Option<DateTime<Utc>>,
    pub is_watered: bool,
}

impl WateringInput {
    pub fn from_json(body: &Value) -> Result<Self, FieldErrors> {
        let mut r = FieldReader::new(body);
        let plant_id = r.required_i64_any(&["plant_id", "plant"], super::ID);
        let last_watered = r.optional_datetime("last_watered");
        let next_watering_due = r.optional_datetime("next_watering_due");
        let is_watered = r.optional_bool("is_watered").unwrap_or(false);
        if let (Some(last), Some(next)) = (last_watered, next_watering_due) {
            if next < last {
                r.error(
                    "next_watering_due",
                    "Next watering cannot be before the last watering.",
                );
            }
        }
        r.finish()?;
        Ok(WateringInput {
            plant_id: plant_id.unwrap_or_default(),
            last_watered,
            next_watering_due,
            is_watered,
        })
    }
}

/// Next-due time for a watering entry: `last_watered` plus the species
/// interval, or [`DEFAULT_WATER_FREQUENCY_DAYS`] when the plant has no species.
pub fn next_watering_due(
    last_watered: DateTime<Utc>,
    water_frequency_days: Option<i32>,
) -> DateTime<Utc> {
    let days = water_frequency_days
        .filter(|d| *d > 0)
        .unwrap_or(DEFAULT_WATER_FREQUENCY_DAYS);
    last_watered + Duration::days(i64::from(days))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn species_requires_name_and_positive_frequency() {
        let errors = SpeciesInput::from_json(&json!({"water_frequency": 0})).unwrap_err();
        assert!(errors.contains("name"));
        assert!(errors.contains("water_frequency"));

        let ok = SpeciesInput::from_json(&json!({
            "name": "Monstera",
            "water_frequency": "10",
            "light_requirements": "Bright indirect",
            "humidity_level": ""
        }))
        .unwrap();
        assert_eq!(ok.water_frequency, Some(10));
        assert_eq!(ok.humidity_level, None);
        assert_eq!(ok.light_requirements.as_deref(), Some("Bright indirect"));
    }

    #[test]
    fn species_rejects_absurd_frequency() {
        let errors =
            SpeciesInput::from_json(&json!({"name": "Cactus", "water_frequency": 4000})).unwrap_err();
        assert!(errors.contains("water_frequency"));
    }

    #[test]
    fn plant_input_accepts_care_alias_for_species() {
        let input = PlantInput::from_json(&json!({"name": "paprika", "care": 4})).unwrap();
        assert_eq!(input.species_id, Some(4));
        assert_eq!(input.description, None);
    }

    #[test]
    fn plant_input_rejects_bad_url_and_timestamp() {
        let errors = PlantInput::from_json(&json!({
            "name": "Basil",
            "image_url": "not a url",
            "last_watered": "yesterday"
        }))
        .unwrap_err();
        assert!(errors.contains("image_url"));
        assert!(errors.contains("last_watered"));
    }

    #[test]
    fn watering_input_orders_timestamps() {
        let errors = WateringInput::from_json(&json!({
            "plant": 1,
            "last_watered": "2025-05-10T00:00:00Z",
            "next_watering_due": "2025-05-01T00:00:00Z"
        }))
        .unwrap_err();
        assert!(errors.contains("next_watering_due"));

        let ok = WateringInput::from_json(&json!({"plant_id": 2})).unwrap();
        assert_eq!(ok.plant_id, 2);
        assert!(!ok.is_watered);
        assert!(ok.last_watered.is_none());
    }

    #[test]
    fn next_due_uses_species_frequency_or_default() {
        let t = crate::dto::parse_datetime("2025-05-01T09:00:00Z").unwrap();
        assert_eq!(
            next_watering_due(t, Some(3)).to_rfc3339(),
            "2025-05-04T09:00:00+00:00"
        );
        assert_eq!(
            next_watering_due(t, None).to_rfc3339(),
            "2025-05-08T09:00:00+00:00"
        );
        assert_eq!(next_watering_due(t, Some(0)), next_watering_due(t, None));
    }
}
