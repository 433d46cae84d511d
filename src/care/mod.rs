//! # Care: External Plant Data and Care-Text Generation
//!
//! Two kinds of collaborator sit behind traits so handlers and tests never
//! depend on a concrete HTTP client:
//!
//! - [`PlantInfoProvider`]: species search against a plant database
//!   ([`perenual::PerenualClient`], [`trefle::TrefleClient`]).
//! - [`CareTextGenerator`]: turns a plant name plus whatever the providers
//!   returned into a structured [`CareSummary`] ([`openai::OpenAiGenerator`]).
//!
//! [`CareService`] wraps both. Each outbound call is made once, timed, logged
//! as an `api_usage` row and counted in Prometheus. Failures are logged and
//! swallowed: a provider error becomes an empty result, a generator error
//! becomes `Err(message)` for the caller to degrade on.

pub mod openai;
pub mod perenual;
pub mod trefle;

use crate::config::{ExternalConfig, Secrets};
use crate::db::{ApiUsageRecord, Database, PlantRow};
use crate::dto::{PlantView, SpeciesInput, DEFAULT_WATER_FREQUENCY_DAYS};
use crate::prom_metrics::Metrics;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Structured care text as produced by the generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CareSummary {
    #[serde(default)]
    pub plant_name: String,
    #[serde(default)]
    pub scientific_name: Option<String>,
    #[serde(default)]
    pub watering_needs: Option<String>,
    #[serde(default)]
    pub light_needs: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "lenient_tips")]
    pub tips: Vec<String>,
    /// Suggested days between waterings.
    #[serde(default, deserialize_with = "lenient_days")]
    pub watering_days: Option<i32>,
}

fn lenient_tips<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s],
        _ => Vec::new(),
    })
}

fn lenient_days<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i32>, D::Error> {
    let days = match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64().map(|f| f.round() as i64),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    Ok(days.and_then(|d| i32::try_from(d).ok()))
}

/// First result of each provider, keyed `<provider>_data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PlantInfo(BTreeMap<String, Vec<Value>>);

impl PlantInfo {
    pub fn insert(&mut self, provider: &str, first: Option<Value>) {
        self.0.insert(
            format!("{}_data", provider.to_ascii_lowercase()),
            first.into_iter().collect(),
        );
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    /// First scientific name found in any provider result. Perenual returns
    /// a list, Trefle a plain string.
    pub fn scientific_name(&self) -> Option<String> {
        self.0.values().flatten().find_map(|record| match record.get("scientific_name")? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Array(names) => names
                .iter()
                .filter_map(Value::as_str)
                .find(|s| !s.trim().is_empty())
                .map(|s| s.trim().to_string()),
            _ => None,
        })
    }
}

#[async_trait]
pub trait PlantInfoProvider: Send + Sync {
    /// Name recorded in `api_usage.api_name`.
    fn name(&self) -> &'static str;
    /// Endpoint recorded in `api_usage.endpoint`, without credentials.
    fn endpoint(&self, plant_name: &str) -> String;
    async fn search(&self, plant_name: &str) -> Result<Vec<Value>>;
}

#[async_trait]
pub trait CareTextGenerator: Send + Sync {
    fn name(&self) -> &'static str;
    fn endpoint(&self) -> String;
    async fn generate(&self, plant_name: &str, info: &PlantInfo) -> Result<CareSummary>;
}

/// Shared HTTP client for every outbound adapter.
pub fn http_client(config: &ExternalConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(concat!("plantkeeper/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

pub struct CareService {
    providers: Vec<Arc<dyn PlantInfoProvider>>,
    generator: Arc<dyn CareTextGenerator>,
    metrics: Arc<Metrics>,
}

impl CareService {
    pub fn new(
        providers: Vec<Arc<dyn PlantInfoProvider>>,
        generator: Arc<dyn CareTextGenerator>,
        metrics: Arc<Metrics>,
    ) -> Self {
        CareService {
            providers,
            generator,
            metrics,
        }
    }

    /// Perenual + Trefle + OpenAI over one shared client.
    pub fn from_config(
        config: &ExternalConfig,
        secrets: &Secrets,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let http = http_client(config)?;
        if secrets.openai_api_key.is_empty() {
            warn!("OPENAI_API_KEY not set; care text generation will fail");
        }
        let providers: Vec<Arc<dyn PlantInfoProvider>> = vec![
            Arc::new(perenual::PerenualClient::new(
                http.clone(),
                &config.perenual_base_url,
                &secrets.perenual_api_key,
            )),
            Arc::new(trefle::TrefleClient::new(
                http.clone(),
                &config.trefle_base_url,
                &secrets.trefle_api_key,
            )),
        ];
        let generator = Arc::new(openai::OpenAiGenerator::new(
            http,
            &config.openai_base_url,
            &secrets.openai_api_key,
            &config.openai_model,
        ));
        Ok(Self::new(providers, generator, metrics))
    }

    async fn record_usage(
        &self,
        db: &Database,
        api: &str,
        endpoint: String,
        started: Instant,
        error: Option<String>,
    ) {
        let elapsed_ms = started.elapsed().as_millis().min(i32::MAX as u128) as i32;
        let success = error.is_none();
        self.metrics.record_external_call(api, success);
        match &error {
            None => info!(api, endpoint = %endpoint, elapsed_ms, "external call succeeded"),
            Some(e) => warn!(api, endpoint = %endpoint, elapsed_ms, error = %e, "external call failed"),
        }
        let record = ApiUsageRecord {
            api_name: api.to_string(),
            endpoint,
            response_time_ms: elapsed_ms,
            success,
            error_message: error,
        };
        if let Err(e) = db.insert_api_usage(&record).await {
            warn!(api, error = %e, "failed to record api usage");
        }
    }

    /// Query every provider once and keep the first result of each.
    pub async fn lookup(&self, db: &Database, plant_name: &str) -> PlantInfo {
        let mut info = PlantInfo::default();
        for provider in &self.providers {
            let started = Instant::now();
            let result = provider.search(plant_name).await;
            let endpoint = provider.endpoint(plant_name);
            match result {
                Ok(records) => {
                    self.record_usage(db, provider.name(), endpoint, started, None)
                        .await;
                    info.insert(provider.name(), records.into_iter().next());
                }
                Err(e) => {
                    self.record_usage(db, provider.name(), endpoint, started, Some(e.to_string()))
                        .await;
                    info.insert(provider.name(), None);
                }
            }
        }
        info
    }

    /// Run the generator once. The error string is the failure message.
    pub async fn summarize(
        &self,
        db: &Database,
        plant_name: &str,
        info: &PlantInfo,
    ) -> Result<CareSummary, String> {
        let started = Instant::now();
        let result = self.generator.generate(plant_name, info).await;
        let endpoint = self.generator.endpoint();
        match result {
            Ok(mut summary) => {
                self.record_usage(db, self.generator.name(), endpoint, started, None)
                    .await;
                if summary.plant_name.trim().is_empty() {
                    summary.plant_name = plant_name.to_string();
                }
                Ok(summary)
            }
            Err(e) => {
                let message = e.to_string();
                self.record_usage(db, self.generator.name(), endpoint, started, Some(message.clone()))
                    .await;
                Err(message)
            }
        }
    }

    /// Provider lookup followed by generation.
    pub async fn generate(
        &self,
        db: &Database,
        plant_name: &str,
    ) -> Result<(CareSummary, PlantInfo), String> {
        let info = self.lookup(db, plant_name).await;
        let summary = self.summarize(db, plant_name, &info).await?;
        Ok((summary, info))
    }

    /// Attach species care data to a plant, creating the species on first
    /// read. An existing species with the same name (any case) is reused
    /// before anything is generated. Collaborator failures leave the plant
    /// without care data; database errors propagate.
    pub async fn fill_care(&self, db: &Database, plant: PlantRow) -> Result<PlantView> {
        if let Some(species_id) = plant.species_id {
            let care = db.get_species(species_id).await?;
            return Ok(PlantView::new(plant, care));
        }

        let (species, description) = match db.find_species_by_name(&plant.name).await? {
            Some(existing) => (existing, None),
            None => match self.generate(db, &plant.name).await {
                Ok((summary, info)) => {
                    let input = species_from_summary(&plant.name, &summary, &info);
                    (db.insert_species(&input).await?, summary.summary)
                }
                Err(message) => {
                    warn!(plant_id = plant.id, error = %message, "care generation failed");
                    return Ok(PlantView::new(plant, None));
                }
            },
        };

        let linked = db
            .link_species(plant.id, species.id, description.as_deref())
            .await?
            .unwrap_or(plant);
        Ok(PlantView::new(linked, Some(species)))
    }

    /// Fill blank `light_requirements` and `care_summary` from generated text
    /// and default the watering interval. Leaves the input unchanged when
    /// generation fails.
    pub async fn autofill_species(&self, db: &Database, input: &mut SpeciesInput) {
        if input.water_frequency.is_none() {
            input.water_frequency = Some(DEFAULT_WATER_FREQUENCY_DAYS);
        }
        if input.light_requirements.is_some() && input.care_summary.is_some() {
            return;
        }
        let summary = match self.generate(db, &input.name).await {
            Ok((summary, _)) => summary,
            Err(message) => {
                warn!(species = %input.name, error = %message, "species autofill failed");
                return;
            }
        };
        if input.light_requirements.is_none() {
            input.light_requirements = summary.light_needs.as_deref().map(|s| truncate(s, 100));
        }
        if input.care_summary.is_none() {
            input.care_summary = summary.summary.clone();
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.trim().chars().take(max_chars).collect()
}

/// Species row to persist for a generated summary.
pub fn species_from_summary(name: &str, summary: &CareSummary, info: &PlantInfo) -> SpeciesInput {
    let scientific_name = summary
        .scientific_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| truncate(s, 255))
        .or_else(|| info.scientific_name());
    let water_frequency = summary
        .watering_days
        .filter(|d| (1..=365).contains(d))
        .unwrap_or(DEFAULT_WATER_FREQUENCY_DAYS);
    SpeciesInput {
        name: truncate(name, 255),
        scientific_name,
        water_frequency: Some(water_frequency),
        light_requirements: summary.light_needs.as_deref().map(|s| truncate(s, 100)),
        care_summary: Some(compose_care_text(summary)).filter(|s| !s.is_empty()),
        ..SpeciesInput::default()
    }
}

/// Flatten a summary into the free-text `care_summary` column.
pub fn compose_care_text(summary: &CareSummary) -> String {
    let mut sections = Vec::new();
    if let Some(s) = summary.summary.as_deref().filter(|s| !s.trim().is_empty()) {
        sections.push(s.trim().to_string());
    }
    let mut needs = Vec::new();
    if let Some(w) = summary.watering_needs.as_deref().filter(|s| !s.trim().is_empty()) {
        needs.push(format!("Watering: {}", w.trim()));
    }
    if let Some(l) = summary.light_needs.as_deref().filter(|s| !s.trim().is_empty()) {
        needs.push(format!("Light: {}", l.trim()));
    }
    if !needs.is_empty() {
        sections.push(needs.join("\n"));
    }
    if !summary.tips.is_empty() {
        let tips: Vec<String> = summary.tips.iter().map(|t| format!("- {}", t.trim())).collect();
        sections.push(format!("Tips:\n{}", tips.join("\n")));
    }
    sections.join("\n\n")
}
