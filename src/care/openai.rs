//! OpenAI chat-completions generator. Asks for a JSON object response and
//! parses the message content as a [`CareSummary`].

use super::{CareSummary, CareTextGenerator, PlantInfo};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

const SYSTEM_PROMPT: &str = "You're a plant care expert assistant.";
const TEMPERATURE: f64 = 0.7;

pub struct OpenAiGenerator {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiGenerator {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str, model: &str) -> Self {
        OpenAiGenerator {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    fn request_body(&self, plant_name: &str, info: &PlantInfo) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_prompt(plant_name, info)},
            ],
            "temperature": TEMPERATURE,
            "response_format": {"type": "json_object"},
        })
    }
}

/// User prompt for one plant. Provider data is embedded as pretty JSON.
pub fn build_prompt(plant_name: &str, info: &PlantInfo) -> String {
    let info_text = if info.is_empty() {
        "No specific plant information available.".to_string()
    } else {
        serde_json::to_string_pretty(info)
            .unwrap_or_else(|_| "No specific plant information available.".to_string())
    };
    format!(
        "You are a plant care expert assistant. Create a care summary for a {plant_name} plant.\n\
         If available, use this information: {info_text}\n\n\
         Format your response as a JSON object with these fields:\n\
         {{\n  \
           \"plant_name\": \"Common name of the plant\",\n  \
           \"scientific_name\": \"Scientific name if available\",\n  \
           \"watering_needs\": \"Brief description of watering frequency and amount\",\n  \
           \"watering_days\": 7 (typical number of days between waterings, integer),\n  \
           \"light_needs\": \"Brief description of light requirements\",\n  \
           \"summary\": \"A brief 2-3 sentence overview of general care\",\n  \
           \"tips\": [\"Tip 1\", \"Tip 2\", \"Tip 3\"] (list of 3-5 important care tips)\n\
         }}\n\n\
         Keep the response concise and practical for casual plant owners."
    )
}

/// Pull the summary out of a chat-completions response body.
pub fn parse_completion(body: &str) -> Result<CareSummary> {
    let response: ChatResponse = serde_json::from_str(body)?;
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| anyhow!("completion contained no message content"))?;
    let summary = serde_json::from_str(&content)?;
    Ok(summary)
}

#[async_trait]
impl CareTextGenerator for OpenAiGenerator {
    fn name(&self) -> &'static str {
        "OpenAI"
    }

    fn endpoint(&self) -> String {
        "chat/completions".to_string()
    }

    async fn generate(&self, plant_name: &str, info: &PlantInfo) -> Result<CareSummary> {
        let body = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(plant_name, info))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_completion(&body)
    }
}
