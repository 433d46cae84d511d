//! Trefle plant search: `GET {base}/plants/search?token=&q=`.

use super::perenual::{data_array, get_json};
use super::PlantInfoProvider;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

pub struct TrefleClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl TrefleClient {
    pub fn new(http: reqwest::Client, base_url: &str, token: &str) -> Self {
        TrefleClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }
}

#[async_trait]
impl PlantInfoProvider for TrefleClient {
    fn name(&self) -> &'static str {
        "Trefle"
    }

    fn endpoint(&self, plant_name: &str) -> String {
        format!("plants/search?q={}", plant_name)
    }

    async fn search(&self, plant_name: &str) -> Result<Vec<Value>> {
        let body = get_json(
            &self.http,
            &format!("{}/plants/search", self.base_url),
            &[("token", self.token.as_str()), ("q", plant_name)],
        )
        .await?;
        Ok(data_array(body))
    }
}
