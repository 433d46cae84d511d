//! Perenual species search: `GET {base}/species-list?key=&q=`.

use super::PlantInfoProvider;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

pub struct PerenualClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl PerenualClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        PerenualClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

/// GET `url` with `query` and decode the JSON body. The query carries the
/// API key, so every error is stripped of the request URL before it can
/// reach a log line or the `api_usage` table.
pub(super) async fn get_json(
    http: &reqwest::Client,
    url: &str,
    query: &[(&str, &str)],
) -> Result<Value> {
    let body = http
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(reqwest::Error::without_url)?
        .error_for_status()
        .map_err(reqwest::Error::without_url)?
        .json()
        .await
        .map_err(reqwest::Error::without_url)?;
    Ok(body)
}

/// The `data` array of a Perenual or Trefle search response.
pub(super) fn data_array(body: Value) -> Vec<Value> {
    match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[async_trait]
impl PlantInfoProvider for PerenualClient {
    fn name(&self) -> &'static str {
        "Perenual"
    }

    fn endpoint(&self, plant_name: &str) -> String {
        format!("species-list?q={}", plant_name)
    }

    async fn search(&self, plant_name: &str) -> Result<Vec<Value>> {
        let body = get_json(
            &self.http,
            &format!("{}/species-list", self.base_url),
            &[("key", self.api_key.as_str()), ("q", plant_name)],
        )
        .await?;
        Ok(data_array(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers every connection with a bare HTTP 500.
    async fn failing_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 500 Internal Server Error\r\n\
                          Content-Length: 0\r\nConnection: close\r\n\r\n",
                    )
                    .await;
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn search_errors_do_not_leak_the_api_key() {
        let base = failing_server().await;
        let client = PerenualClient::new(reqwest::Client::new(), &base, "SUPERSECRETKEY");
        let message = client.search("basil").await.unwrap_err().to_string();
        assert!(message.contains("500"), "{}", message);
        assert!(!message.contains("SUPERSECRETKEY"), "{}", message);
        assert!(!message.contains("species-list"), "{}", message);

        let trefle = super::super::trefle::TrefleClient::new(
            reqwest::Client::new(),
            &base,
            "TREFLETOKEN",
        );
        let message = trefle.search("basil").await.unwrap_err().to_string();
        assert!(!message.contains("TREFLETOKEN"), "{}", message);
    }

    #[test]
    fn data_array_extracts_records() {
        let body = json!({"data": [{"id": 1}, {"id": 2}], "total": 2});
        assert_eq!(data_array(body).len(), 2);
        assert!(data_array(json!({"message": "rate limited"})).is_empty());
        assert!(data_array(json!({"data": "nope"})).is_empty());
        assert!(data_array(json!([1, 2])).is_empty());
    }

    #[test]
    fn endpoint_omits_credentials() {
        let client = PerenualClient::new(reqwest::Client::new(), "https://perenual.com/api/", "secret");
        assert_eq!(client.endpoint("basil"), "species-list?q=basil");
        assert_eq!(client.base_url, "https://perenual.com/api");
    }
}
