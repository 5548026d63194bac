//! wttr.in Client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::{Value, json};

use super::WeatherClient;
use crate::error::{Result, ToolkitError};

pub const DEFAULT_WTTR_URL: &str = "https://wttr.in";

/// Weather client backed by wttr.in's JSON format
pub struct WttrClient {
    client: reqwest::Client,
    base_url: Url,
}

impl WttrClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_WTTR_URL)
    }

    pub fn with_base_url(base_url: impl AsRef<str>) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())
            .map_err(|e| ToolkitError::Config(format!("Invalid weather URL {}: {}", base_url.as_ref(), e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ToolkitError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
        })
    }

    /// City becomes a single percent-encoded path segment
    fn url(&self, city: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ToolkitError::Config(format!("{} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .push(city.trim());
        Ok(url)
    }
}

/// First entry of `current_condition`, or an empty object
pub(crate) fn current_condition(body: &Value) -> Value {
    body.get("current_condition")
        .and_then(|c| c.get(0))
        .cloned()
        .unwrap_or_else(|| json!({}))
}

#[async_trait]
impl WeatherClient for WttrClient {
    async fn current(&self, city: &str) -> Result<Value> {
        tracing::debug!(city, "Fetching weather");

        let response = self
            .client
            .get(self.url(city)?)
            .query(&[("format", "j1")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(city, status = status.as_u16(), "Weather lookup failed");
            return Err(ToolkitError::Weather(format!("HTTP {} for {}", status.as_u16(), city)));
        }

        let body: Value = response.json().await?;
        Ok(current_condition(&body))
    }

    async fn health_check(&self) -> bool {
        match self.client.get(self.base_url.clone()).send().await {
            Ok(r) => r.status().is_success(),
            Err(e) => {
                tracing::warn!("wttr.in health check failed: {}", e);
                false
            }
        }
    }

    fn name(&self) -> &str {
        "wttr.in"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url() {
        let client = WttrClient::with_base_url("https://wttr.in/").unwrap();
        assert_eq!(client.url(" Goa ").unwrap().as_str(), "https://wttr.in/Goa");
    }

    #[test]
    fn test_city_is_one_encoded_segment() {
        let client = WttrClient::new().unwrap();
        assert_eq!(
            client.url("a/b?format=1#x").unwrap().as_str(),
            "https://wttr.in/a%2Fb%3Fformat=1%23x"
        );
        assert_eq!(client.url("São Paulo").unwrap().as_str(), "https://wttr.in/S%C3%A3o%20Paulo");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(matches!(WttrClient::with_base_url("not a url"), Err(ToolkitError::Config(_))));
    }

    #[test]
    fn test_current_condition_extraction() {
        let body = json!({
            "current_condition": [{"temp_C": "31", "weatherDesc": [{"value": "Sunny"}]}],
            "weather": []
        });
        assert_eq!(current_condition(&body)["temp_C"], "31");
        assert_eq!(current_condition(&json!({})), json!({}));
    }
}
