//! Mock Weather Client
//!
//! For testing and demo purposes. Returns static readings in wttr.in's
//! `current_condition` shape.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::WeatherClient;
use crate::error::{Result, ToolkitError};

/// Mock weather client with static readings
#[derive(Default)]
pub struct MockWeatherClient;

impl MockWeatherClient {
    pub fn new() -> Self {
        Self
    }

    /// (temp °C, feels like °C, humidity %, description)
    fn reading(city: &str) -> Option<(i32, i32, u8, &'static str)> {
        match city.trim().to_lowercase().as_str() {
            "goa" => Some((31, 36, 74, "Partly cloudy")),
            "london" => Some((12, 10, 81, "Light rain")),
            "paris" => Some((16, 16, 63, "Sunny")),
            "new york" => Some((20, 20, 55, "Clear")),
            "tokyo" => Some((24, 26, 68, "Overcast")),
            "mumbai" => Some((30, 35, 79, "Haze")),
            _ => None,
        }
    }
}

#[async_trait]
impl WeatherClient for MockWeatherClient {
    async fn current(&self, city: &str) -> Result<Value> {
        let (temp, feels_like, humidity, desc) =
            Self::reading(city).ok_or_else(|| ToolkitError::CityNotFound(city.to_string()))?;

        Ok(json!({
            "temp_C": temp.to_string(),
            "FeelsLikeC": feels_like.to_string(),
            "humidity": humidity.to_string(),
            "weatherDesc": [{ "value": desc }],
        }))
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "MockWeather"
    }
}
