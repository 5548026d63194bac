//! Weather Lookup Tool
//!
//! Fetches current conditions for one city.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use turn_core::{Result as CoreResult, ToolContext, ToolSchema, TypedTool, tool::ParameterSchema};

use crate::weather::WeatherClient;

#[derive(Debug, Deserialize)]
pub struct WeatherArgs {
    pub city: String,
}

/// Tool for looking up current weather
pub struct GetWeatherTool {
    client: Arc<dyn WeatherClient>,
}

impl GetWeatherTool {
    pub fn new(client: Arc<dyn WeatherClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TypedTool for GetWeatherTool {
    type Args = WeatherArgs;
    type Output = Value;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_weather".into(),
            description: "Retrieve live weather for a city".into(),
            parameters: vec![ParameterSchema::new("city", "string", "City name").required()],
            category: Some("weather".into()),
            has_side_effects: false,
        }
    }

    async fn call(&self, args: WeatherArgs, _ctx: &ToolContext) -> CoreResult<Value> {
        self.client
            .current(&args.city)
            .await
            .map_err(|e| e.into_agent_error("get_weather"))
    }
}
