//! Weather Integration
//!
//! Abstractions and implementations for current-conditions lookups.

mod mock;
mod wttr;

pub use mock::MockWeatherClient;
pub use wttr::WttrClient;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Weather client trait (Strategy pattern)
#[async_trait]
pub trait WeatherClient: Send + Sync {
    /// Current conditions for a city, as reported by the service
    async fn current(&self, city: &str) -> Result<Value>;

    /// Check if the service is available
    async fn health_check(&self) -> bool;

    /// Service name
    fn name(&self) -> &str;
}
