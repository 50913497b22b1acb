//! ============================================================================
//! Weather Client - WeatherAPI.com current conditions, gated on access
//! ============================================================================
//! Refuses to call out unless the supplied AccessState is Active.
//! ============================================================================

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::access::AccessState;
use crate::config::AccessConfig;
use crate::types::{AccessError, CurrentWeather};

/// WeatherAPI.com v1 base URL
pub const WEATHER_API_BASE: &str = "https://api.weatherapi.com/v1";

/// Placeholder shipped in sample env files
const PLACEHOLDER_API_KEY: &str = "your-weather-api-key";

const MISSING_KEY_MESSAGE: &str = "Please configure your WeatherAPI.com API key";

const INVALID_KEY_MESSAGE: &str = "Invalid WeatherAPI.com API key";

/// Client for current weather conditions
pub struct WeatherClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl WeatherClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(api_key, WEATHER_API_BASE)
    }

    /// Create against a different provider endpoint
    pub fn with_base_url(api_key: Option<String>, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &AccessConfig) -> Self {
        Self::new(config.weather_api_key.clone())
    }

    /// Usable API key, if one is configured
    fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && *key != PLACEHOLDER_API_KEY)
    }

    /// Current conditions for `city`, only while `access` is Active
    pub async fn current(&self, access: &AccessState, city: &str) -> Result<CurrentWeather, AccessError> {
        if !access.is_active() {
            debug!("Weather fetch refused: access is {}", access.status.display_name());
            return Err(AccessError::NotSubscribed);
        }

        let api_key = self
            .api_key()
            .ok_or_else(|| AccessError::Configuration(MISSING_KEY_MESSAGE.into()))?;

        let city = city.trim();
        if city.is_empty() {
            return Err(AccessError::Configuration("No city given".into()));
        }

        info!("Fetching current weather for {}", city);

        let response = self
            .client
            .get(format!("{}/current.json", self.base_url))
            .query(&[("key", api_key), ("q", city), ("aqi", "no")])
            .send()
            .await
            .map_err(|e| AccessError::Transport(format!("Failed to fetch weather: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AccessError::Transport(format!("Failed to read weather response: {}", e)))?;

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            warn!("Weather API refused the configured key ({})", status);
            return Err(AccessError::Configuration(INVALID_KEY_MESSAGE.into()));
        }

        if !status.is_success() {
            return Err(AccessError::Transport(format!(
                "Weather API error {}: {}",
                status, body
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            AccessError::Transport(format!("Failed to parse weather response: {}", e))
        })
    }
}
