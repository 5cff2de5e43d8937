use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Endpoints, credentials and request settings for the map and geocoding services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapSearchConfig {
    /// Geocoder endpoint (address text or "lon,lat" in, places out)
    pub geocoder_url: String,
    /// Static map endpoint
    pub static_map_url: String,
    /// Organization search endpoint
    pub search_url: String,
    /// API key sent to the geocoder
    pub geocoder_api_key: Option<String>,
    /// API key sent to the organization search
    pub search_api_key: Option<String>,
    /// Static map API key, if the provider requires one
    pub static_map_api_key: Option<String>,
    /// Response language, e.g. "en_US" or "ru_RU"
    pub lang: String,
    /// Width of the rendered map in pixels
    pub map_width: u32,
    /// Height of the rendered map in pixels
    pub map_height: u32,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for MapSearchConfig {
    fn default() -> Self {
        Self {
            geocoder_url: "https://geocode-maps.yandex.ru/1.x/".to_string(),
            static_map_url: "https://static-maps.yandex.ru/1.x/".to_string(),
            search_url: "https://search-maps.yandex.ru/v1/".to_string(),
            geocoder_api_key: None,
            search_api_key: None,
            static_map_api_key: None,
            lang: "en_US".to_string(),
            map_width: 600,
            map_height: 450,
            timeout_secs: 10,
        }
    }
}

impl MapSearchConfig {
    /// Load configuration from a JSON file; absent fields keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: MapSearchConfig = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply MAPSEARCH_* environment variables on top of this configuration
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("MAPSEARCH_GEOCODER_API_KEY") {
            self.geocoder_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("MAPSEARCH_SEARCH_API_KEY") {
            self.search_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("MAPSEARCH_STATIC_MAP_API_KEY") {
            self.static_map_api_key = Some(key);
        }
        if let Ok(lang) = std::env::var("MAPSEARCH_LANG") {
            self.lang = lang;
        }
        self
    }

    /// Static maps are limited to 650x450 pixels
    pub fn validate(&self) -> Result<()> {
        if self.map_width == 0 || self.map_width > 650 {
            anyhow::bail!("map_width must be between 1 and 650, got {}", self.map_width);
        }
        if self.map_height == 0 || self.map_height > 450 {
            anyhow::bail!("map_height must be between 1 and 450, got {}", self.map_height);
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be positive");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Build the blocking HTTP client shared by the service collaborators
    pub(crate) fn http_client(&self) -> Result<reqwest::blocking::Client> {
        let user_agent = format!(
            "Mapsearch/{} (https://github.com/mapsearch/mapsearch)",
            env!("CARGO_PKG_VERSION")
        );

        reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(self.timeout())
            .build()
            .context("Failed to build HTTP client")
    }
}
