use crate::config::MapSearchConfig;
use crate::geo::LonLat;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Map layer shown by the static map service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapStyle {
    #[default]
    Roadmap,
    Satellite,
    Hybrid,
}

impl MapStyle {
    pub const ALL: [MapStyle; 3] = [MapStyle::Roadmap, MapStyle::Satellite, MapStyle::Hybrid];

    /// Value of the `l` request parameter
    pub fn layer_param(self) -> &'static str {
        match self {
            MapStyle::Roadmap => "map",
            MapStyle::Satellite => "sat",
            MapStyle::Hybrid => "sat,skl",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MapStyle::Roadmap => "Map",
            MapStyle::Satellite => "Satellite",
            MapStyle::Hybrid => "Hybrid",
        }
    }
}

impl fmt::Display for MapStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MapStyle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "map" | "roadmap" => Ok(MapStyle::Roadmap),
            "sat" | "satellite" => Ok(MapStyle::Satellite),
            "hybrid" | "sat,skl" => Ok(MapStyle::Hybrid),
            other => anyhow::bail!("Unknown map style '{}' (expected map, sat or hybrid)", other),
        }
    }
}

/// Everything the static map service needs to draw one frame
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub center: LonLat,
    pub zoom: u8,
    pub style: MapStyle,
    /// Where to put the place pin, if it is shown
    pub marker: Option<LonLat>,
}

/// Produces raster map images.
///
/// `Ok(None)` means the service declined to draw the requested view.
pub trait TileRenderer: Send {
    fn render(&self, request: &RenderRequest) -> Result<Option<Vec<u8>>>;
}

/// Renderer backed by the HTTP static map API
pub struct HttpTileRenderer {
    client: reqwest::blocking::Client,
    url: String,
    api_key: Option<String>,
    size: (u32, u32),
    lang: String,
}

impl HttpTileRenderer {
    pub fn new(config: &MapSearchConfig) -> Result<Self> {
        Ok(Self {
            client: config.http_client()?,
            url: config.static_map_url.clone(),
            api_key: config.static_map_api_key.clone(),
            size: (config.map_width, config.map_height),
            lang: config.lang.clone(),
        })
    }

    fn params(&self, request: &RenderRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("ll", request.center.to_string()),
            ("l", request.style.layer_param().to_string()),
            ("z", request.zoom.to_string()),
            ("size", format!("{},{}", self.size.0, self.size.1)),
            ("lang", self.lang.clone()),
        ];
        if let Some(marker) = request.marker {
            params.push(("pt", format!("{},pm2rdm", marker)));
        }
        if let Some(key) = &self.api_key {
            params.push(("apikey", key.clone()));
        }
        params
    }
}

impl TileRenderer for HttpTileRenderer {
    fn render(&self, request: &RenderRequest) -> Result<Option<Vec<u8>>> {
        log::debug!(
            "Rendering {} map at {} z{}",
            request.style,
            request.center,
            request.zoom
        );

        let response = self
            .client
            .get(&self.url)
            .query(&self.params(request))
            .send()
            .context("Failed to send static map request")?;

        if !response.status().is_success() {
            log::debug!("Static map API returned status: {}", response.status());
            return Ok(None);
        }

        let bytes = response
            .bytes()
            .context("Failed to read static map image")?;
        Ok(Some(bytes.to_vec()))
    }
}
