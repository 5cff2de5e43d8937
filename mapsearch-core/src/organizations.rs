use crate::config::MapSearchConfig;
use crate::geo::{Envelope, LonLat};
use crate::place::Organization;
use anyhow::{Context, Result};
use serde::Deserialize;

/// Finds a business near a point
pub trait OrganizationSearch: Send {
    /// Look for an organization matching `name_hint` within `span` (lon, lat degrees) of `point`
    fn search(&self, point: LonLat, name_hint: &str, span: LonLat) -> Result<Option<Organization>>;
}

/// Organization search API response structure
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Geometry,
    properties: Properties,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    coordinates: [f64; 2],
}

#[derive(Debug, Deserialize)]
struct Properties {
    #[serde(rename = "boundedBy")]
    bounded_by: [[f64; 2]; 2],
    #[serde(rename = "CompanyMetaData")]
    company: Option<CompanyMetaData>,
}

#[derive(Debug, Deserialize)]
struct CompanyMetaData {
    name: String,
    #[serde(default)]
    address: String,
}

/// First organization in a search JSON body; features without company data are skipped
fn parse_search_response(body: &str) -> Result<Option<Organization>> {
    let data: SearchResponse =
        serde_json::from_str(body).context("Failed to parse organization search response")?;

    Ok(data.features.into_iter().find_map(|feature| {
        let company = feature.properties.company?;
        let [lower, upper] = feature.properties.bounded_by;
        let [lon, lat] = feature.geometry.coordinates;
        Some(Organization {
            name: company.name,
            address: company.address,
            coordinates: LonLat::new(lon, lat),
            envelope: Envelope::new(
                LonLat::new(lower[0], lower[1]),
                LonLat::new(upper[0], upper[1]),
            ),
        })
    }))
}

/// Organization search backed by the HTTP search API
pub struct HttpOrganizationSearch {
    client: reqwest::blocking::Client,
    url: String,
    api_key: Option<String>,
    lang: String,
}

impl HttpOrganizationSearch {
    pub fn new(config: &MapSearchConfig) -> Result<Self> {
        Ok(Self {
            client: config.http_client()?,
            url: config.search_url.clone(),
            api_key: config.search_api_key.clone(),
            lang: config.lang.clone(),
        })
    }
}

impl OrganizationSearch for HttpOrganizationSearch {
    fn search(&self, point: LonLat, name_hint: &str, span: LonLat) -> Result<Option<Organization>> {
        let mut params: Vec<(&str, String)> = vec![
            ("text", name_hint.to_string()),
            ("ll", point.to_string()),
            ("spn", span.to_string()),
            ("type", "biz".to_string()),
            ("results", "1".to_string()),
            ("lang", self.lang.clone()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("apikey", key.clone()));
        }

        log::debug!("Searching organizations near {} ({})", point, name_hint);

        let response = self
            .client
            .get(&self.url)
            .query(&params)
            .send()
            .context("Failed to send organization search request")?;

        if !response.status().is_success() {
            anyhow::bail!("Organization search API returned status: {}", response.status());
        }

        let body = response
            .text()
            .context("Failed to read organization search response")?;
        parse_search_response(&body)
    }
}
