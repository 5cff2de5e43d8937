use crate::config::MapSearchConfig;
use crate::geo::{Envelope, LonLat};
use crate::place::Place;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::Deserialize;

/// What to geocode: free text, or a point for reverse geocoding
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeQuery {
    Address(String),
    Point(LonLat),
}

impl GeocodeQuery {
    /// Value of the `geocode` request parameter
    fn as_param(&self) -> String {
        match self {
            GeocodeQuery::Address(text) => text.trim().to_string(),
            GeocodeQuery::Point(point) => point.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeocodeOptions {
    /// Ask for the single nearest result only
    pub nearest_only: bool,
}

/// Address/coordinate lookup.
///
/// `Ok(None)` means the service answered but found nothing; `Err` means the
/// service could not be asked (network failure, rejected credentials).
pub trait Geocoder: Send {
    fn geocode(&self, query: &GeocodeQuery, options: &GeocodeOptions) -> Result<Option<Place>>;
}

/// Geocoder API response structure
#[derive(Debug, Deserialize)]
struct GeocoderResponse {
    response: ResponseBody,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    #[serde(rename = "GeoObjectCollection")]
    collection: GeoObjectCollection,
}

#[derive(Debug, Deserialize)]
struct GeoObjectCollection {
    #[serde(rename = "featureMember", default)]
    members: Vec<FeatureMember>,
}

#[derive(Debug, Deserialize)]
struct FeatureMember {
    #[serde(rename = "GeoObject")]
    geo_object: GeoObject,
}

#[derive(Debug, Deserialize)]
struct GeoObject {
    #[serde(rename = "Point")]
    point: PointPos,
    #[serde(rename = "boundedBy")]
    bounded_by: BoundedBy,
    #[serde(rename = "metaDataProperty")]
    meta: MetaDataProperty,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PointPos {
    pos: String,
}

#[derive(Debug, Deserialize)]
struct BoundedBy {
    #[serde(rename = "Envelope")]
    envelope: EnvelopeCorners,
}

#[derive(Debug, Deserialize)]
struct EnvelopeCorners {
    #[serde(rename = "lowerCorner")]
    lower_corner: String,
    #[serde(rename = "upperCorner")]
    upper_corner: String,
}

#[derive(Debug, Deserialize)]
struct MetaDataProperty {
    #[serde(rename = "GeocoderMetaData")]
    geocoder: GeocoderMetaData,
}

#[derive(Debug, Deserialize)]
struct GeocoderMetaData {
    #[serde(default)]
    text: Option<String>,
    #[serde(rename = "Address", default)]
    address: Option<ComponentAddress>,
    #[serde(rename = "AddressDetails", default)]
    details: Option<AddressDetails>,
}

#[derive(Debug, Deserialize)]
struct ComponentAddress {
    #[serde(default)]
    formatted: Option<String>,
    #[serde(default)]
    postal_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddressDetails {
    #[serde(rename = "Country", default)]
    country: Option<Country>,
}

#[derive(Debug, Deserialize)]
struct Country {
    #[serde(rename = "AddressLine", default)]
    address_line: Option<String>,
    #[serde(rename = "AdministrativeArea", default)]
    administrative_area: Option<AdministrativeArea>,
}

#[derive(Debug, Deserialize)]
struct AdministrativeArea {
    #[serde(rename = "Locality", default)]
    locality: Option<Locality>,
    #[serde(rename = "SubAdministrativeArea", default)]
    sub_administrative_area: Option<SubAdministrativeArea>,
}

#[derive(Debug, Deserialize)]
struct SubAdministrativeArea {
    #[serde(rename = "Locality", default)]
    locality: Option<Locality>,
}

#[derive(Debug, Deserialize)]
struct Locality {
    #[serde(rename = "Thoroughfare", default)]
    thoroughfare: Option<Thoroughfare>,
}

#[derive(Debug, Deserialize)]
struct Thoroughfare {
    #[serde(rename = "Premise", default)]
    premise: Option<Premise>,
}

#[derive(Debug, Deserialize)]
struct Premise {
    #[serde(rename = "PostalCode", default)]
    postal_code: Option<PostalCode>,
}

#[derive(Debug, Deserialize)]
struct PostalCode {
    #[serde(rename = "PostalCodeNumber")]
    number: String,
}

impl Locality {
    fn postal_code(&self) -> Option<&str> {
        self.thoroughfare
            .as_ref()?
            .premise
            .as_ref()?
            .postal_code
            .as_ref()
            .map(|p| p.number.as_str())
    }
}

impl GeocoderMetaData {
    /// Postal code from the component address, falling back to the nested
    /// AddressDetails tree (with or without a sub-administrative level)
    fn postal_code(&self) -> Option<String> {
        if let Some(code) = self.address.as_ref().and_then(|a| a.postal_code.clone()) {
            return Some(code);
        }

        let area = self.details.as_ref()?.country.as_ref()?.administrative_area.as_ref()?;
        area.locality
            .as_ref()
            .and_then(Locality::postal_code)
            .or_else(|| {
                area.sub_administrative_area
                    .as_ref()?
                    .locality
                    .as_ref()?
                    .postal_code()
            })
            .map(str::to_string)
    }

    fn display_address(&self) -> Option<String> {
        self.details
            .as_ref()
            .and_then(|d| d.country.as_ref())
            .and_then(|c| c.address_line.clone())
            .or_else(|| self.address.as_ref().and_then(|a| a.formatted.clone()))
            .or_else(|| self.text.clone())
    }
}

impl GeoObject {
    fn into_place(self) -> Result<Place> {
        let coordinates: LonLat = self.point.pos.parse().context("Invalid Point.pos")?;
        let lower: LonLat = self
            .bounded_by
            .envelope
            .lower_corner
            .parse()
            .context("Invalid lowerCorner")?;
        let upper: LonLat = self
            .bounded_by
            .envelope
            .upper_corner
            .parse()
            .context("Invalid upperCorner")?;

        let display_address = self
            .meta
            .geocoder
            .display_address()
            .or(self.name)
            .unwrap_or_default();

        Ok(Place {
            coordinates,
            envelope: Envelope::new(lower, upper),
            postal_code: self.meta.geocoder.postal_code(),
            display_address,
            name: None,
        })
    }
}

/// Extract the first place from a geocoder JSON body
fn parse_geocoder_response(body: &str) -> Result<Option<Place>> {
    let data: GeocoderResponse =
        serde_json::from_str(body).context("Failed to parse geocoding response")?;

    match data.response.collection.members.into_iter().next() {
        Some(member) => member.geo_object.into_place().map(Some),
        None => Ok(None),
    }
}

/// Geocoder backed by the HTTP geocoding API
pub struct HttpGeocoder {
    client: reqwest::blocking::Client,
    url: String,
    api_key: Option<String>,
    lang: String,
}

impl HttpGeocoder {
    pub fn new(config: &MapSearchConfig) -> Result<Self> {
        Ok(Self {
            client: config.http_client()?,
            url: config.geocoder_url.clone(),
            api_key: config.geocoder_api_key.clone(),
            lang: config.lang.clone(),
        })
    }
}

impl Geocoder for HttpGeocoder {
    fn geocode(&self, query: &GeocodeQuery, options: &GeocodeOptions) -> Result<Option<Place>> {
        let geocode = query.as_param();
        if geocode.is_empty() {
            log::debug!("Skipping geocoder request for empty query");
            return Ok(None);
        }

        let mut params: Vec<(&str, String)> = vec![
            ("geocode", geocode),
            ("format", "json".to_string()),
            ("lang", self.lang.clone()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("apikey", key.clone()));
        }
        if options.nearest_only {
            params.push(("results", "1".to_string()));
        }

        log::debug!("Geocoding {:?} via {}", query, self.url);

        let response = self
            .client
            .get(&self.url)
            .query(&params)
            .send()
            .context("Failed to send geocoding request")?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            anyhow::bail!("Geocoding API refused the request: {}", status);
        }
        if !status.is_success() {
            log::debug!("Geocoding API returned status {}, treating as no match", status);
            return Ok(None);
        }

        let body = response
            .text()
            .context("Failed to read geocoding response")?;
        parse_geocoder_response(&body)
    }
}
