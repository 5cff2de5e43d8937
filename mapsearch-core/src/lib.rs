use anyhow::Result;

pub mod config;
pub mod geo;
pub mod geocoding;
pub mod organizations;
pub mod place;
pub mod tiles;
pub mod viewport;

// Re-export public types
pub use config::MapSearchConfig;
pub use geo::{Envelope, LonLat};
pub use geocoding::{GeocodeOptions, GeocodeQuery, Geocoder, HttpGeocoder};
pub use organizations::{HttpOrganizationSearch, OrganizationSearch};
pub use place::{Organization, Place};
pub use tiles::{HttpTileRenderer, MapStyle, RenderRequest, TileRenderer};
pub use viewport::{
    ClickMode, MapFrame, PanDirection, SearchOutcome, SearchStatus, ViewChange, ViewportController,
    ViewportState, ZoomStep, MAX_ZOOM, MIN_ZOOM,
};

/// Build a controller wired to the HTTP geocoder, static map and organization search services
pub fn connect(config: &MapSearchConfig) -> Result<ViewportController> {
    config.validate()?;

    log::debug!(
        "Connecting to geocoder {} and static maps {}",
        config.geocoder_url,
        config.static_map_url
    );

    Ok(ViewportController::new(
        Box::new(HttpGeocoder::new(config)?),
        Box::new(HttpTileRenderer::new(config)?),
        Box::new(HttpOrganizationSearch::new(config)?),
    ))
}
