use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of one degree of latitude (and of longitude at the equator), in meters
pub const METERS_PER_DEGREE: f64 = 111_000.0;

/// Radius used when looking for an organization around a clicked point
pub const ORGANIZATION_RADIUS_M: f64 = 50.0;

/// A geographic position in degrees, always ordered (longitude, latitude)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Round both axes to six decimals, the precision accepted by the map API
    pub fn rounded(self) -> Self {
        Self {
            lon: round6(self.lon),
            lat: round6(self.lat),
        }
    }
}

impl fmt::Display for LonLat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lon, self.lat)
    }
}

impl FromStr for LonLat {
    type Err = anyhow::Error;

    /// Accepts "lon,lat" (map API order) and "lon lat" (geocoder `pos` order)
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|p| !p.is_empty());

        let lon = parts
            .next()
            .context("Missing longitude")?
            .parse::<f64>()
            .context("Invalid longitude")?;
        let lat = parts
            .next()
            .context("Missing latitude")?
            .parse::<f64>()
            .context("Invalid latitude")?;

        if parts.next().is_some() {
            anyhow::bail!("Expected exactly two coordinates in '{}'", s);
        }

        Ok(Self { lon, lat })
    }
}

/// Opposite corners of the area a place covers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub lower: LonLat,
    pub upper: LonLat,
}

impl Envelope {
    pub const fn new(lower: LonLat, upper: LonLat) -> Self {
        Self { lower, upper }
    }

    /// Per-axis angular span (upper minus lower)
    pub fn span(&self) -> LonLat {
        LonLat {
            lon: self.upper.lon - self.lower.lon,
            lat: self.upper.lat - self.lower.lat,
        }
    }
}

/// Saturate a position at the world bounds (lon ±180, lat ±90)
pub fn clamp_to_world(point: LonLat) -> LonLat {
    LonLat {
        lon: point.lon.clamp(-180.0, 180.0),
        lat: point.lat.clamp(-90.0, 90.0),
    }
}

/// Planar distance in meters between two nearby points.
///
/// The longitude delta is scaled by the cosine of the mean latitude before the
/// Euclidean sum; good enough over a few hundred meters, wrong over hundreds of
/// kilometers.
pub fn flat_distance_m(a: LonLat, b: LonLat) -> f64 {
    let mean_lat = ((a.lat + b.lat) / 2.0).to_radians();
    let dx = (a.lon - b.lon) * mean_lat.cos();
    let dy = a.lat - b.lat;
    (dx * dx + dy * dy).sqrt() * METERS_PER_DEGREE
}

/// Angular span covering `radius_m` around `point`, as (lon, lat) degrees
pub fn search_span(point: LonLat, radius_m: f64) -> LonLat {
    LonLat {
        lon: radius_m / (METERS_PER_DEGREE * point.lat.to_radians().cos()),
        lat: radius_m / METERS_PER_DEGREE,
    }
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}
