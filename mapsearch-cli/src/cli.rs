use clap::Parser;
use mapsearch_core::{LonLat, MapStyle};
use std::path::PathBuf;

/// Look up addresses and points on the map
#[derive(Parser, Debug)]
#[command(name = "mapsearch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Geocode an address or a point and fetch the static map around it",
    long_about = None
)]
pub struct Args {
    /// Address to search for
    #[arg(value_name = "ADDRESS", conflicts_with = "at", required_unless_present = "at")]
    pub address: Option<String>,

    /// Reverse geocode a point given as LON,LAT instead of searching text
    #[arg(long = "at", value_name = "LON,LAT", allow_hyphen_values = true)]
    pub at: Option<LonLat>,

    /// With --at, look for the organization at the point rather than the address
    #[arg(long = "organization", requires = "at")]
    pub organization: bool,

    /// Print the postal code along with the address
    #[arg(short = 'p', long = "postal")]
    pub postal: bool,

    /// Map style: map, sat or hybrid
    #[arg(long = "style", default_value = "map")]
    pub style: MapStyle,

    /// Zoom level of the saved map (1-17)
    #[arg(short = 'z', long = "zoom", value_parser = clap::value_parser!(u8).range(1..=17))]
    pub zoom: Option<u8>,

    /// Write the rendered map image to this file
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// JSON configuration file with endpoints and API keys
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Parses command-line arguments
pub fn parse_args() -> Args {
    Args::parse()
}
