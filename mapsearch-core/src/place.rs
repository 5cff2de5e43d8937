use crate::geo::{Envelope, LonLat};
use serde::{Deserialize, Serialize};

/// A geocoded place: where it is, how much ground it covers, and how to label it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// Position of the place marker
    pub coordinates: LonLat,
    /// Area covered by the place; its span sets the pan step
    pub envelope: Envelope,
    /// Human-readable address
    pub display_address: String,
    /// Postal code, when the geocoder knows one
    pub postal_code: Option<String>,
    /// Business name, set only for places found through organization search
    pub name: Option<String>,
}

impl Place {
    /// Text for the read-only address field.
    /// With `show_postal` the postal code (or a "no postal code" note) is appended.
    pub fn address_line(&self, show_postal: bool) -> String {
        let mut line = match &self.name {
            Some(name) if !name.is_empty() => format!("{}, {}", name, self.display_address),
            _ => self.display_address.clone(),
        };

        if show_postal {
            match &self.postal_code {
                Some(code) => {
                    line.push_str(", ");
                    line.push_str(code);
                }
                None => line.push_str(", no postal code"),
            }
        }

        line
    }
}

/// Result of an organization search
#[derive(Debug, Clone, PartialEq)]
pub struct Organization {
    pub name: String,
    pub address: String,
    pub coordinates: LonLat,
    pub envelope: Envelope,
}

impl Organization {
    /// Turn the organization into a place, attaching a separately looked-up postal code
    pub fn into_place(self, postal_code: Option<String>) -> Place {
        Place {
            coordinates: self.coordinates,
            envelope: self.envelope,
            display_address: self.address,
            postal_code,
            name: Some(self.name),
        }
    }
}
