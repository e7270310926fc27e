//! Address geocoding: ESRI World Geocoder with the Census geocoder as fallback

pub mod address;
pub mod census;
pub mod esri;

pub use address::{normalize_address, parse_address, AddressError};
pub use census::CensusGeocoder;
pub use esri::EsriGeocoder;

use serde::{Deserialize, Serialize};

use crate::census::TractId;

/// WGS84 point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Result<Self, GeocodeError> {
        let coords = Self { lat, lon };
        if coords.is_valid() {
            Ok(coords)
        } else {
            Err(GeocodeError::InvalidCoordinates { lat, lon })
        }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Which geocoder produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeocodeSource {
    Esri,
    Census,
}

/// A geocoded address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeMatch {
    pub matched_address: String,
    pub coordinates: Coordinates,
    /// Match confidence 0-100 (Census matches report 100)
    pub score: f64,
    pub source: GeocodeSource,
    /// Set when the geocoder resolved the tract in the same call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tract_id: Option<TractId>,
}

/// Geocoding errors
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("Geocoder is not configured")]
    NotConfigured,

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Geocoder API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Geocoder returned an error: {0}")]
    Upstream(String),

    #[error("Invalid coordinates ({lat}, {lon})")]
    InvalidCoordinates { lat: f64, lon: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_are_range_checked() {
        assert!(Coordinates::new(40.7128, -74.0060).is_ok());
        assert!(Coordinates::new(90.0, 180.0).is_ok());
        assert!(Coordinates::new(90.1, 0.0).is_err());
        assert!(Coordinates::new(0.0, -180.5).is_err());
        assert!(Coordinates::new(f64::NAN, 0.0).is_err());
    }
}
