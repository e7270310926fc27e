//! Census Bureau geocoder: address and coordinate lookups with tract geographies

use std::collections::HashMap;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::census::TractId;
use crate::config::Config;

use super::{Coordinates, GeocodeError, GeocodeMatch, GeocodeSource};

const BENCHMARK: &str = "Public_AR_Current";
const VINTAGE: &str = "Current_Current";
const TRACTS_LAYER: &str = "Census Tracts";

#[derive(Clone)]
pub struct CensusGeocoder {
    client: Client,
    base_url: String,
}

impl CensusGeocoder {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.census_geocoder_url.trim_end_matches('/').to_string(),
        }
    }

    /// Geocode an address; the match carries its tract when the Census layer has one
    pub async fn geocode_address(
        &self,
        address: &str,
    ) -> Result<Option<GeocodeMatch>, GeocodeError> {
        let url = format!("{}/geographies/onelineaddress", self.base_url);
        let payload: AddressResponse = self
            .fetch(&url, &[("address", address)])
            .await?;

        let Some(found) = payload.result.address_matches.into_iter().next() else {
            debug!(address = %address, "Census geocoder found no match");
            return Ok(None);
        };

        let coordinates = Coordinates::new(found.coordinates.y, found.coordinates.x)?;
        let tract_id = first_tract(&found.geographies);

        Ok(Some(GeocodeMatch {
            matched_address: found.matched_address,
            coordinates,
            score: 100.0,
            source: GeocodeSource::Census,
            tract_id,
        }))
    }

    /// Resolve the tract containing a point
    pub async fn tract_for_coordinates(
        &self,
        coords: Coordinates,
    ) -> Result<Option<TractId>, GeocodeError> {
        if !coords.is_valid() {
            return Err(GeocodeError::InvalidCoordinates { lat: coords.lat, lon: coords.lon });
        }

        let url = format!("{}/geographies/coordinates", self.base_url);
        let x = coords.lon.to_string();
        let y = coords.lat.to_string();
        let payload: CoordinatesResponse = self
            .fetch(&url, &[("x", x.as_str()), ("y", y.as_str())])
            .await?;

        Ok(first_tract(&payload.result.geographies))
    }

    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<T, GeocodeError> {
        let response = self
            .client
            .get(url)
            .query(params)
            .query(&[("benchmark", BENCHMARK), ("vintage", VINTAGE), ("format", "json")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GeocodeError::Api { status: status.as_u16(), body });
        }

        Ok(response.json().await?)
    }
}

fn first_tract(geographies: &HashMap<String, Vec<Geography>>) -> Option<TractId> {
    let geo = geographies.get(TRACTS_LAYER)?.first()?;
    match geo.geoid.parse() {
        Ok(tract) => Some(tract),
        Err(e) => {
            warn!(geoid = %geo.geoid, error = %e, "Census geocoder returned malformed GEOID");
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct AddressResponse {
    result: AddressResult,
}

#[derive(Debug, Deserialize)]
struct AddressResult {
    #[serde(rename = "addressMatches", default)]
    address_matches: Vec<AddressMatch>,
}

#[derive(Debug, Deserialize)]
struct AddressMatch {
    #[serde(rename = "matchedAddress")]
    matched_address: String,
    coordinates: CensusPoint,
    #[serde(default)]
    geographies: HashMap<String, Vec<Geography>>,
}

#[derive(Debug, Deserialize)]
struct CensusPoint {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct CoordinatesResponse {
    result: CoordinatesResult,
}

#[derive(Debug, Deserialize)]
struct CoordinatesResult {
    #[serde(default)]
    geographies: HashMap<String, Vec<Geography>>,
}

#[derive(Debug, Deserialize)]
struct Geography {
    #[serde(rename = "GEOID")]
    geoid: String,
}
