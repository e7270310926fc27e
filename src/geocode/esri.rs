//! ESRI ArcGIS World Geocoder client
//!
//! The API key stays server side; browsers only ever see the match.

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;

use super::{Coordinates, GeocodeError, GeocodeMatch, GeocodeSource};

#[derive(Clone)]
pub struct EsriGeocoder {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    min_score: f64,
}

impl EsriGeocoder {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.esri_geocode_url.trim_end_matches('/').to_string(),
            api_key: config.esri_api_key.clone(),
            min_score: config.esri_min_score,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Geocode a one-line address, returning the best candidate above the score floor
    pub async fn geocode(&self, address: &str) -> Result<Option<GeocodeMatch>, GeocodeError> {
        let api_key = self.api_key.as_deref().ok_or(GeocodeError::NotConfigured)?;
        let url = format!("{}/findAddressCandidates", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("SingleLine", address),
                ("f", "json"),
                ("maxLocations", "1"),
                ("outFields", "Match_addr,Score"),
                ("forStorage", "false"),
                ("token", api_key),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GeocodeError::Api { status: status.as_u16(), body });
        }

        let payload: CandidatesResponse = response.json().await?;

        // ArcGIS reports failures inside a 200 envelope
        if let Some(err) = payload.error {
            warn!(code = err.code, message = %err.message, "ESRI geocoder error");
            return Err(GeocodeError::Upstream(err.message));
        }

        let best = payload
            .candidates
            .into_iter()
            .filter(|c| c.score >= self.min_score)
            .max_by(|a, b| a.score.total_cmp(&b.score));

        let Some(candidate) = best else {
            debug!(address = %address, "No ESRI candidate above score floor");
            return Ok(None);
        };

        let coordinates = Coordinates::new(candidate.location.y, candidate.location.x)?;

        Ok(Some(GeocodeMatch {
            matched_address: candidate.address,
            coordinates,
            score: candidate.score,
            source: GeocodeSource::Esri,
            tract_id: None,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct CandidatesResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<EsriErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    address: String,
    location: EsriPoint,
    score: f64,
}

#[derive(Debug, Deserialize)]
struct EsriPoint {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct EsriErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn geocoder(server: &MockServer) -> EsriGeocoder {
        EsriGeocoder::new(&Config::for_tests(&server.uri()))
    }

    #[tokio::test]
    async fn picks_best_candidate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esri/findAddressCandidates"))
            .and(query_param("token", "esri-key"))
            .and(query_param("SingleLine", "123 Main St, Springfield, IL"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [
                    {"address": "123 Main St, Springfield, Illinois, 62701", "location": {"x": -89.65, "y": 39.80}, "score": 92.5},
                    {"address": "123 Main St, Springfield, Illinois, 62704", "location": {"x": -89.70, "y": 39.78}, "score": 100.0}
                ]
            })))
            .mount(&server)
            .await;

        let found = geocoder(&server)
            .geocode("123 Main St, Springfield, IL")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.matched_address, "123 Main St, Springfield, Illinois, 62704");
        assert_eq!(found.source, GeocodeSource::Esri);
        assert_eq!(found.coordinates, Coordinates { lat: 39.78, lon: -89.70 });
        assert!(found.tract_id.is_none());
    }

    #[tokio::test]
    async fn low_scores_are_no_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esri/findAddressCandidates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [
                    {"address": "Springfield", "location": {"x": -89.6, "y": 39.8}, "score": 41.0}
                ]
            })))
            .mount(&server)
            .await;

        assert!(geocoder(&server).geocode("nowhere").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn error_envelope_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esri/findAddressCandidates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": {"code": 498, "message": "Invalid Token"}
            })))
            .mount(&server)
            .await;

        let err = geocoder(&server).geocode("1 Main St").await.unwrap_err();
        assert!(matches!(err, GeocodeError::Upstream(msg) if msg == "Invalid Token"));
    }

    #[tokio::test]
    async fn http_failure_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let err = geocoder(&server).geocode("1 Main St").await.unwrap_err();
        assert!(matches!(err, GeocodeError::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let mut config = Config::for_tests("http://127.0.0.1:9");
        config.esri_api_key = None;
        let geocoder = EsriGeocoder::new(&config);

        assert!(!geocoder.is_configured());
        let err = geocoder.geocode("1 Main St").await.unwrap_err();
        assert!(matches!(err, GeocodeError::NotConfigured));
    }
}
