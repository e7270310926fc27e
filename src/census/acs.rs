//! American Community Survey 5-year income lookups

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::config::Config;

use super::{CensusError, TractId};

/// Median household income in the past 12 months
pub const MEDIAN_HOUSEHOLD_INCOME: &str = "B19013_001E";

#[derive(Clone)]
pub struct AcsClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    year: u16,
}

impl AcsClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.census_api_url.trim_end_matches('/').to_string(),
            api_key: config.census_api_key.clone(),
            year: config.census_acs_year,
        }
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    /// Median household income for the tract itself
    pub async fn tract_median_income(&self, tract: &TractId) -> Result<Option<f64>, CensusError> {
        let geo_for = format!("tract:{}", tract.tract());
        let geo_in = format!("state:{} county:{}", tract.state(), tract.county());
        self.fetch_variable(&geo_for, &geo_in).await
    }

    /// Median household income for the county containing the tract (used as AMI)
    pub async fn county_median_income(&self, tract: &TractId) -> Result<Option<f64>, CensusError> {
        debug!(county_fips = %tract.county_fips(), "fetching county AMI");
        let geo_for = format!("county:{}", tract.county());
        let geo_in = format!("state:{}", tract.state());
        self.fetch_variable(&geo_for, &geo_in).await
    }

    async fn fetch_variable(&self, geo_for: &str, geo_in: &str) -> Result<Option<f64>, CensusError> {
        let url = format!("{}/{}/acs/acs5", self.base_url, self.year);

        let mut request = self.client.get(&url).query(&[
            ("get", MEDIAN_HOUSEHOLD_INCOME),
            ("for", geo_for),
            ("in", geo_in),
        ]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        let response = request.send().await?;

        // The data API answers 204 when the geography has no rows
        if response.status() == StatusCode::NO_CONTENT {
            debug!(geo_for = %geo_for, geo_in = %geo_in, "ACS returned no rows");
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CensusError::Api { status: status.as_u16(), body });
        }

        let table: Vec<Vec<Value>> = response.json().await?;
        parse_variable(&table, MEDIAN_HOUSEHOLD_INCOME)
    }
}

/// Read `variable` from the first data row of an ACS header+rows table.
///
/// ACS encodes suppressed or unavailable estimates as large negative
/// sentinels (-666666666 and friends); those read as `None`.
pub fn parse_variable(table: &[Vec<Value>], variable: &str) -> Result<Option<f64>, CensusError> {
    let header = table
        .first()
        .ok_or_else(|| CensusError::Malformed("empty table".to_string()))?;

    let column = header
        .iter()
        .position(|h| h.as_str() == Some(variable))
        .ok_or_else(|| CensusError::Malformed(format!("missing column {}", variable)))?;

    let Some(row) = table.get(1) else {
        return Ok(None);
    };

    let value = match row.get(column) {
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(Value::Number(n)) => n.as_f64(),
        _ => None,
    };

    Ok(value.filter(|v| v.is_finite() && *v >= 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn table(value: Value) -> Vec<Vec<Value>> {
        vec![
            vec![json!("B19013_001E"), json!("state"), json!("county"), json!("tract")],
            vec![value, json!("36"), json!("061"), json!("000100")],
        ]
    }

    #[test]
    fn parses_string_and_numeric_cells() {
        assert_eq!(parse_variable(&table(json!("65000")), MEDIAN_HOUSEHOLD_INCOME).unwrap(), Some(65000.0));
        assert_eq!(parse_variable(&table(json!(51234)), MEDIAN_HOUSEHOLD_INCOME).unwrap(), Some(51234.0));
    }

    #[test]
    fn sentinels_and_nulls_are_no_data() {
        assert_eq!(parse_variable(&table(json!("-666666666")), MEDIAN_HOUSEHOLD_INCOME).unwrap(), None);
        assert_eq!(parse_variable(&table(Value::Null), MEDIAN_HOUSEHOLD_INCOME).unwrap(), None);
    }

    #[test]
    fn header_without_rows_is_no_data() {
        let table = vec![vec![json!("B19013_001E"), json!("state")]];
        let value = tokio_test::assert_ok!(parse_variable(&table, MEDIAN_HOUSEHOLD_INCOME));
        assert_eq!(value, None);
    }

    #[test]
    fn missing_column_is_malformed() {
        let table = vec![vec![json!("NAME")], vec![json!("x")]];
        assert!(matches!(
            parse_variable(&table, MEDIAN_HOUSEHOLD_INCOME),
            Err(CensusError::Malformed(_))
        ));
        assert!(parse_variable(&[], MEDIAN_HOUSEHOLD_INCOME).is_err());
    }

    #[tokio::test]
    async fn fetches_tract_and_county_incomes() {
        let server = MockServer::start().await;
        let tract: TractId = "36061000100".parse().unwrap();

        Mock::given(method("GET"))
            .and(path("/data/2022/acs/acs5"))
            .and(query_param("for", "tract:000100"))
            .and(query_param("in", "state:36 county:061"))
            .respond_with(ResponseTemplate::new(200).set_body_json(table(json!("48000"))))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/data/2022/acs/acs5"))
            .and(query_param("for", "county:061"))
            .and(query_param("in", "state:36"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                ["B19013_001E", "state", "county"],
                ["96000", "36", "061"]
            ])))
            .mount(&server)
            .await;

        let client = AcsClient::new(&Config::for_tests(&server.uri()));
        assert_eq!(client.tract_median_income(&tract).await.unwrap(), Some(48000.0));
        assert_eq!(client.county_median_income(&tract).await.unwrap(), Some(96000.0));
    }

    #[tokio::test]
    async fn no_content_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = AcsClient::new(&Config::for_tests(&server.uri()));
        let tract: TractId = "99999999999".parse().unwrap();
        assert_eq!(client.tract_median_income(&tract).await.unwrap(), None);
    }

    #[tokio::test]
    async fn server_error_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .mount(&server)
            .await;

        let client = AcsClient::new(&Config::for_tests(&server.uri()));
        let tract: TractId = "36061000100".parse().unwrap();
        let err = client.county_median_income(&tract).await.unwrap_err();
        assert!(matches!(err, CensusError::Api { status: 500, .. }));
    }
}
