//! Geocode → tract → income pipeline behind the eligibility endpoints

use tracing::{info, warn};

use crate::census::{mock, AcsClient, CensusCache, TractId, TractIncome};
use crate::config::Config;
use crate::geocode::{
    parse_address, CensusGeocoder, Coordinates, EsriGeocoder, GeocodeError, GeocodeMatch,
};
use crate::store::SupabaseClient;
use crate::util::time::Timer;

use super::{DataSource, LmiError, LmiResult};

#[derive(Clone)]
pub struct LmiService {
    esri: EsriGeocoder,
    census_geocoder: CensusGeocoder,
    acs: AcsClient,
    cache: CensusCache,
    allow_mock_fallback: bool,
}

impl LmiService {
    pub fn new(config: &Config, supabase: SupabaseClient) -> Self {
        Self {
            esri: EsriGeocoder::new(config),
            census_geocoder: CensusGeocoder::new(config),
            acs: AcsClient::new(config),
            cache: CensusCache::new(supabase, config.census_cache_ttl_days),
            allow_mock_fallback: config.allow_mock_fallback,
        }
    }

    pub fn cache(&self) -> &CensusCache {
        &self.cache
    }

    /// Check an address for LMI eligibility
    pub async fn check_address(&self, address: &str) -> Result<LmiResult, LmiError> {
        parse_address(address)?;
        let timer = Timer::new();

        let outcome = self.check_address_live(address).await;
        let result = match outcome {
            Ok(result) => result,
            Err(e) if self.allow_mock_fallback && is_upstream_failure(&e) => {
                warn!(error = %e, "LMI check failed upstream, serving mock data");
                mock_result(address)
            }
            Err(e) => return Err(e),
        };

        info!(
            tract_id = %result.tract_id,
            eligible = result.is_eligible,
            source = ?result.data_source,
            elapsed_ms = timer.elapsed_ms(),
            "LMI address check complete"
        );
        Ok(result)
    }

    /// Check a coordinate pair for LMI eligibility
    pub async fn check_coordinates(&self, coords: Coordinates) -> Result<LmiResult, LmiError> {
        let coords = Coordinates::new(coords.lat, coords.lon)?;

        let tract = match self.census_geocoder.tract_for_coordinates(coords).await {
            Ok(Some(tract)) => tract,
            Ok(None) => return Err(LmiError::TractNotFound),
            Err(e) if self.allow_mock_fallback => {
                warn!(error = %e, "tract lookup failed, serving mock data");
                // A made-up tract never reaches ACS or the cache
                let key = format!("{:.5},{:.5}", coords.lat, coords.lon);
                let income = mock::mock_tract_income(&mock::mock_tract_id(&key));
                let mut result = LmiResult::from_income(&income, DataSource::Mock);
                result.coordinates = Some(coords);
                return Ok(result);
            }
            Err(e) => return Err(e.into()),
        };

        let (income, source) = self.tract_income(&tract).await?;
        let mut result = LmiResult::from_income(&income, source);
        result.coordinates = Some(coords);
        Ok(result)
    }

    /// Geocode only, ESRI first and the Census geocoder as fallback
    pub async fn geocode(&self, address: &str) -> Result<GeocodeMatch, LmiError> {
        let query = parse_address(address)?.one_line();
        let address = query.as_str();

        let mut esri_error = None;
        if self.esri.is_configured() {
            match self.esri.geocode(address).await {
                Ok(Some(found)) => return Ok(found),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "ESRI geocoding failed, trying Census geocoder");
                    esri_error = Some(e);
                }
            }
        }

        match self.census_geocoder.geocode_address(address).await {
            Ok(Some(found)) => Ok(found),
            Ok(None) => match esri_error {
                // Neither geocoder matched, but one of them never got to answer
                Some(e) => Err(e.into()),
                None => Err(LmiError::AddressNotFound),
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Cache-or-fetch income figures for a tract
    pub async fn tract_income(&self, tract: &TractId) -> Result<(TractIncome, DataSource), LmiError> {
        if let Some(cached) = self.cache.get(tract).await {
            return Ok((cached, DataSource::Cache));
        }

        let fetched = futures::try_join!(
            self.acs.tract_median_income(tract),
            self.acs.county_median_income(tract),
        );

        match fetched {
            Ok((median, ami)) => {
                let income = TractIncome::classify(*tract, median, ami, self.acs.year());
                // Only complete figures are worth keeping for a month
                if income.income_percentage.is_some() {
                    self.cache.put(&income).await;
                }
                Ok((income, DataSource::Live))
            }
            Err(e) if self.allow_mock_fallback => {
                warn!(tract_id = %tract, error = %e, "ACS lookup failed, serving mock data");
                Ok((mock::mock_tract_income(tract), DataSource::Mock))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn check_address_live(&self, address: &str) -> Result<LmiResult, LmiError> {
        let found = self.geocode(address).await?;

        let tract = match found.tract_id {
            Some(tract) => tract,
            None => self
                .census_geocoder
                .tract_for_coordinates(found.coordinates)
                .await?
                .ok_or(LmiError::TractNotFound)?,
        };

        let (income, source) = self.tract_income(&tract).await?;
        let mut result = LmiResult::from_income(&income, source);
        result.address = Some(address.trim().to_string());
        result.matched_address = Some(found.matched_address);
        result.coordinates = Some(found.coordinates);
        Ok(result)
    }
}

fn is_upstream_failure(error: &LmiError) -> bool {
    match error {
        LmiError::Geocode(GeocodeError::InvalidCoordinates { .. }) => false,
        LmiError::Geocode(_) | LmiError::Census(_) => true,
        _ => false,
    }
}

fn mock_result(address: &str) -> LmiResult {
    let tract = mock::mock_tract_id(address);
    let income = mock::mock_tract_income(&tract);
    let mut result = LmiResult::from_income(&income, DataSource::Mock);
    result.address = Some(address.trim().to_string());
    result.matched_address = Some(address.trim().to_string());
    result.coordinates = Some(mock::mock_coordinates(address));
    result
}
