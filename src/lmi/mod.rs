//! LMI eligibility checks

pub mod classify;
pub mod service;

pub use classify::IncomeCategory;
pub use service::LmiService;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::census::{CensusError, TractId, TractIncome};
use crate::geocode::{AddressError, Coordinates, GeocodeError};

/// Where the tract figures of a result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Cache,
    Live,
    Mock,
}

/// Outcome of an eligibility check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LmiResult {
    pub status: String,
    /// Address as submitted (absent for coordinate checks)
    pub address: Option<String>,
    pub matched_address: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub tract_id: TractId,
    pub median_income: Option<f64>,
    pub ami: Option<f64>,
    pub income_percentage: Option<f64>,
    pub income_category: IncomeCategory,
    pub is_eligible: bool,
    pub approval_message: String,
    pub data_source: DataSource,
    pub is_mock: bool,
    pub checked_at: DateTime<Utc>,
}

impl LmiResult {
    pub fn from_income(income: &TractIncome, source: DataSource) -> Self {
        Self {
            status: "success".to_string(),
            address: None,
            matched_address: None,
            coordinates: None,
            tract_id: income.tract_id,
            median_income: income.median_income,
            ami: income.ami,
            income_percentage: income.income_percentage,
            income_category: income.income_category,
            is_eligible: income.is_eligible,
            approval_message: classify::approval_message(income.is_eligible).to_string(),
            data_source: source,
            is_mock: source == DataSource::Mock,
            checked_at: Utc::now(),
        }
    }
}

/// Eligibility check errors
#[derive(Debug, thiserror::Error)]
pub enum LmiError {
    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("Address could not be geocoded")]
    AddressNotFound,

    #[error("No census tract found for location")]
    TractNotFound,

    #[error("Geocoding failed: {0}")]
    Geocode(#[from] GeocodeError),

    #[error("Census lookup failed: {0}")]
    Census(#[from] CensusError),
}
