//! Census tract income data: ACS lookups, the tract cache, and demo data

pub mod acs;
pub mod cache;
pub mod mock;
pub mod tract;

pub use acs::AcsClient;
pub use cache::CensusCache;
pub use tract::TractId;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lmi::classify::{income_percentage, is_lmi_eligible, IncomeCategory};

/// Income figures for one tract, classified against its county AMI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TractIncome {
    pub tract_id: TractId,
    pub median_income: Option<f64>,
    /// Area median income (county median household income)
    pub ami: Option<f64>,
    pub income_percentage: Option<f64>,
    pub income_category: IncomeCategory,
    pub is_eligible: bool,
    /// ACS dataset year the figures come from
    pub year: u16,
    pub fetched_at: DateTime<Utc>,
}

impl TractIncome {
    pub fn classify(
        tract_id: TractId,
        median_income: Option<f64>,
        ami: Option<f64>,
        year: u16,
    ) -> Self {
        let income_percentage = match (median_income, ami) {
            (Some(median), Some(ami)) => income_percentage(median, ami),
            _ => None,
        };
        let income_category = income_percentage
            .map(IncomeCategory::from_percentage)
            .unwrap_or(IncomeCategory::Unknown);

        Self {
            tract_id,
            median_income,
            ami,
            income_percentage,
            income_category,
            is_eligible: income_percentage.map(is_lmi_eligible).unwrap_or(false)
                && income_category.is_lmi(),
            year,
            fetched_at: Utc::now(),
        }
    }
}

/// Census data errors
#[derive(Debug, thiserror::Error)]
pub enum CensusError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Census API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Unexpected Census API response: {0}")]
    Malformed(String),
}
