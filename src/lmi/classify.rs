//! Income percentage and LMI classification rules

use serde::{Deserialize, Serialize};

/// Tracts at or below this share of AMI are LMI eligible
pub const LMI_THRESHOLD_PCT: f64 = 80.0;

const LOW_UPPER_PCT: f64 = 50.0;
const MIDDLE_UPPER_PCT: f64 = 120.0;

pub const APPROVED_MESSAGE: &str = "APPROVED - This location is in a Low-to-Moderate Income census tract";
pub const NOT_APPROVED_MESSAGE: &str =
    "NOT APPROVED - This location is not in a Low-to-Moderate Income census tract";

/// Tract income level relative to area median income
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeCategory {
    Low,
    Moderate,
    Middle,
    Upper,
    Unknown,
}

impl IncomeCategory {
    pub fn from_percentage(pct: f64) -> Self {
        if !pct.is_finite() || pct < 0.0 {
            Self::Unknown
        } else if pct < LOW_UPPER_PCT {
            Self::Low
        } else if pct <= LMI_THRESHOLD_PCT {
            Self::Moderate
        } else if pct < MIDDLE_UPPER_PCT {
            Self::Middle
        } else {
            Self::Upper
        }
    }

    pub fn is_lmi(&self) -> bool {
        matches!(self, Self::Low | Self::Moderate)
    }
}

/// Tract median income as a percentage of AMI, rounded to one decimal
pub fn income_percentage(median_income: f64, ami: f64) -> Option<f64> {
    if ami.is_nan() || ami <= 0.0 || !median_income.is_finite() || median_income < 0.0 {
        return None;
    }
    Some((median_income / ami * 1000.0).round() / 10.0)
}

pub fn is_lmi_eligible(pct: f64) -> bool {
    pct.is_finite() && pct >= 0.0 && pct <= LMI_THRESHOLD_PCT
}

pub fn approval_message(eligible: bool) -> &'static str {
    if eligible {
        APPROVED_MESSAGE
    } else {
        NOT_APPROVED_MESSAGE
    }
}
