//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Default ESRI World Geocoder endpoint
pub const DEFAULT_ESRI_GEOCODE_URL: &str =
    "https://geocode-api.arcgis.com/arcgis/rest/services/World/GeocodeServer";
/// Default Census Bureau geocoder endpoint
pub const DEFAULT_CENSUS_GEOCODER_URL: &str = "https://geocoding.geo.census.gov/geocoder";
/// Default Census Bureau data API endpoint
pub const DEFAULT_CENSUS_API_URL: &str = "https://api.census.gov/data";
/// Default Stripe API endpoint
pub const DEFAULT_STRIPE_API_URL: &str = "https://api.stripe.com/v1";

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines instead of human readable ones
    pub log_json: bool,

    /// Supabase project URL
    pub supabase_url: String,
    /// Supabase service role key (bypasses RLS - server only!)
    pub supabase_service_role_key: String,
    /// Supabase JWT secret for token verification
    pub supabase_jwt_secret: String,

    /// ESRI ArcGIS API key; geocoding falls back to the Census geocoder when absent
    pub esri_api_key: Option<String>,
    pub esri_geocode_url: String,
    /// Minimum ESRI candidate score accepted as a match
    pub esri_min_score: f64,

    /// Census data API key (optional, raises the anonymous quota)
    pub census_api_key: Option<String>,
    pub census_geocoder_url: String,
    pub census_api_url: String,
    /// ACS 5-year dataset year
    pub census_acs_year: u16,
    /// How long tract income rows stay in census_cache
    pub census_cache_ttl_days: i64,

    /// Serve deterministic demo data when upstream lookups fail
    pub allow_mock_fallback: bool,
    /// Per-user lookups per second
    pub lookup_rate_limit: u32,
    /// Upper bound for any single inbound request
    pub request_timeout_secs: u64,

    /// Stripe secret API key
    pub stripe_secret_key: Option<String>,
    /// Stripe webhook signing secret
    pub stripe_webhook_secret: Option<String>,
    pub stripe_api_url: String,

    /// Allowed client origin for CORS (comma-separated)
    pub client_origin: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),

            supabase_url: required("SUPABASE_URL")?,
            supabase_service_role_key: required("SUPABASE_SERVICE_ROLE_KEY")?,
            supabase_jwt_secret: required("SUPABASE_JWT_SECRET")?,

            esri_api_key: optional("ESRI_API_KEY"),
            esri_geocode_url: optional("ESRI_GEOCODE_URL")
                .unwrap_or_else(|| DEFAULT_ESRI_GEOCODE_URL.to_string()),
            esri_min_score: parsed("ESRI_MIN_SCORE", 80.0)?,

            census_api_key: optional("CENSUS_API_KEY"),
            census_geocoder_url: optional("CENSUS_GEOCODER_URL")
                .unwrap_or_else(|| DEFAULT_CENSUS_GEOCODER_URL.to_string()),
            census_api_url: optional("CENSUS_API_URL")
                .unwrap_or_else(|| DEFAULT_CENSUS_API_URL.to_string()),
            census_acs_year: parsed("CENSUS_ACS_YEAR", 2022)?,
            census_cache_ttl_days: parsed("CENSUS_CACHE_TTL_DAYS", 30)?,

            allow_mock_fallback: parsed("ALLOW_MOCK_FALLBACK", false)?,
            lookup_rate_limit: parsed("LOOKUP_RATE_LIMIT", 5)?,
            request_timeout_secs: parsed("REQUEST_TIMEOUT_SECS", 20)?,

            stripe_secret_key: optional("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: optional("STRIPE_WEBHOOK_SECRET"),
            stripe_api_url: optional("STRIPE_API_URL")
                .unwrap_or_else(|| DEFAULT_STRIPE_API_URL.to_string()),

            client_origin: required("CLIENT_ORIGIN")?,
        })
    }

    /// Configuration pointing every upstream at `base_url`, for tests
    #[cfg(test)]
    pub fn for_tests(base_url: &str) -> Self {
        Self {
            server_addr: "127.0.0.1:0".parse().expect("static address"),
            log_level: "debug".to_string(),
            log_json: false,
            supabase_url: base_url.to_string(),
            supabase_service_role_key: "service-role".to_string(),
            supabase_jwt_secret: "jwt-secret".to_string(),
            esri_api_key: Some("esri-key".to_string()),
            esri_geocode_url: format!("{}/esri", base_url),
            esri_min_score: 80.0,
            census_api_key: None,
            census_geocoder_url: format!("{}/geocoder", base_url),
            census_api_url: format!("{}/data", base_url),
            census_acs_year: 2022,
            census_cache_ttl_days: 30,
            allow_mock_fallback: false,
            lookup_rate_limit: 100,
            request_timeout_secs: 5,
            stripe_secret_key: Some("sk_test".to_string()),
            stripe_webhook_secret: Some("whsec_test".to_string()),
            stripe_api_url: format!("{}/stripe", base_url),
            client_origin: "http://localhost:5173".to_string(),
        }
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

/// Unset and blank variables are both treated as absent
fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_falls_back_to_default_when_unset() {
        let value: u16 = parsed("LMI_TEST_SURELY_UNSET_VAR", 2022).unwrap();
        assert_eq!(value, 2022);
    }

    #[test]
    fn parsed_rejects_garbage() {
        env::set_var("LMI_TEST_BAD_NUMBER", "thirty");
        let result: Result<i64, _> = parsed("LMI_TEST_BAD_NUMBER", 30);
        assert!(matches!(result, Err(ConfigError::Invalid("LMI_TEST_BAD_NUMBER"))));
        env::remove_var("LMI_TEST_BAD_NUMBER");
    }

    #[test]
    fn blank_optional_is_absent() {
        env::set_var("LMI_TEST_BLANK_KEY", "   ");
        assert!(optional("LMI_TEST_BLANK_KEY").is_none());
        env::remove_var("LMI_TEST_BLANK_KEY");
    }
}
