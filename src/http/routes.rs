//! HTTP route definitions

use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    extract::{
        rejection::{JsonRejection, PathRejection},
        Extension, Path, State,
    },
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{delete, get, post},
    BoxError, Router,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use tower::{timeout::error::Elapsed, timeout::TimeoutLayer, ServiceBuilder};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::billing::webhook::stripe_webhook_handler;
use crate::billing::StripeError;
use crate::census::{cache::PurgeReport, TractId, TractIncome};
use crate::geocode::{Coordinates, GeocodeError, GeocodeMatch};
use crate::http::middleware::{require_auth, AuthenticatedUser};
use crate::lmi::{DataSource, LmiError, LmiResult};
use crate::store::addresses::{NewSavedAddress, SavedAddress};
use crate::store::subscriptions::Subscription;
use crate::store::supabase::SupabaseError;
use crate::util::time::uptime_secs;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/billing/webhook", post(stripe_webhook_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/lmi/check", post(lmi_check_handler))
        .route("/lmi/check-coordinates", post(lmi_coordinates_handler))
        .route("/geocode", post(geocode_handler))
        .route("/census/tracts/:tract_id", get(tract_handler))
        .route("/addresses", get(list_addresses_handler).post(save_address_handler))
        .route("/addresses/:id", delete(delete_address_handler))
        .route("/billing/subscription", get(subscription_handler))
        .route("/billing/checkout", post(checkout_handler))
        .route("/admin/cache/purge", post(purge_cache_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .layer(TimeoutLayer::new(timeout)),
        )
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn handle_middleware_error(err: BoxError) -> AppError {
    if err.is::<Elapsed>() {
        AppError::Timeout
    } else {
        AppError::Internal(err.to_string())
    }
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    cached_tracts: usize,
    mock_fallback: bool,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        cached_tracts: state.lmi.cache().memory_len(),
        mock_fallback: state.config.allow_mock_fallback,
    })
}

// ============================================================================
// LMI endpoints
// ============================================================================

#[derive(Deserialize)]
struct AddressRequest {
    address: String,
}

#[derive(Deserialize)]
struct CoordinatesRequest {
    lat: f64,
    lon: f64,
}

fn check_rate_limit(state: &AppState, user_id: Uuid) -> Result<(), AppError> {
    if state.lookup_limiter.check(user_id) {
        Ok(())
    } else {
        warn!(user_id = %user_id, "Lookup rate limit exceeded");
        Err(AppError::RateLimited)
    }
}

async fn lmi_check_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    WithRejection(Json(req), _): WithRejection<Json<AddressRequest>, AppError>,
) -> Result<Json<LmiResult>, AppError> {
    check_rate_limit(&state, auth.user_id)?;
    let result = state.lmi.check_address(&req.address).await?;
    Ok(Json(result))
}

async fn lmi_coordinates_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    WithRejection(Json(req), _): WithRejection<Json<CoordinatesRequest>, AppError>,
) -> Result<Json<LmiResult>, AppError> {
    check_rate_limit(&state, auth.user_id)?;
    let result = state
        .lmi
        .check_coordinates(Coordinates { lat: req.lat, lon: req.lon })
        .await?;
    Ok(Json(result))
}

async fn geocode_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    WithRejection(Json(req), _): WithRejection<Json<AddressRequest>, AppError>,
) -> Result<Json<GeocodeMatch>, AppError> {
    check_rate_limit(&state, auth.user_id)?;
    Ok(Json(state.lmi.geocode(&req.address).await?))
}

#[derive(Serialize)]
struct TractResponse {
    #[serde(flatten)]
    income: TractIncome,
    data_source: DataSource,
}

async fn tract_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    WithRejection(Path(tract_id), _): WithRejection<Path<String>, AppError>,
) -> Result<Json<TractResponse>, AppError> {
    let tract: TractId = tract_id
        .parse()
        .map_err(|e| AppError::BadRequest(format!("{}", e)))?;
    check_rate_limit(&state, auth.user_id)?;

    let (income, data_source) = state.lmi.tract_income(&tract).await?;
    Ok(Json(TractResponse { income, data_source }))
}

// ============================================================================
// Saved address endpoints
// ============================================================================

#[derive(Deserialize)]
struct SaveAddressRequest {
    address: String,
    #[serde(default)]
    notes: Option<String>,
}

async fn list_addresses_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<SavedAddress>>, AppError> {
    Ok(Json(state.address_store.list(auth.user_id).await?))
}

async fn save_address_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    WithRejection(Json(req), _): WithRejection<Json<SaveAddressRequest>, AppError>,
) -> Result<(StatusCode, Json<SavedAddress>), AppError> {
    check_rate_limit(&state, auth.user_id)?;
    let result = state.lmi.check_address(&req.address).await?;

    let saved = state
        .address_store
        .save(&NewSavedAddress {
            user_id: auth.user_id,
            address: req.address.trim().to_string(),
            tract_id: Some(result.tract_id),
            is_eligible: Some(result.is_eligible),
            income_category: Some(result.income_category),
            notes: req.notes.filter(|n| !n.trim().is_empty()),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(saved)))
}

async fn delete_address_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, AppError>,
) -> Result<StatusCode, AppError> {
    if state.address_store.delete(auth.user_id, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Saved address not found".to_string()))
    }
}

// ============================================================================
// Billing endpoints
// ============================================================================

#[derive(Deserialize)]
struct CheckoutRequest {
    plan_id: Uuid,
}

#[derive(Serialize)]
struct CheckoutResponse {
    session_id: String,
    url: String,
}

async fn subscription_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<Option<Subscription>>, AppError> {
    Ok(Json(state.subscription_store.get_for_user(auth.user_id).await?))
}

async fn checkout_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    WithRejection(Json(req), _): WithRejection<Json<CheckoutRequest>, AppError>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let response = state
        .stripe
        .create_subscription_checkout(auth.user_id, auth.claims.email.as_deref(), req.plan_id)
        .await?;

    Ok(Json(CheckoutResponse {
        session_id: response.session_id,
        url: response.url,
    }))
}

// ============================================================================
// Admin endpoints
// ============================================================================

async fn purge_cache_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<PurgeReport>, AppError> {
    if !state.profile_store.is_admin(auth.user_id).await? {
        return Err(AppError::Forbidden);
    }
    Ok(Json(state.lmi.cache().purge_expired().await?))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Too many requests")]
    RateLimited,

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<LmiError> for AppError {
    fn from(e: LmiError) -> Self {
        match e {
            LmiError::InvalidAddress(_) => AppError::BadRequest(e.to_string()),
            LmiError::Geocode(GeocodeError::InvalidCoordinates { .. }) => {
                AppError::BadRequest(e.to_string())
            }
            LmiError::AddressNotFound | LmiError::TractNotFound => AppError::NotFound(e.to_string()),
            LmiError::Geocode(_) | LmiError::Census(_) => AppError::Upstream(e.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<SupabaseError> for AppError {
    fn from(e: SupabaseError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<StripeError> for AppError {
    fn from(e: StripeError) -> Self {
        match e {
            StripeError::NotConfigured => AppError::Unavailable(e.to_string()),
            StripeError::PlanNotFound => AppError::NotFound(e.to_string()),
            StripeError::Api { .. } | StripeError::Request(_) | StripeError::NoSessionUrl => {
                AppError::Upstream(e.to_string())
            }
            StripeError::Database(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "Too many requests".to_string()),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "Request timed out".to_string()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Internal(msg) => {
                error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
