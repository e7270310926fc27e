//! Stripe webhook handler with signature verification

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::store::subscriptions::{Subscription, SubscriptionUpdate};
use crate::store::supabase::SupabaseError;

type HmacSha256 = Hmac<Sha256>;

/// Signatures older than this are rejected as replays
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Handle Stripe webhook events
pub async fn stripe_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookError> {
    let secret = state
        .config
        .stripe_webhook_secret
        .as_deref()
        .ok_or(WebhookError::NotConfigured)?;

    // Get the Stripe-Signature header
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingSignature)?;

    // Get the raw body as string for verification
    let payload = std::str::from_utf8(&body).map_err(|_| WebhookError::InvalidPayload)?;

    verify_stripe_signature(payload, signature, secret, Utc::now().timestamp())?;

    let event: StripeEvent = serde_json::from_str(payload).map_err(|e| {
        error!(error = %e, "Failed to parse Stripe event");
        WebhookError::InvalidPayload
    })?;

    info!(
        event_type = %event.event_type,
        event_id = %event.id,
        "Received Stripe webhook"
    );

    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let session: CheckoutSessionData = event.object()?;
            handle_checkout_completed(&state, session).await?;
        }
        "customer.subscription.updated" => {
            let sub: SubscriptionData = event.object()?;
            let update = SubscriptionUpdate {
                status: sub.status.clone(),
                current_period_end: sub.period_end(),
            };
            apply_update(&state, &sub.id, update).await?;
        }
        "customer.subscription.deleted" => {
            let sub: SubscriptionData = event.object()?;
            let update = SubscriptionUpdate {
                status: "canceled".to_string(),
                current_period_end: sub.period_end(),
            };
            apply_update(&state, &sub.id, update).await?;
        }
        "invoice.payment_failed" => {
            let invoice: InvoiceData = event.object()?;
            match invoice.subscription {
                Some(sub_id) => {
                    warn!(subscription_id = %sub_id, "Subscription payment failed");
                    let update = SubscriptionUpdate {
                        status: "past_due".to_string(),
                        current_period_end: None,
                    };
                    apply_update(&state, &sub_id, update).await?;
                }
                None => info!("Payment failed for invoice without subscription"),
            }
        }
        _ => {
            info!(event_type = %event.event_type, "Unhandled event type");
        }
    }

    Ok(StatusCode::OK)
}

/// Verify Stripe webhook signature against `now` (Unix seconds)
pub fn verify_stripe_signature(
    payload: &str,
    signature_header: &str,
    secret: &str,
    now: i64,
) -> Result<(), WebhookError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        let mut kv = part.trim().splitn(2, '=');
        if let (Some(key), Some(value)) = (kv.next(), kv.next()) {
            match key {
                "t" => timestamp = Some(value),
                "v1" => signatures.push(value),
                _ => {}
            }
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::InvalidSignature)?;
    if signatures.is_empty() {
        return Err(WebhookError::InvalidSignature);
    }

    let signed_payload = format!("{}.{}", timestamp, payload);

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(signed_payload.as_bytes());

    let verified = signatures.iter().any(|sig| {
        hex::decode(sig)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });
    if !verified {
        return Err(WebhookError::InvalidSignature);
    }

    let ts: i64 = timestamp.parse().map_err(|_| WebhookError::InvalidSignature)?;
    if (now - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        warn!(timestamp = ts, "Webhook timestamp outside tolerance");
        return Err(WebhookError::StaleSignature);
    }

    Ok(())
}

/// Record a completed subscription checkout
async fn handle_checkout_completed(
    state: &AppState,
    session: CheckoutSessionData,
) -> Result<(), WebhookError> {
    info!(session_id = %session.id, "Processing checkout completion");

    if session.mode.as_deref() != Some("subscription") {
        info!(session_id = %session.id, "Ignoring non-subscription checkout");
        return Ok(());
    }

    let user_id: Uuid = session
        .metadata
        .get("user_id")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            error!("Missing user_id in session metadata");
            WebhookError::InvalidMetadata
        })?;

    let plan_id: Option<Uuid> = session.metadata.get("plan_id").and_then(|s| s.parse().ok());

    // Retried or late deliveries: once the row tracks this subscription, later
    // lifecycle events own its status
    if let Some(existing) = state.subscription_store.get_for_user(user_id).await? {
        if existing.stripe_subscription_id.is_some()
            && existing.stripe_subscription_id == session.subscription
        {
            info!(
                session_id = %session.id,
                status = %existing.status,
                "Subscription already recorded"
            );
            return Ok(());
        }
    }

    state
        .subscription_store
        .upsert(&Subscription {
            user_id,
            plan_id,
            stripe_customer_id: session.customer,
            stripe_subscription_id: session.subscription,
            status: "active".to_string(),
            current_period_end: None,
        })
        .await?;

    info!(user_id = %user_id, session_id = %session.id, "Subscription activated");
    Ok(())
}

async fn apply_update(
    state: &AppState,
    stripe_subscription_id: &str,
    update: SubscriptionUpdate,
) -> Result<(), WebhookError> {
    info!(
        subscription_id = %stripe_subscription_id,
        status = %update.status,
        "Updating subscription status"
    );
    state
        .subscription_store
        .update_by_stripe_id(stripe_subscription_id, &update)
        .await?;
    Ok(())
}

// ============================================================================
// Stripe Event Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct StripeEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

impl StripeEvent {
    fn object<T: serde::de::DeserializeOwned>(&self) -> Result<T, WebhookError> {
        serde_json::from_value(self.data.object.clone()).map_err(|e| {
            error!(event_id = %self.id, error = %e, "Unexpected Stripe object shape");
            WebhookError::InvalidPayload
        })
    }
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionData {
    id: String,
    mode: Option<String>,
    customer: Option<String>,
    subscription: Option<String>,
    #[serde(default)]
    metadata: std::collections::HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionData {
    id: String,
    status: String,
    current_period_end: Option<i64>,
}

impl SubscriptionData {
    fn period_end(&self) -> Option<DateTime<Utc>> {
        self.current_period_end
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
    }
}

#[derive(Debug, Deserialize)]
struct InvoiceData {
    subscription: Option<String>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Webhook secret is not configured")]
    NotConfigured,

    #[error("Missing Stripe-Signature header")]
    MissingSignature,

    #[error("Invalid request payload")]
    InvalidPayload,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Webhook signature timestamp outside tolerance")]
    StaleSignature,

    #[error("Invalid metadata in session")]
    InvalidMetadata,

    #[error("Database error: {0}")]
    Database(#[from] SupabaseError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            WebhookError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            WebhookError::MissingSignature => StatusCode::BAD_REQUEST,
            WebhookError::InvalidPayload => StatusCode::BAD_REQUEST,
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::StaleSignature => StatusCode::UNAUTHORIZED,
            WebhookError::InvalidMetadata => StatusCode::BAD_REQUEST,
            WebhookError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
pub(crate) fn sign_payload(payload: &str, secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key");
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}
