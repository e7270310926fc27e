//! Stripe subscription checkout session creation

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::store::supabase::SupabaseError;
use crate::store::SubscriptionStore;

/// Stripe service for billing operations
#[derive(Clone)]
pub struct StripeService {
    client: Client,
    subscriptions: SubscriptionStore,
    stripe_secret_key: Option<String>,
    api_url: String,
    client_origin: String,
}

impl StripeService {
    pub fn new(config: &Config, subscriptions: SubscriptionStore) -> Self {
        // Redirects go to the first configured origin
        let client_origin = config
            .client_origin
            .split(',')
            .next()
            .unwrap_or_default()
            .trim()
            .trim_end_matches('/')
            .to_string();

        Self {
            client: Client::new(),
            subscriptions,
            stripe_secret_key: config.stripe_secret_key.clone(),
            api_url: config.stripe_api_url.trim_end_matches('/').to_string(),
            client_origin,
        }
    }

    /// Create a subscription-mode checkout session for a plan
    pub async fn create_subscription_checkout(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        plan_id: Uuid,
    ) -> Result<CheckoutSessionResponse, StripeError> {
        let secret_key = self
            .stripe_secret_key
            .as_deref()
            .ok_or(StripeError::NotConfigured)?;

        let plan = self
            .subscriptions
            .get_plan(plan_id)
            .await?
            .ok_or(StripeError::PlanNotFound)?;

        let success_url = format!(
            "{}/billing/success?session_id={{CHECKOUT_SESSION_ID}}",
            self.client_origin
        );
        let cancel_url = format!("{}/billing/cancel", self.client_origin);

        let mut form_data: Vec<(&str, String)> = vec![
            ("mode", "subscription".to_string()),
            ("success_url", success_url),
            ("cancel_url", cancel_url),
            ("client_reference_id", user_id.to_string()),
            ("metadata[user_id]", user_id.to_string()),
            ("metadata[plan_id]", plan_id.to_string()),
            ("subscription_data[metadata][user_id]", user_id.to_string()),
        ];

        if let Some(email) = email {
            form_data.push(("customer_email", email.to_string()));
        }

        // Use existing price ID if available, otherwise create recurring price data
        if let Some(price_id) = &plan.stripe_price_id {
            form_data.push(("line_items[0][price]", price_id.clone()));
        } else {
            form_data.push(("line_items[0][price_data][currency]", "usd".to_string()));
            form_data.push(("line_items[0][price_data][unit_amount]", plan.price_cents.to_string()));
            form_data.push(("line_items[0][price_data][recurring][interval]", plan.interval.clone()));
            form_data.push(("line_items[0][price_data][product_data][name]", plan.name.clone()));
        }
        form_data.push(("line_items[0][quantity]", "1".to_string()));

        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.api_url))
            .basic_auth(secret_key, None::<&str>)
            .form(&form_data)
            .send()
            .await
            .map_err(StripeError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StripeError::Api { status: status.as_u16(), body });
        }

        let session: StripeSession = response.json().await.map_err(StripeError::Request)?;
        let url = session.url.ok_or(StripeError::NoSessionUrl)?;

        info!(user_id = %user_id, plan_id = %plan_id, session_id = %session.id, "Created subscription checkout");

        Ok(CheckoutSessionResponse {
            session_id: session.id,
            url,
        })
    }
}

/// Stripe checkout session response
#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
}

/// Response from checkout session creation
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSessionResponse {
    pub session_id: String,
    pub url: String,
}

/// Stripe-related errors
#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    #[error("Billing is not configured")]
    NotConfigured,

    #[error("Database error: {0}")]
    Database(#[from] SupabaseError),

    #[error("Plan not found or inactive")]
    PlanNotFound,

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Stripe API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("No session URL returned")]
    NoSessionUrl,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SupabaseClient;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(config: &Config) -> StripeService {
        let subscriptions = SubscriptionStore::new(SupabaseClient::new(config));
        StripeService::new(config, subscriptions)
    }

    #[tokio::test]
    async fn creates_recurring_session_without_price_id() {
        let server = MockServer::start().await;
        let plan_id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/rest/v1/subscription_plans"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "id": plan_id,
                "name": "Professional",
                "stripe_price_id": null,
                "price_cents": 4900,
                "interval": "month",
                "active": true
            }])))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/stripe/checkout/sessions"))
            .and(header_exists("authorization"))
            .and(body_string_contains("mode=subscription"))
            .and(body_string_contains("recurring%5D%5Binterval%5D=month"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_test_1",
                "url": "https://checkout.stripe.com/c/pay/cs_test_1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = service(&Config::for_tests(&server.uri()))
            .create_subscription_checkout(Uuid::new_v4(), Some("a@b.co"), plan_id)
            .await
            .unwrap();

        assert_eq!(response.session_id, "cs_test_1");
    }

    #[tokio::test]
    async fn unknown_plan_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/subscription_plans"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let err = service(&Config::for_tests(&server.uri()))
            .create_subscription_checkout(Uuid::new_v4(), None, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, StripeError::PlanNotFound));
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let mut config = Config::for_tests("http://127.0.0.1:9");
        config.stripe_secret_key = None;

        let err = service(&config)
            .create_subscription_checkout(Uuid::new_v4(), None, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, StripeError::NotConfigured));
    }
}
