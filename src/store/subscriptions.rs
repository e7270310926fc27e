//! Subscription plans and per-user subscription state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::supabase::{SupabaseClient, SupabaseError};

/// Plan offered on the pricing page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: Uuid,
    pub name: String,
    pub stripe_price_id: Option<String>,
    pub price_cents: i64,
    /// Billing interval ("month" or "year")
    pub interval: String,
    pub active: bool,
}

/// A user's subscription as mirrored from Stripe
///
/// Unset fields are left out of writes so a merge-upsert keeps whatever
/// an earlier event already stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_subscription_id: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<DateTime<Utc>>,
}

/// Status change coming from a webhook
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionUpdate {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<DateTime<Utc>>,
}

/// Subscription store operations
#[derive(Clone)]
pub struct SubscriptionStore {
    client: SupabaseClient,
}

impl SubscriptionStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Active plan by ID
    pub async fn get_plan(&self, plan_id: Uuid) -> Result<Option<SubscriptionPlan>, SupabaseError> {
        let query = format!("id=eq.{}&active=eq.true", plan_id);
        let plans: Vec<SubscriptionPlan> = self.client.get("subscription_plans", &query).await?;
        Ok(plans.into_iter().next())
    }

    pub async fn get_for_user(&self, user_id: Uuid) -> Result<Option<Subscription>, SupabaseError> {
        let query = format!("user_id=eq.{}", user_id);
        self.client.get_one("subscriptions", &query).await
    }

    /// One row per user
    pub async fn upsert(&self, subscription: &Subscription) -> Result<(), SupabaseError> {
        self.client
            .upsert("subscriptions", subscription, "user_id")
            .await
    }

    pub async fn update_by_stripe_id(
        &self,
        stripe_subscription_id: &str,
        update: &SubscriptionUpdate,
    ) -> Result<(), SupabaseError> {
        let query = format!("stripe_subscription_id=eq.{}", stripe_subscription_id);
        self.client.update("subscriptions", &query, update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn inactive_or_missing_plan_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/subscription_plans"))
            .and(query_param("active", "eq.true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let store = SubscriptionStore::new(SupabaseClient::new(&Config::for_tests(&server.uri())));
        assert!(store.get_plan(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_leaves_unset_fields_alone() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path("/rest/v1/subscriptions"))
            .and(query_param("on_conflict", "user_id"))
            .and(body_json(serde_json::json!({
                "user_id": user_id,
                "stripe_subscription_id": "sub_1",
                "status": "active"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let store = SubscriptionStore::new(SupabaseClient::new(&Config::for_tests(&server.uri())));
        store
            .upsert(&Subscription {
                user_id,
                plan_id: None,
                stripe_customer_id: None,
                stripe_subscription_id: Some("sub_1".to_string()),
                status: "active".to_string(),
                current_period_end: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_omits_missing_period_end() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/subscriptions"))
            .and(query_param("stripe_subscription_id", "eq.sub_123"))
            .and(body_json(serde_json::json!({"status": "canceled"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let store = SubscriptionStore::new(SupabaseClient::new(&Config::for_tests(&server.uri())));
        store
            .update_by_stripe_id(
                "sub_123",
                &SubscriptionUpdate { status: "canceled".to_string(), current_period_end: None },
            )
            .await
            .unwrap();
    }
}
