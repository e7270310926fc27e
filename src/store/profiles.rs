//! User profile and role lookups

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::supabase::{SupabaseClient, SupabaseError};

/// Account role as stored on the profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Realtor,
    MortgageProfessional,
    Client,
    /// Any role this service does not know about
    #[serde(other)]
    Unknown,
}

/// User profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub role: Option<UserRole>,
    pub full_name: Option<String>,
}

/// Profile store operations
#[derive(Clone)]
pub struct ProfileStore {
    client: SupabaseClient,
}

impl ProfileStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Get a user profile by ID
    pub async fn get_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, SupabaseError> {
        let query = format!("id=eq.{}&select=id,role,full_name", user_id);
        self.client.get_one("profiles", &query).await
    }

    pub async fn is_admin(&self, user_id: Uuid) -> Result<bool, SupabaseError> {
        Ok(self
            .get_profile(user_id)
            .await?
            .and_then(|p| p.role)
            == Some(UserRole::Admin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn store_with(body: ResponseTemplate) -> (MockServer, ProfileStore) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .respond_with(body)
            .mount(&server)
            .await;
        let store = ProfileStore::new(SupabaseClient::new(&Config::for_tests(&server.uri())));
        (server, store)
    }

    #[tokio::test]
    async fn admin_role_is_detected() {
        let id = Uuid::new_v4();
        let (_server, store) = store_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({"id": id, "role": "admin", "full_name": "Ada"}),
        ))
        .await;
        assert!(store.is_admin(id).await.unwrap());
    }

    #[tokio::test]
    async fn other_roles_and_missing_profiles_are_not_admin() {
        let id = Uuid::new_v4();
        let (_server, store) = store_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({"id": id, "role": "mortgage_professional", "full_name": null}),
        ))
        .await;
        assert!(!store.is_admin(id).await.unwrap());

        let (_server, store) = store_with(ResponseTemplate::new(406)).await;
        assert!(!store.is_admin(id).await.unwrap());
    }

    #[tokio::test]
    async fn unrecognized_role_is_not_admin() {
        let id = Uuid::new_v4();
        let (_server, store) = store_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({"id": id, "role": "loan_officer", "full_name": "Lou"}),
        ))
        .await;
        let profile = store.get_profile(id).await.unwrap().unwrap();
        assert_eq!(profile.role, Some(UserRole::Unknown));
        assert!(!store.is_admin(id).await.unwrap());
    }
}
