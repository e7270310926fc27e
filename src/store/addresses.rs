//! Saved address lookups per user

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::census::TractId;
use crate::lmi::IncomeCategory;

use super::supabase::{SupabaseClient, SupabaseError};

const TABLE: &str = "saved_addresses";

/// Saved address row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedAddress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub address: String,
    pub tract_id: Option<TractId>,
    pub is_eligible: Option<bool>,
    pub income_category: Option<IncomeCategory>,
    pub notes: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// New saved address for insertion
#[derive(Debug, Clone, Serialize)]
pub struct NewSavedAddress {
    pub user_id: Uuid,
    pub address: String,
    pub tract_id: Option<TractId>,
    pub is_eligible: Option<bool>,
    pub income_category: Option<IncomeCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Saved address store operations
#[derive(Clone)]
pub struct AddressStore {
    client: SupabaseClient,
}

impl AddressStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// All addresses a user saved, newest first
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<SavedAddress>, SupabaseError> {
        let query = format!("user_id=eq.{}&order=created_at.desc", user_id);
        self.client.get(TABLE, &query).await
    }

    pub async fn save(&self, address: &NewSavedAddress) -> Result<SavedAddress, SupabaseError> {
        self.client.insert(TABLE, address).await
    }

    /// Delete one of the user's addresses; false if it did not exist or is not theirs
    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, SupabaseError> {
        let query = format!("id=eq.{}&user_id=eq.{}", id, user_id);
        Ok(self.client.delete(TABLE, &query).await? > 0)
    }
}
