//! Tract income cache: in-process map in front of the `census_cache` table
//!
//! Rows live for a fixed TTL (30 days by default). Cache failures are
//! logged and treated as misses so a broken cache never fails a lookup.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::store::supabase::{SupabaseClient, SupabaseError};

use super::{TractId, TractIncome};

const TABLE: &str = "census_cache";

#[derive(Debug, Clone)]
struct MemoryEntry {
    income: TractIncome,
    expires_at: DateTime<Utc>,
}

/// Row shape of `census_cache`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CensusCacheEntry {
    pub tract_id: TractId,
    pub data: TractIncome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

/// Rows removed by a purge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub memory: usize,
    pub database: usize,
}

#[derive(Clone)]
pub struct CensusCache {
    supabase: SupabaseClient,
    memory: Arc<DashMap<TractId, MemoryEntry>>,
    ttl: Duration,
}

impl CensusCache {
    pub fn new(supabase: SupabaseClient, ttl_days: i64) -> Self {
        Self {
            supabase,
            memory: Arc::new(DashMap::new()),
            ttl: Duration::days(ttl_days.max(1)),
        }
    }

    /// Entries currently held in process
    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    /// Look up a live (unexpired) entry
    pub async fn get(&self, tract: &TractId) -> Option<TractIncome> {
        let now = Utc::now();

        if let Some(entry) = self.memory.get(tract) {
            if entry.expires_at > now {
                debug!(tract_id = %tract, "census cache memory hit");
                return Some(entry.income.clone());
            }
        }
        // Expired in memory; drop it before consulting the table
        self.memory.remove_if(tract, |_, e| e.expires_at <= now);

        match self.fetch_row(tract, now).await {
            Ok(Some(row)) => {
                debug!(tract_id = %tract, expires_at = %row.expires_at, "census cache table hit");
                self.memory.insert(
                    *tract,
                    MemoryEntry { income: row.data.clone(), expires_at: row.expires_at },
                );
                Some(row.data)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(tract_id = %tract, error = %e, "census cache read failed");
                None
            }
        }
    }

    /// Store an entry for the configured TTL
    pub async fn put(&self, income: &TractIncome) {
        let now = Utc::now();
        let expires_at = now + self.ttl;

        self.memory.insert(
            income.tract_id,
            MemoryEntry { income: income.clone(), expires_at },
        );

        let row = CensusCacheEntry {
            tract_id: income.tract_id,
            data: income.clone(),
            created_at: Some(now),
            expires_at,
        };

        if let Err(e) = self.supabase.upsert(TABLE, &row, "tract_id").await {
            warn!(tract_id = %income.tract_id, error = %e, "census cache write failed");
        }
    }

    /// Drop expired entries from memory and the table
    pub async fn purge_expired(&self) -> Result<PurgeReport, SupabaseError> {
        let now = Utc::now();

        let before = self.memory.len();
        self.memory.retain(|_, e| e.expires_at > now);
        let memory = before.saturating_sub(self.memory.len());

        let query = format!("expires_at=lt.{}&select=tract_id", timestamp_param(now));
        let database = self.supabase.delete(TABLE, &query).await?;

        info!(memory, database, "purged expired census cache entries");
        Ok(PurgeReport { memory, database })
    }

    async fn fetch_row(
        &self,
        tract: &TractId,
        now: DateTime<Utc>,
    ) -> Result<Option<CensusCacheEntry>, SupabaseError> {
        let query = format!(
            "tract_id=eq.{}&expires_at=gt.{}&select=tract_id,data,created_at,expires_at&limit=1",
            tract,
            timestamp_param(now)
        );
        let rows: Vec<CensusCacheEntry> = self.supabase.get(TABLE, &query).await?;
        // Guard against clock skew between us and the database
        Ok(rows.into_iter().find(|r| r.expires_at > now))
    }

    #[cfg(test)]
    fn insert_memory(&self, income: TractIncome, expires_at: DateTime<Utc>) {
        self.memory.insert(income.tract_id, MemoryEntry { income, expires_at });
    }
}

/// UTC timestamp without a '+' offset, safe to drop into a query string
fn timestamp_param(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tract() -> TractId {
        "36061000100".parse().unwrap()
    }

    fn income() -> TractIncome {
        TractIncome::classify(tract(), Some(40_000.0), Some(100_000.0), 2022)
    }

    fn cache(server: &MockServer) -> CensusCache {
        let supabase = SupabaseClient::new(&Config::for_tests(&server.uri()));
        CensusCache::new(supabase, 30)
    }

    #[tokio::test]
    async fn memory_hit_skips_table() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let cache = cache(&server);
        cache.insert_memory(income(), Utc::now() + Duration::days(1));

        let hit = cache.get(&tract()).await.unwrap();
        assert_eq!(hit.median_income, Some(40_000.0));
    }

    #[tokio::test]
    async fn expired_memory_entry_falls_through_to_table() {
        let server = MockServer::start().await;
        let expires_at = Utc::now() + Duration::days(10);
        Mock::given(method("GET"))
            .and(path("/rest/v1/census_cache"))
            .and(query_param("tract_id", "eq.36061000100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "tract_id": "36061000100",
                "data": income(),
                "expires_at": expires_at,
            }])))
            .expect(1)
            .mount(&server)
            .await;

        let cache = cache(&server);
        cache.insert_memory(income(), Utc::now() - Duration::seconds(1));

        assert!(cache.get(&tract()).await.is_some());
        // Table hit repopulates memory, so the second read stays local
        assert!(cache.get(&tract()).await.is_some());
        assert_eq!(cache.memory_len(), 1);
    }

    #[tokio::test]
    async fn stale_table_row_is_a_miss() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/census_cache"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "tract_id": "36061000100",
                "data": income(),
                "expires_at": Utc::now() - Duration::hours(1),
            }])))
            .mount(&server)
            .await;

        assert!(cache(&server).get(&tract()).await.is_none());
    }

    #[tokio::test]
    async fn read_failure_is_a_miss() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        assert!(cache(&server).get(&tract()).await.is_none());
    }

    #[tokio::test]
    async fn put_upserts_and_remembers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/census_cache"))
            .and(query_param("on_conflict", "tract_id"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let cache = cache(&server);
        cache.put(&income()).await;
        assert_eq!(cache.memory_len(), 1);
        assert!(cache.get(&tract()).await.is_some());
    }

    #[tokio::test]
    async fn purge_drops_expired_entries() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/census_cache"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{"tract_id": "01001020100"}])),
            )
            .mount(&server)
            .await;

        let cache = cache(&server);
        cache.insert_memory(income(), Utc::now() - Duration::minutes(5));
        let mut fresh = income();
        fresh.tract_id = "01001020200".parse().unwrap();
        cache.insert_memory(fresh, Utc::now() + Duration::days(3));

        let report = cache.purge_expired().await.unwrap();
        assert_eq!(report, PurgeReport { memory: 1, database: 1 });
        assert_eq!(cache.memory_len(), 1);
    }

    #[test]
    fn ttl_is_at_least_a_day() {
        let supabase = SupabaseClient::new(&Config::for_tests("http://127.0.0.1:9"));
        assert_eq!(CensusCache::new(supabase.clone(), 30).ttl, Duration::days(30));
        assert_eq!(CensusCache::new(supabase, 0).ttl, Duration::days(1));
    }
}
