//! Application state shared across routes

use std::sync::Arc;

use crate::billing::StripeService;
use crate::config::Config;
use crate::lmi::LmiService;
use crate::store::{AddressStore, ProfileStore, SubscriptionStore, SupabaseClient};
use crate::util::rate_limit::UserRateLimiter;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub lmi: LmiService,
    pub address_store: AddressStore,
    pub profile_store: ProfileStore,
    pub subscription_store: SubscriptionStore,
    pub stripe: StripeService,
    pub lookup_limiter: UserRateLimiter,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Initialize Supabase client
        let supabase = SupabaseClient::new(&config);

        // Initialize stores
        let address_store = AddressStore::new(supabase.clone());
        let profile_store = ProfileStore::new(supabase.clone());
        let subscription_store = SubscriptionStore::new(supabase.clone());

        // Geocoding, census lookups and the tract cache
        let lmi = LmiService::new(&config, supabase);

        // Initialize Stripe
        let stripe = StripeService::new(&config, subscription_store.clone());

        let lookup_limiter = UserRateLimiter::new(config.lookup_rate_limit);

        Self {
            config,
            lmi,
            address_store,
            profile_store,
            subscription_store,
            stripe,
            lookup_limiter,
        }
    }
}
