//! Data store modules for Supabase integration

pub mod addresses;
pub mod profiles;
pub mod subscriptions;
pub mod supabase;

pub use addresses::AddressStore;
pub use profiles::ProfileStore;
pub use subscriptions::SubscriptionStore;
pub use supabase::SupabaseClient;
