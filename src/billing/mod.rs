//! Subscription billing through Stripe

pub mod stripe;
pub mod webhook;

pub use stripe::{StripeError, StripeService};
