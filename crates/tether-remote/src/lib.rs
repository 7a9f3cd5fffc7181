//! HTTP adapters for the three remote collaborators.
//!
//! Implements the `tether-core` provider traits over reqwest. Each client
//! maps HTTP outcomes onto the per-service error enums: 401 is a
//! credential failure, 404 a miss, 409 a duplicate, and everything
//! transport-shaped is `Unavailable`. Retry policy lives in the engine;
//! here there is only the per-call timeout.

mod config;
mod entitlement;
mod identity;
mod record;

pub mod error;

pub use config::RemoteConfig;
pub use entitlement::BillingClient;
pub use error::{Error, Result};
pub use identity::IdentityClient;
pub use record::RecordClient;

#[cfg(test)]
mod tests;
