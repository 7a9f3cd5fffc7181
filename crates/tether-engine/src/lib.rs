//! The Tether reconciliation engine.
//!
//! Orchestrates the local store and the three remote clients (identity
//! provider, backend record service, billing provider) to implement the
//! guest lifecycle, promotion, sign-in restore, entitlement
//! reconciliation, and sign-out.
//!
//! Everything here is written against the trait seams in `tether-core`;
//! no HTTP or database code lives in this crate.

pub mod poll;
pub mod retry;
pub mod session;

mod snapshot;

pub use poll::PollPolicy;
pub use retry::RetryPolicy;
pub use session::{PromoteOutcome, Session};

#[cfg(test)]
mod fakes;
