//! Error type for `tether-remote` client construction.
//!
//! Runtime call failures are expressed through the per-service enums in
//! `tether_core::provider`; this only covers building the HTTP client
//! itself.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("failed to build HTTP client: {0}")]
  Build(#[from] reqwest::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
