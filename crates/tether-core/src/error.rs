//! Error taxonomy surfaced by the engine.
//!
//! Expected failure modes (bad input, duplicate account, wrong password,
//! unreachable service) are typed outcomes, never panics. Unexpected local
//! failures (store, serialization) are wrapped so callers can still render
//! something sensible.

use thiserror::Error;

/// Which remote collaborator a [`Error::RemoteUnavailable`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
  Identity,
  Records,
  Billing,
}

impl std::fmt::Display for Service {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Service::Identity => write!(f, "identity provider"),
      Service::Records => write!(f, "record service"),
      Service::Billing => write!(f, "billing provider"),
    }
  }
}

#[derive(Debug, Error)]
pub enum Error {
  /// Bad email/password shape — failed before any remote call was made.
  #[error("validation failed: {0}")]
  Validation(String),

  /// The promotion target already has an account and the supplied
  /// credentials do not match it.
  #[error("an account already exists for {0}")]
  AlreadyRegistered(String),

  /// Terminal for this attempt; the caller must retry with correct input.
  #[error("invalid credentials")]
  InvalidCredentials,

  /// A remote service could not be reached within the retry budget.
  /// Local state is preserved exactly as it was before the call.
  #[error("{service} unavailable: {reason}")]
  RemoteUnavailable { service: Service, reason: String },

  /// The identity flip committed locally but the backend record write is
  /// still pending; the snapshot stays flagged dirty for background retry.
  #[error("backend record write still pending")]
  PartialMigration,

  #[error("local store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn unavailable(service: Service, reason: impl Into<String>) -> Self {
    Error::RemoteUnavailable { service, reason: reason.into() }
  }

  /// Wrap a [`crate::store::LocalStore`] backend error.
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Error::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
