//! Trait seams for the three remote collaborators.
//!
//! Implemented over HTTP in `tether-remote`; the engine's tests implement
//! them with scripted in-memory fakes. Each service gets its own error
//! enum so logical outcomes (already exists, wrong password, not found)
//! stay distinguishable from transport failure.

use std::future::Future;

use thiserror::Error;

use crate::{
  entitlement::EntitlementSnapshot,
  record::{RecordPatch, UserRecord},
};

/// An authenticated session at the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSession {
  pub provider_id: String,
  pub email:       String,
}

// ─── Per-service errors ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum IdentityError {
  #[error("an account with this email already exists")]
  AlreadyExists,

  #[error("invalid credentials")]
  InvalidCredentials,

  #[error("identity provider unavailable: {0}")]
  Unavailable(String),
}

#[derive(Debug, Error)]
pub enum RecordError {
  #[error("record already exists")]
  AlreadyExists,

  #[error("record not found")]
  NotFound,

  #[error("record service unavailable: {0}")]
  Unavailable(String),
}

#[derive(Debug, Error)]
pub enum EntitlementError {
  #[error("billing provider unavailable: {0}")]
  Unavailable(String),
}

/// Whether retrying an operation could plausibly change the outcome.
/// Logical outcomes (already exists, wrong password) never are.
pub trait Transient {
  fn is_transient(&self) -> bool;
}

impl Transient for IdentityError {
  fn is_transient(&self) -> bool {
    matches!(self, IdentityError::Unavailable(_))
  }
}

impl Transient for RecordError {
  fn is_transient(&self) -> bool {
    matches!(self, RecordError::Unavailable(_))
  }
}

impl Transient for EntitlementError {
  fn is_transient(&self) -> bool {
    matches!(self, EntitlementError::Unavailable(_))
  }
}

// ─── Identity provider ───────────────────────────────────────────────────────

// The traits are object-unfriendly (RPITIT) but compose through shared
// references, so an engine can borrow clients owned elsewhere.

/// Remote identity/auth service: account creation, sign-in, session state.
pub trait IdentityProvider: Send + Sync {
  /// Create a new account. Not idempotent — a duplicate submission
  /// surfaces [`IdentityError::AlreadyExists`], which callers convert
  /// into a sign-in attempt.
  fn create_account<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
  ) -> impl Future<Output = Result<AccountSession, IdentityError>> + Send + 'a;

  fn sign_in<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
  ) -> impl Future<Output = Result<AccountSession, IdentityError>> + Send + 'a;

  fn sign_out(
    &self,
  ) -> impl Future<Output = Result<(), IdentityError>> + Send + '_;

  fn current_session(
    &self,
  ) -> impl Future<Output = Result<Option<AccountSession>, IdentityError>> + Send + '_;
}

impl<T: IdentityProvider> IdentityProvider for &T {
  fn create_account<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
  ) -> impl Future<Output = Result<AccountSession, IdentityError>> + Send + 'a
  {
    (**self).create_account(email, password)
  }

  fn sign_in<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
  ) -> impl Future<Output = Result<AccountSession, IdentityError>> + Send + 'a
  {
    (**self).sign_in(email, password)
  }

  fn sign_out(
    &self,
  ) -> impl Future<Output = Result<(), IdentityError>> + Send + '_ {
    (**self).sign_out()
  }

  fn current_session(
    &self,
  ) -> impl Future<Output = Result<Option<AccountSession>, IdentityError>> + Send + '_
  {
    (**self).current_session()
  }
}

// ─── Backend record service ──────────────────────────────────────────────────

/// Remote CRUD service for the single user-record resource.
pub trait RecordService: Send + Sync {
  /// Create the record. Fails with [`RecordError::AlreadyExists`] if one
  /// is already present for this identity; callers then issue an
  /// [`update`](RecordService::update) instead.
  fn create<'a>(
    &'a self,
    record: &'a UserRecord,
  ) -> impl Future<Output = Result<UserRecord, RecordError>> + Send + 'a;

  fn get_by_id<'a>(
    &'a self,
    provider_id: &'a str,
  ) -> impl Future<Output = Result<Option<UserRecord>, RecordError>> + Send + 'a;

  /// Fallback lookup for accounts created before an id linkage existed.
  fn get_by_email<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<UserRecord>, RecordError>> + Send + 'a;

  fn update<'a>(
    &'a self,
    provider_id: &'a str,
    patch: &'a RecordPatch,
  ) -> impl Future<Output = Result<UserRecord, RecordError>> + Send + 'a;
}

impl<T: RecordService> RecordService for &T {
  fn create<'a>(
    &'a self,
    record: &'a UserRecord,
  ) -> impl Future<Output = Result<UserRecord, RecordError>> + Send + 'a {
    (**self).create(record)
  }

  fn get_by_id<'a>(
    &'a self,
    provider_id: &'a str,
  ) -> impl Future<Output = Result<Option<UserRecord>, RecordError>> + Send + 'a
  {
    (**self).get_by_id(provider_id)
  }

  fn get_by_email<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<UserRecord>, RecordError>> + Send + 'a
  {
    (**self).get_by_email(email)
  }

  fn update<'a>(
    &'a self,
    provider_id: &'a str,
    patch: &'a RecordPatch,
  ) -> impl Future<Output = Result<UserRecord, RecordError>> + Send + 'a {
    (**self).update(provider_id, patch)
  }
}

// ─── Entitlement provider ────────────────────────────────────────────────────

/// Remote billing/subscription service.
pub trait EntitlementProvider: Send + Sync {
  fn current_snapshot(
    &self,
  ) -> impl Future<Output = Result<EntitlementSnapshot, EntitlementError>> + Send + '_;

  fn purchase<'a>(
    &'a self,
    plan_id: &'a str,
  ) -> impl Future<Output = Result<EntitlementSnapshot, EntitlementError>> + Send + 'a;

  /// Re-validate past purchases with the billing provider.
  fn restore(
    &self,
  ) -> impl Future<Output = Result<EntitlementSnapshot, EntitlementError>> + Send + '_;

  /// Detach this device from the billing identity.
  fn sign_out(
    &self,
  ) -> impl Future<Output = Result<(), EntitlementError>> + Send + '_;
}

impl<T: EntitlementProvider> EntitlementProvider for &T {
  fn current_snapshot(
    &self,
  ) -> impl Future<Output = Result<EntitlementSnapshot, EntitlementError>> + Send + '_
  {
    (**self).current_snapshot()
  }

  fn purchase<'a>(
    &'a self,
    plan_id: &'a str,
  ) -> impl Future<Output = Result<EntitlementSnapshot, EntitlementError>> + Send + 'a
  {
    (**self).purchase(plan_id)
  }

  fn restore(
    &self,
  ) -> impl Future<Output = Result<EntitlementSnapshot, EntitlementError>> + Send + '_
  {
    (**self).restore()
  }

  fn sign_out(
    &self,
  ) -> impl Future<Output = Result<(), EntitlementError>> + Send + '_ {
    (**self).sign_out()
  }
}
