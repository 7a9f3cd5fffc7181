//! The `LocalStore` trait and the fixed logical key names.
//!
//! The trait is implemented by storage backends (e.g.
//! `tether-store-sqlite`). The engine depends on this abstraction, not on
//! any concrete backend. Values are opaque bytes; the engine stores
//! compact JSON under each key.

use std::future::Future;

/// Fixed logical key names under which the engine persists its state.
pub mod keys {
  /// The active [`Identity`](crate::identity::Identity), JSON-encoded.
  pub const IDENTITY: &str = "identity";
  /// [`Profile`](crate::record::Profile) fields.
  pub const PROFILE: &str = "profile";
  /// The opaque application payload blob.
  pub const PAYLOAD: &str = "payload";
  /// The local [`EntitlementSnapshot`](crate::entitlement::EntitlementSnapshot).
  pub const ENTITLEMENT: &str = "entitlement";
  /// Sync bookkeeping: dirty flag and `last_synced_at`.
  pub const SYNC: &str = "sync";
  /// Guest-only bookkeeping; cleared when the guest is promoted.
  pub const GUEST: &str = "guest";

  /// Every key the engine owns, in snapshot read order.
  pub const ALL: [&str; 6] =
    [IDENTITY, PROFILE, PAYLOAD, ENTITLEMENT, SYNC, GUEST];
}

/// Abstraction over durable on-device key/value persistence.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes.
pub trait LocalStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Read one value. Returns `None` if the key was never set.
  fn get<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send + 'a;

  /// Write one value, replacing any previous value.
  fn set<'a>(
    &'a self,
    key: &'a str,
    value: Vec<u8>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Remove one key. Removing an absent key is a no-op.
  fn delete<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Batch read; the result is positionally aligned with `keys`.
  fn multi_get<'a>(
    &'a self,
    keys: &'a [&'a str],
  ) -> impl Future<Output = Result<Vec<Option<Vec<u8>>>, Self::Error>> + Send + 'a;

  /// Batch write, applied atomically where the backend supports it.
  fn multi_set(
    &self,
    entries: Vec<(String, Vec<u8>)>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
