//! Codec between [`LocalSnapshot`] and the key/value local store.
//!
//! Each logical field lives under its own fixed key as compact JSON, so
//! single-field updates (profile edit, entitlement refresh) touch one key
//! while promote/sign-in rewrite the whole set in one batch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tether_core::{
  entitlement::EntitlementSnapshot,
  error::{Error, Result},
  identity::Identity,
  record::{LocalSnapshot, Profile},
  store::{LocalStore, keys},
};

/// Sync bookkeeping stored under [`keys::SYNC`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub(crate) struct SyncState {
  pub dirty:          bool,
  pub last_synced_at: Option<DateTime<Utc>>,
}

/// Guest-only bookkeeping stored under [`keys::GUEST`]; cleared by
/// promotion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct GuestMeta {
  pub created_at: DateTime<Utc>,
}

fn decode<T: DeserializeOwned>(bytes: Option<Vec<u8>>) -> Result<Option<T>> {
  bytes
    .map(|b| serde_json::from_slice(&b))
    .transpose()
    .map_err(Error::from)
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
  Ok(serde_json::to_vec(value)?)
}

pub(crate) async fn read_identity<S: LocalStore>(
  store: &S,
) -> Result<Option<Identity>> {
  decode(store.get(keys::IDENTITY).await.map_err(Error::store)?)
}

/// Assemble the full snapshot. `None` when no identity has ever been
/// initialised on this device.
pub(crate) async fn read_snapshot<S: LocalStore>(
  store: &S,
) -> Result<Option<LocalSnapshot>> {
  let values = store
    .multi_get(&[
      keys::IDENTITY,
      keys::PROFILE,
      keys::PAYLOAD,
      keys::ENTITLEMENT,
      keys::SYNC,
    ])
    .await
    .map_err(Error::store)?;
  let mut values = values.into_iter();

  let Some(identity) = decode::<Identity>(values.next().flatten())? else {
    return Ok(None);
  };
  let profile =
    decode::<Profile>(values.next().flatten())?.unwrap_or_default();
  let payload = decode::<serde_json::Value>(values.next().flatten())?
    .unwrap_or(serde_json::Value::Null);
  let entitlement = decode::<EntitlementSnapshot>(values.next().flatten())?
    .unwrap_or_default();
  let sync = decode::<SyncState>(values.next().flatten())?.unwrap_or_default();

  Ok(Some(LocalSnapshot {
    identity,
    profile,
    payload,
    entitlement,
    last_synced_at: sync.last_synced_at,
    dirty: sync.dirty,
  }))
}

/// Persist the whole snapshot in one batch write.
pub(crate) async fn write_snapshot<S: LocalStore>(
  store: &S,
  snap: &LocalSnapshot,
) -> Result<()> {
  let sync =
    SyncState { dirty: snap.dirty, last_synced_at: snap.last_synced_at };
  store
    .multi_set(vec![
      (keys::IDENTITY.into(), encode(&snap.identity)?),
      (keys::PROFILE.into(), encode(&snap.profile)?),
      (keys::PAYLOAD.into(), encode(&snap.payload)?),
      (keys::ENTITLEMENT.into(), encode(&snap.entitlement)?),
      (keys::SYNC.into(), encode(&sync)?),
    ])
    .await
    .map_err(Error::store)
}

pub(crate) async fn write_profile<S: LocalStore>(
  store: &S,
  profile: &Profile,
) -> Result<()> {
  store
    .set(keys::PROFILE, encode(profile)?)
    .await
    .map_err(Error::store)
}

pub(crate) async fn write_payload<S: LocalStore>(
  store: &S,
  payload: &serde_json::Value,
) -> Result<()> {
  store
    .set(keys::PAYLOAD, encode(payload)?)
    .await
    .map_err(Error::store)
}

pub(crate) async fn write_entitlement<S: LocalStore>(
  store: &S,
  entitlement: &EntitlementSnapshot,
) -> Result<()> {
  store
    .set(keys::ENTITLEMENT, encode(entitlement)?)
    .await
    .map_err(Error::store)
}

pub(crate) async fn write_sync<S: LocalStore>(
  store: &S,
  sync: SyncState,
) -> Result<()> {
  store
    .set(keys::SYNC, encode(&sync)?)
    .await
    .map_err(Error::store)
}

pub(crate) async fn write_guest_meta<S: LocalStore>(
  store: &S,
  meta: GuestMeta,
) -> Result<()> {
  store
    .set(keys::GUEST, encode(&meta)?)
    .await
    .map_err(Error::store)
}

pub(crate) async fn clear_guest_meta<S: LocalStore>(store: &S) -> Result<()> {
  store.delete(keys::GUEST).await.map_err(Error::store)
}

/// Remove every engine-owned key (sign-out wipe).
pub(crate) async fn clear_all<S: LocalStore>(store: &S) -> Result<()> {
  for key in keys::ALL {
    store.delete(key).await.map_err(Error::store)?;
  }
  Ok(())
}
