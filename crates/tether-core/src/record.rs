//! The backend user record and its local mirror.
//!
//! The engine treats the application payload (goal, progress, onboarding
//! answers) as an uninterpreted JSON blob; only profile and entitlement
//! fields have shape here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{entitlement::EntitlementSnapshot, identity::Identity};

// ─── Profile ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
  pub display_name: Option<String>,
  pub username:     Option<String>,
  /// Reference (URL or storage key) to an avatar, never the bytes.
  pub avatar_url:   Option<String>,
}

/// Partial profile update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePatch {
  pub display_name: Option<String>,
  pub username:     Option<String>,
  pub avatar_url:   Option<String>,
}

impl ProfilePatch {
  pub fn is_empty(&self) -> bool {
    self.display_name.is_none()
      && self.username.is_none()
      && self.avatar_url.is_none()
  }

  /// Merge into an existing profile, field by field.
  pub fn apply_to(&self, profile: &mut Profile) {
    if let Some(name) = &self.display_name {
      profile.display_name = Some(name.clone());
    }
    if let Some(username) = &self.username {
      profile.username = Some(username.clone());
    }
    if let Some(url) = &self.avatar_url {
      profile.avatar_url = Some(url.clone());
    }
  }
}

// ─── Backend record ──────────────────────────────────────────────────────────

/// The canonical backend-of-record resource. Exactly one exists per
/// registered identity; none exists for guests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
  pub provider_id:    String,
  pub email:          String,
  pub profile:        Profile,
  /// Opaque application payload; the engine never looks inside.
  pub payload:        serde_json::Value,
  pub entitlement:    EntitlementSnapshot,
  pub last_synced_at: Option<DateTime<Utc>>,
}

impl UserRecord {
  /// A record with no migrated state — used when sign-in self-heals a
  /// missing backend record.
  pub fn empty(provider_id: &str, email: &str) -> Self {
    UserRecord {
      provider_id:    provider_id.to_string(),
      email:          email.to_string(),
      profile:        Profile::default(),
      payload:        serde_json::Value::Null,
      entitlement:    EntitlementSnapshot::free(),
      last_synced_at: None,
    }
  }

  /// The initial record written at promotion: the guest's local state,
  /// wholesale.
  pub fn from_guest(
    provider_id: &str,
    email: &str,
    payload: &GuestPayload,
  ) -> Self {
    UserRecord {
      provider_id:    provider_id.to_string(),
      email:          email.to_string(),
      profile:        payload.profile.clone(),
      payload:        payload.payload.clone(),
      entitlement:    payload.entitlement.clone(),
      last_synced_at: Some(Utc::now()),
    }
  }
}

/// Partial record update; `None` fields are omitted from the wire and
/// left untouched server-side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub profile:        Option<Profile>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub payload:        Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub entitlement:    Option<EntitlementSnapshot>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_synced_at: Option<DateTime<Utc>>,
}

// ─── Migration snapshot ──────────────────────────────────────────────────────

/// Immutable copy of the guest's local state, captured once at the start
/// of promotion so a concurrent local mutation mid-promotion cannot
/// corrupt the migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestPayload {
  pub profile:     Profile,
  pub payload:     serde_json::Value,
  pub entitlement: EntitlementSnapshot,
}

// ─── Local mirror ────────────────────────────────────────────────────────────

/// The decoded view of everything the engine keeps in the local store.
///
/// When `identity` is registered, local writes are shadow-written
/// best-effort to the backend record; when guest, they stay local.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSnapshot {
  pub identity:       Identity,
  pub profile:        Profile,
  pub payload:        serde_json::Value,
  pub entitlement:    EntitlementSnapshot,
  pub last_synced_at: Option<DateTime<Utc>>,
  /// Set when a remote write failed and needs background retry; cleared
  /// by a successful flush.
  pub dirty:          bool,
}

impl LocalSnapshot {
  /// The snapshot a brand-new guest starts with.
  pub fn new_guest() -> Self {
    LocalSnapshot {
      identity:       Identity::new_guest(),
      profile:        Profile::default(),
      payload:        serde_json::Value::Null,
      entitlement:    EntitlementSnapshot::free(),
      last_synced_at: None,
      dirty:          false,
    }
  }

  /// Capture the migration payload (profile + app payload + entitlement).
  pub fn guest_payload(&self) -> GuestPayload {
    GuestPayload {
      profile:     self.profile.clone(),
      payload:     self.payload.clone(),
      entitlement: self.entitlement.clone(),
    }
  }

  /// Replace every mirrored field with the remote record's. Used on
  /// sign-in, where remote is authoritative and guest-era state is
  /// intentionally discarded.
  pub fn overwrite_from(&mut self, record: &UserRecord) {
    self.identity = Identity::Registered {
      provider_id: record.provider_id.clone(),
      email:       record.email.clone(),
    };
    self.profile = record.profile.clone();
    self.payload = record.payload.clone();
    self.entitlement = record.entitlement.clone();
    self.last_synced_at = record.last_synced_at;
    self.dirty = false;
  }
}
