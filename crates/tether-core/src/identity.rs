//! Identity — who this device currently belongs to.
//!
//! Exactly one identity is active per device at a time. The only legal
//! transitions are `Guest → Registered` (promotion) and
//! `Registered → Guest` (sign-out, which allocates a brand-new guest).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// The active identity on this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
  /// A locally-generated handle with no cross-device presence. The
  /// `local_id` is generated once per guest session and never reused for
  /// two different guest sessions on the same install.
  Guest { local_id: String },

  /// A durable identity bound to the remote identity provider and a
  /// backend user record.
  Registered { provider_id: String, email: String },
}

impl Identity {
  /// Allocate a fresh guest identity. Collision probability, not
  /// forgeability, is what matters here, so a v4 UUID is sufficient.
  pub fn new_guest() -> Self {
    Identity::Guest { local_id: Uuid::new_v4().hyphenated().to_string() }
  }

  pub fn is_guest(&self) -> bool { matches!(self, Identity::Guest { .. }) }

  pub fn is_registered(&self) -> bool {
    matches!(self, Identity::Registered { .. })
  }

  /// The identity-provider id, if registered.
  pub fn provider_id(&self) -> Option<&str> {
    match self {
      Identity::Registered { provider_id, .. } => Some(provider_id),
      Identity::Guest { .. } => None,
    }
  }
}

// ─── Input validation ────────────────────────────────────────────────────────

/// Minimal structural email check — one `@`, non-empty local part, domain
/// containing a dot. The provider remains authoritative; this only exists
/// to fail fast before any remote call.
pub fn validate_email(email: &str) -> Result<()> {
  let mut parts = email.split('@');
  let local = parts.next().unwrap_or("");
  let domain = parts.next().unwrap_or("");

  if parts.next().is_some()
    || local.is_empty()
    || domain.is_empty()
    || !domain.contains('.')
  {
    return Err(Error::Validation(format!("malformed email: {email:?}")));
  }
  Ok(())
}

/// Provider password policy: at least six characters.
pub fn validate_password(password: &str) -> Result<()> {
  if password.chars().count() < 6 {
    return Err(Error::Validation(
      "password must be at least 6 characters".into(),
    ));
  }
  Ok(())
}
