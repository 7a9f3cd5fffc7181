//! Entitlement snapshots and the reconciliation rule.
//!
//! Entitlement has three independent producers: the billing provider
//! (source of truth for purchase events), the backend record (cross-device
//! visibility), and the local store (offline operation). [`reconcile`]
//! collapses them into one effective value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The plan every device starts on.
pub const FREE_PLAN: &str = "free";

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EntitlementStatus {
  Active,
  Cancelled,
  Expired,
  #[default]
  None,
}

/// One producer's view of the current paid-access status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementSnapshot {
  /// Provider-defined plan identifier; `"free"` when unentitled.
  pub plan:         String,
  pub status:       EntitlementStatus,
  /// Absent means a lifetime grant.
  pub expires_at:   Option<DateTime<Utc>>,
  pub purchased_at: Option<DateTime<Utc>>,
}

impl EntitlementSnapshot {
  /// The unentitled default: `{plan: free, status: none}`.
  pub fn free() -> Self {
    EntitlementSnapshot {
      plan:         FREE_PLAN.to_string(),
      status:       EntitlementStatus::None,
      expires_at:   None,
      purchased_at: None,
    }
  }

  /// A snapshot counts toward reconciliation only while active and
  /// unexpired (absent `expires_at` is a lifetime grant).
  pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
    self.status == EntitlementStatus::Active
      && self.expires_at.is_none_or(|at| at > now)
  }
}

impl Default for EntitlementSnapshot {
  fn default() -> Self { Self::free() }
}

/// Pick the effective entitlement from the candidate snapshots.
///
/// The eligible snapshot with the most recent `purchased_at` wins; ties go
/// to the earlier candidate (callers pass provider → backend → local). If
/// nothing is eligible the result is the free default. The most generous
/// non-expired snapshot avoids incorrectly demoting a paying user whose
/// sync is lagging.
pub fn reconcile<'a>(
  candidates: impl IntoIterator<Item = &'a EntitlementSnapshot>,
  now: DateTime<Utc>,
) -> EntitlementSnapshot {
  let mut effective: Option<&EntitlementSnapshot> = None;

  for candidate in candidates {
    if !candidate.is_eligible(now) {
      continue;
    }
    match effective {
      // Strict comparison keeps the earlier candidate on a tie.
      Some(best) if candidate.purchased_at <= best.purchased_at => {}
      _ => effective = Some(candidate),
    }
  }

  effective.cloned().unwrap_or_else(EntitlementSnapshot::free)
}
