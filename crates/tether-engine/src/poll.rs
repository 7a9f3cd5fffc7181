//! Bounded polling primitive for eventual-consistency waits.
//!
//! Used when a caller needs to confirm an asynchronous remote effect
//! landed (e.g. the backend record after promotion). Never open-ended: a
//! fixed attempt budget with fixed spacing, and an explicit "give up and
//! return best-known value" terminal case.

use std::{future::Future, time::Duration};

/// Attempt budget and spacing for [`poll_until`].
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
  pub attempts: u32,
  pub spacing:  Duration,
}

impl Default for PollPolicy {
  fn default() -> Self {
    PollPolicy { attempts: 5, spacing: Duration::from_millis(500) }
  }
}

impl PollPolicy {
  /// Same attempt budget, zero spacing. Keeps tests fast.
  pub fn immediate(attempts: u32) -> Self {
    PollPolicy { attempts, spacing: Duration::ZERO }
  }
}

/// Probe until `probe` yields a value or the budget runs out.
///
/// Returns `None` when every attempt came up empty — the caller proceeds
/// with its best-known local value rather than blocking forever.
pub async fn poll_until<T, F, Fut>(policy: PollPolicy, mut probe: F) -> Option<T>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Option<T>>,
{
  let attempts = policy.attempts.max(1);
  for attempt in 1..=attempts {
    if let Some(value) = probe().await {
      return Some(value);
    }
    if attempt < attempts {
      tokio::time::sleep(policy.spacing).await;
    }
  }
  None
}
