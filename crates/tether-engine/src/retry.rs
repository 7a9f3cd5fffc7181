//! Single retry-with-backoff helper used for every remote call.
//!
//! Parameterised by idempotency class: idempotent calls (record
//! get/update, entitlement fetch) get the full attempt budget;
//! non-idempotent calls (account create, record create) are retried at
//! most once, guarded by their already-exists fallbacks. Only
//! transport-class failures are retried; logical outcomes short-circuit.

use std::{future::Future, time::Duration};

use tether_core::provider::Transient;

/// Attempt budget and backoff shape for remote calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub max_attempts:    u32,
  pub initial_backoff: Duration,
  pub max_backoff:     Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    RetryPolicy {
      max_attempts:    3,
      initial_backoff: Duration::from_millis(500),
      max_backoff:     Duration::from_secs(5),
    }
  }
}

impl RetryPolicy {
  /// Same attempt budget, zero sleeps. Keeps tests fast.
  pub fn immediate(max_attempts: u32) -> Self {
    RetryPolicy {
      max_attempts,
      initial_backoff: Duration::ZERO,
      max_backoff:     Duration::ZERO,
    }
  }
}

/// Whether re-running an operation can create a duplicate remote effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
  Idempotent,
  NonIdempotent,
}

/// Run `op`, retrying transient failures with exponential backoff.
///
/// The returned error is the last one observed.
pub async fn with_retry<T, E, F, Fut>(
  policy: RetryPolicy,
  class: Idempotency,
  mut op: F,
) -> Result<T, E>
where
  E: Transient + std::fmt::Display,
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
{
  let budget = match class {
    Idempotency::Idempotent => policy.max_attempts.max(1),
    // At most one retry, and never more than the policy allows.
    Idempotency::NonIdempotent => policy.max_attempts.clamp(1, 2),
  };

  let mut backoff = policy.initial_backoff;
  let mut attempt = 1u32;

  loop {
    match op().await {
      Ok(value) => return Ok(value),
      Err(err) if attempt < budget && err.is_transient() => {
        tracing::debug!(attempt, "transient remote failure, retrying: {err}");
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(policy.max_backoff);
        attempt += 1;
      }
      Err(err) => return Err(err),
    }
  }
}
