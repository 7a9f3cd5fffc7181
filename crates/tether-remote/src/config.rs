//! Connection settings shared by the three remote clients.

use std::time::Duration;

use serde::Deserialize;

fn default_timeout_secs() -> u64 { 15 }

/// Base URLs and credentials for the remote services.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  pub identity_url: String,
  pub records_url:  String,
  pub billing_url:  String,
  /// Sent as `x-api-key` on every request when non-empty.
  #[serde(default)]
  pub api_key:      String,
  /// Per-call timeout; retries are the engine's concern.
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl RemoteConfig {
  pub(crate) fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }

  /// Build the shared reqwest client with the per-call timeout applied.
  pub(crate) fn build_client(&self) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(self.timeout()).build()
  }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
  format!("{}{}", base.trim_end_matches('/'), path)
}
