//! Async HTTP client wrapping the billing/subscription provider.

use reqwest::{Client, StatusCode};
use serde::Serialize;
use tether_core::{
  entitlement::EntitlementSnapshot,
  provider::{EntitlementError, EntitlementProvider},
};

use crate::{RemoteConfig, Result, config::join_url};

/// HTTP client for the billing provider.
#[derive(Clone)]
pub struct BillingClient {
  client:   Client,
  base_url: String,
  api_key:  String,
}

#[derive(Serialize)]
struct PurchaseBody<'a> {
  plan_id: &'a str,
}

impl BillingClient {
  pub fn new(config: &RemoteConfig) -> Result<Self> {
    Ok(BillingClient {
      client:   config.build_client()?,
      base_url: config.billing_url.clone(),
      api_key:  config.api_key.clone(),
    })
  }

  fn url(&self, path: &str) -> String { join_url(&self.base_url, path) }

  fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    if self.api_key.is_empty() {
      req
    } else {
      req.header("x-api-key", &self.api_key)
    }
  }

  fn transport(err: reqwest::Error) -> EntitlementError {
    EntitlementError::Unavailable(err.to_string())
  }

  fn unexpected(context: &str, status: StatusCode) -> EntitlementError {
    tracing::warn!(%status, "billing provider returned unexpected status");
    EntitlementError::Unavailable(format!("{context} → {status}"))
  }

  async fn snapshot_from(
    &self,
    resp: reqwest::Response,
    context: &str,
  ) -> Result<EntitlementSnapshot, EntitlementError> {
    let status = resp.status();
    if status.is_success() {
      resp.json().await.map_err(Self::transport)
    } else {
      Err(Self::unexpected(context, status))
    }
  }
}

impl EntitlementProvider for BillingClient {
  /// `GET /v1/entitlement`
  async fn current_snapshot(
    &self,
  ) -> Result<EntitlementSnapshot, EntitlementError> {
    let resp = self
      .auth(self.client.get(self.url("/v1/entitlement")))
      .send()
      .await
      .map_err(Self::transport)?;
    self.snapshot_from(resp, "GET /v1/entitlement").await
  }

  /// `POST /v1/purchases`
  async fn purchase(
    &self,
    plan_id: &str,
  ) -> Result<EntitlementSnapshot, EntitlementError> {
    let resp = self
      .auth(self.client.post(self.url("/v1/purchases")))
      .json(&PurchaseBody { plan_id })
      .send()
      .await
      .map_err(Self::transport)?;
    self.snapshot_from(resp, "POST /v1/purchases").await
  }

  /// `POST /v1/purchases/restore`
  async fn restore(&self) -> Result<EntitlementSnapshot, EntitlementError> {
    let resp = self
      .auth(self.client.post(self.url("/v1/purchases/restore")))
      .send()
      .await
      .map_err(Self::transport)?;
    self.snapshot_from(resp, "POST /v1/purchases/restore").await
  }

  /// `DELETE /v1/session`
  async fn sign_out(&self) -> Result<(), EntitlementError> {
    let resp = self
      .auth(self.client.delete(self.url("/v1/session")))
      .send()
      .await
      .map_err(Self::transport)?;

    if resp.status().is_success() || resp.status() == StatusCode::UNAUTHORIZED
    {
      Ok(())
    } else {
      Err(Self::unexpected("DELETE /v1/session", resp.status()))
    }
  }
}
