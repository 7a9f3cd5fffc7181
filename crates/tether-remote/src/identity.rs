//! Async HTTP client wrapping the remote identity/auth service.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tether_core::provider::{AccountSession, IdentityError, IdentityProvider};

use crate::{RemoteConfig, Result, config::join_url};

/// HTTP client for the identity provider.
///
/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct IdentityClient {
  client:   Client,
  base_url: String,
  api_key:  String,
}

#[derive(Serialize)]
struct CredentialsBody<'a> {
  email:    &'a str,
  password: &'a str,
}

#[derive(Deserialize)]
struct SessionBody {
  id:    String,
  email: String,
}

impl From<SessionBody> for AccountSession {
  fn from(body: SessionBody) -> Self {
    AccountSession { provider_id: body.id, email: body.email }
  }
}

impl IdentityClient {
  pub fn new(config: &RemoteConfig) -> Result<Self> {
    Ok(IdentityClient {
      client:   config.build_client()?,
      base_url: config.identity_url.clone(),
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

  fn transport(err: reqwest::Error) -> IdentityError {
    IdentityError::Unavailable(err.to_string())
  }

  fn unexpected(context: &str, status: StatusCode) -> IdentityError {
    tracing::warn!(%status, "identity provider returned unexpected status");
    IdentityError::Unavailable(format!("{context} → {status}"))
  }
}

impl IdentityProvider for IdentityClient {
  /// `POST /v1/accounts`
  async fn create_account(
    &self,
    email: &str,
    password: &str,
  ) -> Result<AccountSession, IdentityError> {
    let resp = self
      .auth(self.client.post(self.url("/v1/accounts")))
      .json(&CredentialsBody { email, password })
      .send()
      .await
      .map_err(Self::transport)?;

    match resp.status() {
      StatusCode::CONFLICT => Err(IdentityError::AlreadyExists),
      status if status.is_success() => {
        let body: SessionBody = resp.json().await.map_err(Self::transport)?;
        Ok(body.into())
      }
      status => Err(Self::unexpected("POST /v1/accounts", status)),
    }
  }

  /// `POST /v1/sessions`
  async fn sign_in(
    &self,
    email: &str,
    password: &str,
  ) -> Result<AccountSession, IdentityError> {
    let resp = self
      .auth(self.client.post(self.url("/v1/sessions")))
      .json(&CredentialsBody { email, password })
      .send()
      .await
      .map_err(Self::transport)?;

    match resp.status() {
      StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
        Err(IdentityError::InvalidCredentials)
      }
      status if status.is_success() => {
        let body: SessionBody = resp.json().await.map_err(Self::transport)?;
        Ok(body.into())
      }
      status => Err(Self::unexpected("POST /v1/sessions", status)),
    }
  }

  /// `DELETE /v1/sessions/current`
  async fn sign_out(&self) -> Result<(), IdentityError> {
    let resp = self
      .auth(self.client.delete(self.url("/v1/sessions/current")))
      .send()
      .await
      .map_err(Self::transport)?;

    // An already-expired session is as signed out as it gets.
    if resp.status().is_success()
      || resp.status() == StatusCode::UNAUTHORIZED
    {
      Ok(())
    } else {
      Err(Self::unexpected("DELETE /v1/sessions/current", resp.status()))
    }
  }

  /// `GET /v1/sessions/current`
  async fn current_session(
    &self,
  ) -> Result<Option<AccountSession>, IdentityError> {
    let resp = self
      .auth(self.client.get(self.url("/v1/sessions/current")))
      .send()
      .await
      .map_err(Self::transport)?;

    match resp.status() {
      StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => Ok(None),
      status if status.is_success() => {
        let body: SessionBody = resp.json().await.map_err(Self::transport)?;
        Ok(Some(body.into()))
      }
      status => Err(Self::unexpected("GET /v1/sessions/current", status)),
    }
  }
}
