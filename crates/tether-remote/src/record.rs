//! Async HTTP client wrapping the backend record service.
//!
//! The wire format is [`UserRecord`]/[`RecordPatch`] JSON as defined in
//! `tether-core`; this client adds only transport and status mapping.

use reqwest::{Client, StatusCode};
use tether_core::{
  provider::{RecordError, RecordService},
  record::{RecordPatch, UserRecord},
};

use crate::{RemoteConfig, Result, config::join_url};

/// HTTP client for the backend record service.
#[derive(Clone)]
pub struct RecordClient {
  client:   Client,
  base_url: String,
  api_key:  String,
}

impl RecordClient {
  pub fn new(config: &RemoteConfig) -> Result<Self> {
    Ok(RecordClient {
      client:   config.build_client()?,
      base_url: config.records_url.clone(),
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

  fn transport(err: reqwest::Error) -> RecordError {
    RecordError::Unavailable(err.to_string())
  }

  fn unexpected(context: &str, status: StatusCode) -> RecordError {
    tracing::warn!(%status, "record service returned unexpected status");
    RecordError::Unavailable(format!("{context} → {status}"))
  }

  /// Build a URL whose final segment is percent-encoded. Raw interpolation
  /// would let a `?` or `#` in the value truncate the path.
  fn url_with_segment(
    &self,
    path: &str,
    segment: &str,
  ) -> Result<String, RecordError> {
    let mut url = reqwest::Url::parse(&self.url(path))
      .map_err(|err| RecordError::Unavailable(format!("bad base url: {err}")))?;
    url
      .path_segments_mut()
      .map_err(|()| {
        RecordError::Unavailable("records url cannot be a base".into())
      })?
      .push(segment);
    Ok(url.into())
  }

  async fn fetch(&self, url: String) -> Result<Option<UserRecord>, RecordError> {
    let resp = self
      .auth(self.client.get(&url))
      .send()
      .await
      .map_err(Self::transport)?;

    match resp.status() {
      StatusCode::NOT_FOUND => Ok(None),
      status if status.is_success() => {
        let record: UserRecord = resp.json().await.map_err(Self::transport)?;
        Ok(Some(record))
      }
      status => Err(Self::unexpected(&format!("GET {url}"), status)),
    }
  }
}

impl RecordService for RecordClient {
  /// `POST /v1/records`
  async fn create(&self, record: &UserRecord) -> Result<UserRecord, RecordError> {
    let resp = self
      .auth(self.client.post(self.url("/v1/records")))
      .json(record)
      .send()
      .await
      .map_err(Self::transport)?;

    match resp.status() {
      StatusCode::CONFLICT => Err(RecordError::AlreadyExists),
      status if status.is_success() => {
        resp.json().await.map_err(Self::transport)
      }
      status => Err(Self::unexpected("POST /v1/records", status)),
    }
  }

  /// `GET /v1/records/{provider_id}`
  async fn get_by_id(
    &self,
    provider_id: &str,
  ) -> Result<Option<UserRecord>, RecordError> {
    self.fetch(self.url_with_segment("/v1/records", provider_id)?).await
  }

  /// `GET /v1/records/by-email/{email}`
  async fn get_by_email(
    &self,
    email: &str,
  ) -> Result<Option<UserRecord>, RecordError> {
    self.fetch(self.url_with_segment("/v1/records/by-email", email)?).await
  }

  /// `PATCH /v1/records/{provider_id}`
  async fn update(
    &self,
    provider_id: &str,
    patch: &RecordPatch,
  ) -> Result<UserRecord, RecordError> {
    let url = self.url_with_segment("/v1/records", provider_id)?;
    let resp = self
      .auth(self.client.patch(&url))
      .json(patch)
      .send()
      .await
      .map_err(Self::transport)?;

    match resp.status() {
      StatusCode::NOT_FOUND => Err(RecordError::NotFound),
      status if status.is_success() => {
        resp.json().await.map_err(Self::transport)
      }
      status => {
        Err(Self::unexpected(&format!("PATCH /v1/records/{provider_id}"), status))
      }
    }
  }
}
