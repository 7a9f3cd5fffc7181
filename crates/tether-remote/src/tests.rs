//! Client tests against a scripted wiremock HTTP server.

use serde_json::json;
use tether_core::{
  entitlement::EntitlementStatus,
  provider::{
    EntitlementProvider, IdentityError, IdentityProvider, RecordError,
    RecordService,
  },
  record::{Profile, RecordPatch},
};
use wiremock::{
  Mock, MockServer, ResponseTemplate,
  matchers::{body_json, header, method, path},
};

use crate::{BillingClient, IdentityClient, RecordClient, RemoteConfig};

fn config(server: &MockServer) -> RemoteConfig {
  RemoteConfig {
    identity_url: server.uri(),
    records_url:  server.uri(),
    billing_url:  server.uri(),
    api_key:      "test-key".into(),
    timeout_secs: 5,
  }
}

fn record_json() -> serde_json::Value {
  json!({
    "provider_id": "auth-1",
    "email": "a@b.com",
    "profile": {
      "display_name": "Alice",
      "username": null,
      "avatar_url": null
    },
    "payload": { "goal": "learn rust" },
    "entitlement": {
      "plan": "free",
      "status": "none",
      "expires_at": null,
      "purchased_at": null
    },
    "last_synced_at": null
  })
}

// ─── Identity ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_account_parses_session() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/v1/accounts"))
    .and(header("x-api-key", "test-key"))
    .and(body_json(json!({ "email": "a@b.com", "password": "pw123456" })))
    .respond_with(
      ResponseTemplate::new(201)
        .set_body_json(json!({ "id": "auth-1", "email": "a@b.com" })),
    )
    .mount(&server)
    .await;

  let client = IdentityClient::new(&config(&server)).unwrap();
  let session = client.create_account("a@b.com", "pw123456").await.unwrap();
  assert_eq!(session.provider_id, "auth-1");
  assert_eq!(session.email, "a@b.com");
}

#[tokio::test]
async fn duplicate_account_maps_to_already_exists() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/v1/accounts"))
    .respond_with(ResponseTemplate::new(409))
    .mount(&server)
    .await;

  let client = IdentityClient::new(&config(&server)).unwrap();
  let result = client.create_account("a@b.com", "pw123456").await;
  assert!(matches!(result, Err(IdentityError::AlreadyExists)));
}

#[tokio::test]
async fn bad_password_maps_to_invalid_credentials() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/v1/sessions"))
    .respond_with(ResponseTemplate::new(401))
    .mount(&server)
    .await;

  let client = IdentityClient::new(&config(&server)).unwrap();
  let result = client.sign_in("a@b.com", "wrong").await;
  assert!(matches!(result, Err(IdentityError::InvalidCredentials)));
}

#[tokio::test]
async fn server_error_maps_to_unavailable() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/v1/sessions"))
    .respond_with(ResponseTemplate::new(503))
    .mount(&server)
    .await;

  let client = IdentityClient::new(&config(&server)).unwrap();
  let result = client.sign_in("a@b.com", "pw123456").await;
  assert!(matches!(result, Err(IdentityError::Unavailable(_))));
}

#[tokio::test]
async fn current_session_parses_active_session() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/v1/sessions/current"))
    .and(header("x-api-key", "test-key"))
    .respond_with(
      ResponseTemplate::new(200)
        .set_body_json(json!({ "id": "auth-1", "email": "a@b.com" })),
    )
    .mount(&server)
    .await;

  let client = IdentityClient::new(&config(&server)).unwrap();
  let session = client.current_session().await.unwrap().unwrap();
  assert_eq!(session.provider_id, "auth-1");
}

#[tokio::test]
async fn no_current_session_maps_to_none() {
  for status in [401, 404] {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/v1/sessions/current"))
      .respond_with(ResponseTemplate::new(status))
      .mount(&server)
      .await;

    let client = IdentityClient::new(&config(&server)).unwrap();
    assert_eq!(client.current_session().await.unwrap(), None);
  }
}

#[tokio::test]
async fn expired_session_sign_out_is_ok() {
  let server = MockServer::start().await;
  Mock::given(method("DELETE"))
    .and(path("/v1/sessions/current"))
    .respond_with(ResponseTemplate::new(401))
    .mount(&server)
    .await;

  let client = IdentityClient::new(&config(&server)).unwrap();
  assert!(client.sign_out().await.is_ok());
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn get_by_id_parses_record() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/v1/records/auth-1"))
    .respond_with(ResponseTemplate::new(200).set_body_json(record_json()))
    .mount(&server)
    .await;

  let client = RecordClient::new(&config(&server)).unwrap();
  let record = client.get_by_id("auth-1").await.unwrap().unwrap();
  assert_eq!(record.provider_id, "auth-1");
  assert_eq!(record.profile.display_name.as_deref(), Some("Alice"));
  assert_eq!(record.payload, json!({ "goal": "learn rust" }));
  assert_eq!(record.entitlement.status, EntitlementStatus::None);
}

#[tokio::test]
async fn get_by_id_miss_returns_none() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/v1/records/unknown"))
    .respond_with(ResponseTemplate::new(404))
    .mount(&server)
    .await;

  let client = RecordClient::new(&config(&server)).unwrap();
  assert_eq!(client.get_by_id("unknown").await.unwrap(), None);
}

#[tokio::test]
async fn get_by_email_percent_encodes_the_segment() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .respond_with(ResponseTemplate::new(404))
    .mount(&server)
    .await;

  let client = RecordClient::new(&config(&server)).unwrap();
  // A `?` in the local part must not truncate the path into a query.
  assert_eq!(client.get_by_email("a?x@b.com").await.unwrap(), None);

  let requests = server.received_requests().await.unwrap();
  assert_eq!(requests.len(), 1);
  assert_eq!(requests[0].url.path(), "/v1/records/by-email/a%3Fx@b.com");
  assert_eq!(requests[0].url.query(), None);
}

#[tokio::test]
async fn duplicate_record_create_maps_to_already_exists() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/v1/records"))
    .respond_with(ResponseTemplate::new(409))
    .mount(&server)
    .await;

  let client = RecordClient::new(&config(&server)).unwrap();
  let record: tether_core::record::UserRecord =
    serde_json::from_value(record_json()).unwrap();
  let result = client.create(&record).await;
  assert!(matches!(result, Err(RecordError::AlreadyExists)));
}

#[tokio::test]
async fn update_omits_absent_patch_fields() {
  let server = MockServer::start().await;
  let patch = RecordPatch {
    profile: Some(Profile {
      display_name: Some("Alice".into()),
      username:     None,
      avatar_url:   None,
    }),
    ..RecordPatch::default()
  };
  // Exact body match: only the profile key crosses the wire.
  Mock::given(method("PATCH"))
    .and(path("/v1/records/auth-1"))
    .and(body_json(json!({
      "profile": {
        "display_name": "Alice",
        "username": null,
        "avatar_url": null
      }
    })))
    .respond_with(ResponseTemplate::new(200).set_body_json(record_json()))
    .mount(&server)
    .await;

  let client = RecordClient::new(&config(&server)).unwrap();
  assert!(client.update("auth-1", &patch).await.is_ok());
}

#[tokio::test]
async fn update_missing_record_maps_to_not_found() {
  let server = MockServer::start().await;
  Mock::given(method("PATCH"))
    .and(path("/v1/records/auth-1"))
    .respond_with(ResponseTemplate::new(404))
    .mount(&server)
    .await;

  let client = RecordClient::new(&config(&server)).unwrap();
  let result = client.update("auth-1", &RecordPatch::default()).await;
  assert!(matches!(result, Err(RecordError::NotFound)));
}

// ─── Billing ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn current_snapshot_parses_entitlement() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/v1/entitlement"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "plan": "yearly",
      "status": "active",
      "expires_at": "2027-01-01T00:00:00Z",
      "purchased_at": "2026-01-01T00:00:00Z"
    })))
    .mount(&server)
    .await;

  let client = BillingClient::new(&config(&server)).unwrap();
  let snap = client.current_snapshot().await.unwrap();
  assert_eq!(snap.plan, "yearly");
  assert_eq!(snap.status, EntitlementStatus::Active);
  assert!(snap.expires_at.is_some());
}

#[tokio::test]
async fn purchase_sends_plan_id() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/v1/purchases"))
    .and(body_json(json!({ "plan_id": "pro-monthly" })))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "plan": "pro-monthly",
      "status": "active",
      "expires_at": null,
      "purchased_at": "2026-08-01T00:00:00Z"
    })))
    .mount(&server)
    .await;

  let client = BillingClient::new(&config(&server)).unwrap();
  let snap = client.purchase("pro-monthly").await.unwrap();
  assert_eq!(snap.plan, "pro-monthly");
  assert_eq!(snap.status, EntitlementStatus::Active);
}
