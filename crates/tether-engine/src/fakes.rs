//! Scripted in-memory fakes for the engine's four collaborators.
//!
//! Each fake can be told to fail its next N remote calls with a transient
//! error, which is how the tests exercise the retry and dirty-flag paths.

use std::{
  collections::HashMap,
  sync::{
    Mutex,
    atomic::{AtomicU32, Ordering},
  },
};

use tether_core::{
  entitlement::EntitlementSnapshot,
  provider::{
    AccountSession, EntitlementError, EntitlementProvider, IdentityError,
    IdentityProvider, RecordError, RecordService,
  },
  record::{RecordPatch, UserRecord},
  store::LocalStore,
};

// ─── Local store ─────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
  map: Mutex<HashMap<String, Vec<u8>>>,
}

impl LocalStore for MemoryStore {
  type Error = std::convert::Infallible;

  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
    Ok(self.map.lock().unwrap().get(key).cloned())
  }

  async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), Self::Error> {
    self.map.lock().unwrap().insert(key.to_string(), value);
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<(), Self::Error> {
    self.map.lock().unwrap().remove(key);
    Ok(())
  }

  async fn multi_get(
    &self,
    keys: &[&str],
  ) -> Result<Vec<Option<Vec<u8>>>, Self::Error> {
    let map = self.map.lock().unwrap();
    Ok(keys.iter().map(|k| map.get(*k).cloned()).collect())
  }

  async fn multi_set(
    &self,
    entries: Vec<(String, Vec<u8>)>,
  ) -> Result<(), Self::Error> {
    let mut map = self.map.lock().unwrap();
    for (key, value) in entries {
      map.insert(key, value);
    }
    Ok(())
  }
}

// ─── Failure scripting ───────────────────────────────────────────────────────

/// Consume one scripted failure, if any remain.
fn take_failure(counter: &AtomicU32) -> bool {
  counter
    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
    .is_ok()
}

// ─── Identity provider ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeIdentity {
  accounts: Mutex<HashMap<String, (String, String)>>, // email → (password, id)
  next_id:  AtomicU32,
  /// Next N calls (any method) fail transiently.
  pub fail_next:      AtomicU32,
  pub create_calls:   AtomicU32,
  pub sign_out_calls: AtomicU32,
  pub fail_sign_out:  AtomicU32,
}

impl FakeIdentity {
  /// Pre-register an account, as if created from another device.
  pub fn seed(&self, email: &str, password: &str, provider_id: &str) {
    self.accounts.lock().unwrap().insert(
      email.to_string(),
      (password.to_string(), provider_id.to_string()),
    );
  }

  pub fn fail_next_calls(&self, n: u32) {
    self.fail_next.store(n, Ordering::SeqCst);
  }
}

impl IdentityProvider for FakeIdentity {
  async fn create_account(
    &self,
    email: &str,
    password: &str,
  ) -> Result<AccountSession, IdentityError> {
    self.create_calls.fetch_add(1, Ordering::SeqCst);
    if take_failure(&self.fail_next) {
      return Err(IdentityError::Unavailable("timed out".into()));
    }
    let mut accounts = self.accounts.lock().unwrap();
    if accounts.contains_key(email) {
      return Err(IdentityError::AlreadyExists);
    }
    let id = format!("uid-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
    accounts.insert(email.to_string(), (password.to_string(), id.clone()));
    Ok(AccountSession { provider_id: id, email: email.to_string() })
  }

  async fn sign_in(
    &self,
    email: &str,
    password: &str,
  ) -> Result<AccountSession, IdentityError> {
    if take_failure(&self.fail_next) {
      return Err(IdentityError::Unavailable("timed out".into()));
    }
    let accounts = self.accounts.lock().unwrap();
    match accounts.get(email) {
      Some((stored, id)) if stored == password => Ok(AccountSession {
        provider_id: id.clone(),
        email:       email.to_string(),
      }),
      Some(_) | None => Err(IdentityError::InvalidCredentials),
    }
  }

  async fn sign_out(&self) -> Result<(), IdentityError> {
    self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
    if take_failure(&self.fail_sign_out) {
      return Err(IdentityError::Unavailable("timed out".into()));
    }
    Ok(())
  }

  async fn current_session(
    &self,
  ) -> Result<Option<AccountSession>, IdentityError> {
    Ok(None)
  }
}

// ─── Record service ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeRecords {
  records: Mutex<HashMap<String, UserRecord>>, // provider_id → record
  /// Next N calls (any method) fail transiently.
  pub fail_next:    AtomicU32,
  pub create_calls: AtomicU32,
  pub update_calls: AtomicU32,
}

impl FakeRecords {
  pub fn seed(&self, record: UserRecord) {
    self
      .records
      .lock()
      .unwrap()
      .insert(record.provider_id.clone(), record);
  }

  pub fn fail_next_calls(&self, n: u32) {
    self.fail_next.store(n, Ordering::SeqCst);
  }

  pub fn record_count(&self) -> usize { self.records.lock().unwrap().len() }

  pub fn get(&self, provider_id: &str) -> Option<UserRecord> {
    self.records.lock().unwrap().get(provider_id).cloned()
  }
}

impl RecordService for FakeRecords {
  async fn create(&self, record: &UserRecord) -> Result<UserRecord, RecordError> {
    self.create_calls.fetch_add(1, Ordering::SeqCst);
    if take_failure(&self.fail_next) {
      return Err(RecordError::Unavailable("timed out".into()));
    }
    let mut records = self.records.lock().unwrap();
    if records.contains_key(&record.provider_id) {
      return Err(RecordError::AlreadyExists);
    }
    records.insert(record.provider_id.clone(), record.clone());
    Ok(record.clone())
  }

  async fn get_by_id(
    &self,
    provider_id: &str,
  ) -> Result<Option<UserRecord>, RecordError> {
    if take_failure(&self.fail_next) {
      return Err(RecordError::Unavailable("timed out".into()));
    }
    Ok(self.records.lock().unwrap().get(provider_id).cloned())
  }

  async fn get_by_email(
    &self,
    email: &str,
  ) -> Result<Option<UserRecord>, RecordError> {
    if take_failure(&self.fail_next) {
      return Err(RecordError::Unavailable("timed out".into()));
    }
    let records = self.records.lock().unwrap();
    Ok(records.values().find(|r| r.email == email).cloned())
  }

  async fn update(
    &self,
    provider_id: &str,
    patch: &RecordPatch,
  ) -> Result<UserRecord, RecordError> {
    self.update_calls.fetch_add(1, Ordering::SeqCst);
    if take_failure(&self.fail_next) {
      return Err(RecordError::Unavailable("timed out".into()));
    }
    let mut records = self.records.lock().unwrap();
    let record =
      records.get_mut(provider_id).ok_or(RecordError::NotFound)?;
    if let Some(profile) = &patch.profile {
      record.profile = profile.clone();
    }
    if let Some(payload) = &patch.payload {
      record.payload = payload.clone();
    }
    if let Some(entitlement) = &patch.entitlement {
      record.entitlement = entitlement.clone();
    }
    if let Some(at) = patch.last_synced_at {
      record.last_synced_at = Some(at);
    }
    Ok(record.clone())
  }
}

// ─── Entitlement provider ────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeBilling {
  snapshot: Mutex<Option<EntitlementSnapshot>>,
  pub fail_next:      AtomicU32,
  pub sign_out_calls: AtomicU32,
}

impl FakeBilling {
  pub fn set_snapshot(&self, snap: EntitlementSnapshot) {
    *self.snapshot.lock().unwrap() = Some(snap);
  }

  pub fn fail_next_calls(&self, n: u32) {
    self.fail_next.store(n, Ordering::SeqCst);
  }

  fn current(&self) -> EntitlementSnapshot {
    self
      .snapshot
      .lock()
      .unwrap()
      .clone()
      .unwrap_or_else(EntitlementSnapshot::free)
  }
}

impl EntitlementProvider for FakeBilling {
  async fn current_snapshot(
    &self,
  ) -> Result<EntitlementSnapshot, EntitlementError> {
    if take_failure(&self.fail_next) {
      return Err(EntitlementError::Unavailable("timed out".into()));
    }
    Ok(self.current())
  }

  async fn purchase(
    &self,
    plan_id: &str,
  ) -> Result<EntitlementSnapshot, EntitlementError> {
    if take_failure(&self.fail_next) {
      return Err(EntitlementError::Unavailable("timed out".into()));
    }
    let snap = EntitlementSnapshot {
      plan:         plan_id.to_string(),
      status:       tether_core::entitlement::EntitlementStatus::Active,
      expires_at:   None,
      purchased_at: Some(chrono::Utc::now()),
    };
    *self.snapshot.lock().unwrap() = Some(snap.clone());
    Ok(snap)
  }

  async fn restore(&self) -> Result<EntitlementSnapshot, EntitlementError> {
    if take_failure(&self.fail_next) {
      return Err(EntitlementError::Unavailable("timed out".into()));
    }
    Ok(self.current())
  }

  async fn sign_out(&self) -> Result<(), EntitlementError> {
    self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}
