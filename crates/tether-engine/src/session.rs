//! [`Session`] — the reconciliation engine.
//!
//! One `Session` is constructed at process start and owns the local store
//! plus the three remote clients. Identity-mutating operations (promote,
//! sign-in, sign-out) serialise on a single in-process lock; field-level
//! reads and writes outside those operations are last-write-wins.

use chrono::Utc;
use tokio::sync::Mutex;

use tether_core::{
  entitlement::{self, EntitlementSnapshot},
  error::{Error, Result, Service},
  identity::{self, Identity},
  provider::{
    AccountSession, EntitlementError, EntitlementProvider, IdentityError,
    IdentityProvider, RecordError, RecordService,
  },
  record::{
    GuestPayload, LocalSnapshot, Profile, ProfilePatch, RecordPatch,
    UserRecord,
  },
  store::LocalStore,
};

use crate::{
  poll::{PollPolicy, poll_until},
  retry::{Idempotency, RetryPolicy, with_retry},
  snapshot::{self, GuestMeta, SyncState},
};

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Result of a successful [`Session::promote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoteOutcome {
  pub identity:     Identity,
  /// True when the backend record write did not confirm within its retry
  /// budget; the snapshot is flagged dirty and [`Session::flush_dirty`]
  /// completes the migration in the background.
  pub pending_sync: bool,
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// The reconciliation engine, generic over its four collaborators.
pub struct Session<S, I, R, B> {
  store:   S,
  ids:     I,
  records: R,
  billing: B,
  /// The identity-mutation lock — the only lock in the system.
  mutation: Mutex<()>,
  retry:    RetryPolicy,
  poll:     PollPolicy,
}

impl<S, I, R, B> Session<S, I, R, B>
where
  S: LocalStore,
  I: IdentityProvider,
  R: RecordService,
  B: EntitlementProvider,
{
  pub fn new(store: S, ids: I, records: R, billing: B) -> Self {
    Session {
      store,
      ids,
      records,
      billing,
      mutation: Mutex::new(()),
      retry: RetryPolicy::default(),
      poll: PollPolicy::default(),
    }
  }

  /// Override retry and polling policy (tests use zero backoff).
  pub fn with_policies(mut self, retry: RetryPolicy, poll: PollPolicy) -> Self {
    self.retry = retry;
    self.poll = poll;
    self
  }

  /// Direct access to the local store, for collaborator-owned keys the
  /// engine does not manage.
  pub fn store(&self) -> &S { &self.store }

  // ── Read accessors ────────────────────────────────────────────────────

  /// The active identity, if any has been initialised.
  pub async fn identity(&self) -> Result<Option<Identity>> {
    snapshot::read_identity(&self.store).await
  }

  /// The full local snapshot, if any identity has been initialised.
  pub async fn snapshot(&self) -> Result<Option<LocalSnapshot>> {
    snapshot::read_snapshot(&self.store).await
  }

  // ── Guest lifecycle ───────────────────────────────────────────────────

  /// Idempotent guest bootstrap: allocate a fresh guest identity and an
  /// empty snapshot unless one already exists. No remote calls.
  pub async fn ensure_identity(&self) -> Result<Identity> {
    let _guard = self.mutation.lock().await;
    self.ensure_identity_locked().await
  }

  async fn ensure_identity_locked(&self) -> Result<Identity> {
    if let Some(existing) = snapshot::read_identity(&self.store).await? {
      return Ok(existing);
    }
    let snap = LocalSnapshot::new_guest();
    snapshot::write_snapshot(&self.store, &snap).await?;
    snapshot::write_guest_meta(&self.store, GuestMeta { created_at: Utc::now() })
      .await?;
    tracing::info!("initialised fresh guest identity");
    Ok(snap.identity)
  }

  /// Read the snapshot, bootstrapping a guest if the device is untouched.
  async fn load_or_init(&self) -> Result<LocalSnapshot> {
    if let Some(snap) = snapshot::read_snapshot(&self.store).await? {
      return Ok(snap);
    }
    let snap = LocalSnapshot::new_guest();
    snapshot::write_snapshot(&self.store, &snap).await?;
    snapshot::write_guest_meta(&self.store, GuestMeta { created_at: Utc::now() })
      .await?;
    Ok(snap)
  }

  // ── Promotion (guest → registered) ────────────────────────────────────

  /// Promote the current guest to a registered identity, migrating the
  /// locally accumulated state into a new backend record.
  ///
  /// Re-submitting with the same email is safe: a duplicate account
  /// create falls back to sign-in, a duplicate record create falls back
  /// to update, and a call arriving after the flip already committed
  /// returns the committed outcome.
  pub async fn promote(
    &self,
    email: &str,
    password: &str,
    display_name: Option<&str>,
  ) -> Result<PromoteOutcome> {
    identity::validate_email(email)?;
    identity::validate_password(password)?;

    let _guard = self.mutation.lock().await;

    let mut snap = self.load_or_init().await?;
    if let Identity::Registered { email: current, .. } = &snap.identity {
      if current == email {
        // Duplicate submission after a completed promotion.
        return Ok(PromoteOutcome {
          identity:     snap.identity.clone(),
          pending_sync: snap.dirty,
        });
      }
      return Err(Error::Validation(
        "device is already registered; sign out first".into(),
      ));
    }

    // Step 1: create the remote identity. A duplicate create is treated
    // as a re-submission and converted into a sign-in.
    let account = self.create_or_sign_in(email, password).await?;

    // Step 2: snapshot the local payload exactly once, so a concurrent
    // local mutation cannot corrupt the migration.
    if let Some(name) = display_name {
      snap.profile.display_name = Some(name.to_string());
    }
    let payload = snap.guest_payload();

    // Step 3: write the backend record.
    let synced = self.write_promotion_record(&account, &payload).await;

    // Step 4: commit locally. This happens even when step 3 exhausted its
    // budget — losing the remote write is recoverable (the payload
    // survives locally, flagged dirty), blocking promotion is not.
    snap.identity = Identity::Registered {
      provider_id: account.provider_id.clone(),
      email:       account.email.clone(),
    };
    snap.dirty = !synced;
    if synced {
      snap.last_synced_at = Some(Utc::now());
    }
    snapshot::write_snapshot(&self.store, &snap).await?;
    snapshot::clear_guest_meta(&self.store).await?;

    if synced {
      tracing::info!(provider_id = %account.provider_id, "promotion complete");
    } else {
      tracing::warn!(
        provider_id = %account.provider_id,
        "promotion committed locally; backend record write pending"
      );
    }

    Ok(PromoteOutcome { identity: snap.identity, pending_sync: !synced })
  }

  async fn create_or_sign_in(
    &self,
    email: &str,
    password: &str,
  ) -> Result<AccountSession> {
    let created = with_retry(self.retry, Idempotency::NonIdempotent, || {
      self.ids.create_account(email, password)
    })
    .await;

    match created {
      Ok(account) => Ok(account),
      Err(IdentityError::AlreadyExists) => {
        let signed_in = with_retry(self.retry, Idempotency::Idempotent, || {
          self.ids.sign_in(email, password)
        })
        .await;
        match signed_in {
          Ok(account) => Ok(account),
          Err(IdentityError::InvalidCredentials) => {
            Err(Error::AlreadyRegistered(email.to_string()))
          }
          Err(err) => Err(map_identity(err)),
        }
      }
      Err(err) => Err(map_identity(err)),
    }
  }

  /// Create the backend record for a freshly promoted identity; a
  /// duplicate create self-heals into an update carrying the same
  /// payload. Returns whether the write confirmed.
  async fn write_promotion_record(
    &self,
    account: &AccountSession,
    payload: &GuestPayload,
  ) -> bool {
    let record =
      UserRecord::from_guest(&account.provider_id, &account.email, payload);

    let created = with_retry(self.retry, Idempotency::NonIdempotent, || {
      self.records.create(&record)
    })
    .await;

    match created {
      Ok(_) => true,
      Err(RecordError::AlreadyExists) => {
        let patch = RecordPatch {
          profile:        Some(payload.profile.clone()),
          payload:        Some(payload.payload.clone()),
          entitlement:    Some(payload.entitlement.clone()),
          last_synced_at: Some(Utc::now()),
        };
        let updated = with_retry(self.retry, Idempotency::Idempotent, || {
          self.records.update(&account.provider_id, &patch)
        })
        .await;
        match updated {
          Ok(_) => true,
          Err(err) => {
            tracing::warn!("promotion record update failed: {err}");
            false
          }
        }
      }
      Err(err) => {
        tracing::warn!("promotion record create failed: {err}");
        false
      }
    }
  }

  // ── Restore (sign-in) ─────────────────────────────────────────────────

  /// Authenticate an existing account and restore its backend record to
  /// this device. Remote is authoritative: any prior guest state on this
  /// device is discarded.
  pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
    identity::validate_email(email)?;

    let _guard = self.mutation.lock().await;

    let authed = with_retry(self.retry, Idempotency::Idempotent, || {
      self.ids.sign_in(email, password)
    })
    .await;
    let account = match authed {
      Ok(account) => account,
      Err(IdentityError::InvalidCredentials) => {
        return Err(Error::InvalidCredentials);
      }
      Err(err) => return Err(map_identity(err)),
    };

    let record = self.fetch_or_heal_record(&account).await?;

    let mut snap = LocalSnapshot::new_guest();
    snap.overwrite_from(&record);
    snapshot::write_snapshot(&self.store, &snap).await?;
    snapshot::clear_guest_meta(&self.store).await?;

    tracing::info!(provider_id = %account.provider_id, "signed in");
    Ok(snap.identity)
  }

  /// Fetch the backend record by provider id, falling back to email for
  /// accounts that predate the id linkage. When both lookups miss, the
  /// account exists at the identity provider but has no record —
  /// self-heal by creating an empty one instead of failing sign-in.
  async fn fetch_or_heal_record(
    &self,
    account: &AccountSession,
  ) -> Result<UserRecord> {
    let by_id = with_retry(self.retry, Idempotency::Idempotent, || {
      self.records.get_by_id(&account.provider_id)
    })
    .await
    .map_err(map_record)?;
    if let Some(mut record) = by_id {
      record.provider_id = account.provider_id.clone();
      return Ok(record);
    }

    let by_email = with_retry(self.retry, Idempotency::Idempotent, || {
      self.records.get_by_email(&account.email)
    })
    .await
    .map_err(map_record)?;
    if let Some(mut record) = by_email {
      // Legacy record found by email: adopt the provider id linkage.
      record.provider_id = account.provider_id.clone();
      return Ok(record);
    }

    tracing::warn!(
      provider_id = %account.provider_id,
      "account has no backend record; creating an empty one"
    );
    let empty = UserRecord::empty(&account.provider_id, &account.email);
    let created = with_retry(self.retry, Idempotency::NonIdempotent, || {
      self.records.create(&empty)
    })
    .await;
    match created {
      Ok(record) => Ok(record),
      // Lost a race with another device; the record is there now.
      Err(RecordError::AlreadyExists) => {
        let refetched = with_retry(self.retry, Idempotency::Idempotent, || {
          self.records.get_by_id(&account.provider_id)
        })
        .await
        .map_err(map_record)?;
        Ok(refetched.unwrap_or(empty))
      }
      Err(err) => Err(map_record(err)),
    }
  }

  // ── Sign-out (registered → guest) ─────────────────────────────────────

  /// Sign out of both remote providers (best-effort), wipe the local
  /// snapshot, and start a brand-new guest session. The backend record is
  /// left untouched server-side.
  pub async fn sign_out(&self) -> Result<Identity> {
    let _guard = self.mutation.lock().await;

    if let Err(err) = self.ids.sign_out().await {
      tracing::warn!("identity provider sign-out failed: {err}");
    }
    if let Err(err) = self.billing.sign_out().await {
      tracing::warn!("billing provider sign-out failed: {err}");
    }

    snapshot::clear_all(&self.store).await?;
    let fresh = self.ensure_identity_locked().await?;
    tracing::info!("signed out; new guest session started");
    Ok(fresh)
  }

  // ── Profile ───────────────────────────────────────────────────────────

  /// Merge a partial profile edit into the local snapshot; when
  /// registered, shadow-write it to the backend record best-effort.
  pub async fn update_profile(&self, patch: &ProfilePatch) -> Result<Profile> {
    let mut snap = self.load_or_init().await?;
    if patch.is_empty() {
      return Ok(snap.profile);
    }

    patch.apply_to(&mut snap.profile);
    // Local write first so the UI reflects the edit synchronously.
    snapshot::write_profile(&self.store, &snap.profile).await?;

    if let Identity::Registered { provider_id, .. } = &snap.identity {
      let remote = RecordPatch {
        profile: Some(snap.profile.clone()),
        ..RecordPatch::default()
      };
      let pushed = with_retry(self.retry, Idempotency::Idempotent, || {
        self.records.update(provider_id, &remote)
      })
      .await;
      match pushed {
        Ok(_) => {
          snap.last_synced_at = Some(Utc::now());
        }
        Err(err) => {
          tracing::warn!("profile shadow-write failed: {err}");
          snap.dirty = true;
        }
      }
      snapshot::write_sync(
        &self.store,
        SyncState { dirty: snap.dirty, last_synced_at: snap.last_synced_at },
      )
      .await?;
    }

    Ok(snap.profile)
  }

  /// Replace the opaque application payload locally; when registered,
  /// shadow-write it to the backend record best-effort. The engine never
  /// interprets the value.
  pub async fn update_payload(
    &self,
    payload: serde_json::Value,
  ) -> Result<()> {
    let mut snap = self.load_or_init().await?;
    snap.payload = payload;
    snapshot::write_payload(&self.store, &snap.payload).await?;

    if let Identity::Registered { provider_id, .. } = &snap.identity {
      let remote = RecordPatch {
        payload: Some(snap.payload.clone()),
        ..RecordPatch::default()
      };
      let pushed = with_retry(self.retry, Idempotency::Idempotent, || {
        self.records.update(provider_id, &remote)
      })
      .await;
      match pushed {
        Ok(_) => {
          snap.last_synced_at = Some(Utc::now());
        }
        Err(err) => {
          tracing::warn!("payload shadow-write failed: {err}");
          snap.dirty = true;
        }
      }
      snapshot::write_sync(
        &self.store,
        SyncState { dirty: snap.dirty, last_synced_at: snap.last_synced_at },
      )
      .await?;
    }

    Ok(())
  }

  // ── Entitlement ───────────────────────────────────────────────────────

  /// Reconcile entitlement across the billing provider, the backend
  /// record, and the local snapshot, writing the effective value locally
  /// and pushing it to the backend best-effort.
  pub async fn sync_entitlement(&self) -> Result<EntitlementSnapshot> {
    let provider = with_retry(self.retry, Idempotency::Idempotent, || {
      self.billing.current_snapshot()
    })
    .await
    .map_err(map_entitlement)?;

    self.apply_provider_snapshot(provider).await
  }

  /// Purchase a plan, then run the normal reconciliation path on the
  /// snapshot the billing provider returns.
  pub async fn purchase(&self, plan_id: &str) -> Result<EntitlementSnapshot> {
    // A purchase is not idempotent; it gets exactly one attempt and the
    // caller decides whether to resubmit.
    let provider =
      self.billing.purchase(plan_id).await.map_err(map_entitlement)?;
    self.apply_provider_snapshot(provider).await
  }

  /// Re-validate past purchases with the billing provider and reconcile.
  pub async fn restore_purchases(&self) -> Result<EntitlementSnapshot> {
    let provider = with_retry(self.retry, Idempotency::Idempotent, || {
      self.billing.restore()
    })
    .await
    .map_err(map_entitlement)?;
    self.apply_provider_snapshot(provider).await
  }

  async fn apply_provider_snapshot(
    &self,
    provider: EntitlementSnapshot,
  ) -> Result<EntitlementSnapshot> {
    let mut snap = self.load_or_init().await?;

    // The backend candidate only exists for registered identities, and
    // its unavailability must not block reconciliation of the other two.
    let backend: Option<EntitlementSnapshot> = match &snap.identity {
      Identity::Registered { provider_id, .. } => {
        let fetched = with_retry(self.retry, Idempotency::Idempotent, || {
          self.records.get_by_id(provider_id)
        })
        .await;
        match fetched {
          Ok(record) => record.map(|r| r.entitlement),
          Err(err) => {
            tracing::warn!("backend entitlement fetch failed: {err}");
            None
          }
        }
      }
      Identity::Guest { .. } => None,
    };

    let effective = entitlement::reconcile(
      [Some(&provider), backend.as_ref(), Some(&snap.entitlement)]
        .into_iter()
        .flatten(),
      Utc::now(),
    );

    // Local write happens immediately so the UI reflects it; the backend
    // push is best-effort and retried on the next foreground flush.
    snapshot::write_entitlement(&self.store, &effective).await?;

    if let Identity::Registered { provider_id, .. } = &snap.identity {
      let patch = RecordPatch {
        entitlement: Some(effective.clone()),
        ..RecordPatch::default()
      };
      let pushed = with_retry(self.retry, Idempotency::Idempotent, || {
        self.records.update(provider_id, &patch)
      })
      .await;
      match pushed {
        Ok(_) => {
          snap.last_synced_at = Some(Utc::now());
        }
        Err(err) => {
          tracing::warn!("entitlement push failed: {err}");
          snap.dirty = true;
        }
      }
      snapshot::write_sync(
        &self.store,
        SyncState { dirty: snap.dirty, last_synced_at: snap.last_synced_at },
      )
      .await?;
    }

    Ok(effective)
  }

  // ── Background sync ───────────────────────────────────────────────────

  /// Complete any pending backend write (typically called on app
  /// foreground). Pushes the full snapshot, creating the record if it
  /// never landed during promotion. A no-op when nothing is dirty.
  pub async fn flush_dirty(&self) -> Result<()> {
    let _guard = self.mutation.lock().await;

    let Some(mut snap) = snapshot::read_snapshot(&self.store).await? else {
      return Ok(());
    };
    if !snap.dirty {
      return Ok(());
    }
    let Identity::Registered { provider_id, email } = snap.identity.clone()
    else {
      // Dirty without a registered identity cannot be pushed anywhere.
      snap.dirty = false;
      return snapshot::write_sync(
        &self.store,
        SyncState { dirty: false, last_synced_at: snap.last_synced_at },
      )
      .await;
    };

    let now = Utc::now();
    let patch = RecordPatch {
      profile:        Some(snap.profile.clone()),
      payload:        Some(snap.payload.clone()),
      entitlement:    Some(snap.entitlement.clone()),
      last_synced_at: Some(now),
    };

    let updated = with_retry(self.retry, Idempotency::Idempotent, || {
      self.records.update(&provider_id, &patch)
    })
    .await;

    match updated {
      Ok(_) => {}
      Err(RecordError::NotFound) => {
        // The record never landed during promotion; create it now from
        // the locally preserved payload.
        let record =
          UserRecord::from_guest(&provider_id, &email, &snap.guest_payload());
        let created = with_retry(self.retry, Idempotency::NonIdempotent, || {
          self.records.create(&record)
        })
        .await;
        match created {
          Ok(_) | Err(RecordError::AlreadyExists) => {}
          Err(err) => {
            tracing::warn!("background record create failed: {err}");
            return Err(Error::PartialMigration);
          }
        }
      }
      Err(err) => {
        tracing::warn!("background record update failed: {err}");
        return Err(Error::PartialMigration);
      }
    }

    snap.dirty = false;
    snap.last_synced_at = Some(now);
    snapshot::write_sync(
      &self.store,
      SyncState { dirty: false, last_synced_at: snap.last_synced_at },
    )
    .await?;
    tracing::info!(provider_id = %provider_id, "pending backend sync completed");
    Ok(())
  }

  // ── Eventual-consistency confirmation ─────────────────────────────────

  /// Poll (bounded) for the backend record to become visible, e.g. right
  /// after a promotion whose write may still be propagating. Returns the
  /// best-known value — `None` if the budget ran out.
  pub async fn await_record(&self, provider_id: &str) -> Option<UserRecord> {
    poll_until(self.poll, || async {
      self.records.get_by_id(provider_id).await.ok().flatten()
    })
    .await
  }
}

// ─── Error mapping ───────────────────────────────────────────────────────────

fn map_identity(err: IdentityError) -> Error {
  match err {
    IdentityError::InvalidCredentials => Error::InvalidCredentials,
    IdentityError::AlreadyExists => {
      Error::unavailable(Service::Identity, "unexpected duplicate-account reply")
    }
    IdentityError::Unavailable(reason) => {
      Error::unavailable(Service::Identity, reason)
    }
  }
}

fn map_record(err: RecordError) -> Error {
  match err {
    RecordError::Unavailable(reason) => {
      Error::unavailable(Service::Records, reason)
    }
    RecordError::AlreadyExists | RecordError::NotFound => {
      Error::unavailable(Service::Records, err.to_string())
    }
  }
}

fn map_entitlement(err: EntitlementError) -> Error {
  match err {
    EntitlementError::Unavailable(reason) => {
      Error::unavailable(Service::Billing, reason)
    }
  }
}
