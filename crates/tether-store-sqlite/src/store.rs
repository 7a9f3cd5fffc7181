//! [`SqliteStore`] — the SQLite implementation of [`LocalStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use tether_core::store::LocalStore;

use crate::{Error, Result, schema::SCHEMA};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Tether local store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

impl LocalStore for SqliteStore {
  type Error = Error;

  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
    let key = key.to_owned();
    let value = self
      .conn
      .call(move |conn| {
        let value: Option<Vec<u8>> = conn
          .query_row(
            "SELECT value FROM kv WHERE key = ?1",
            rusqlite::params![key],
            |r| r.get(0),
          )
          .optional()?;
        Ok(value)
      })
      .await?;
    Ok(value)
  }

  async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
    let key = key.to_owned();
    let at = Utc::now().to_rfc3339();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
           ON CONFLICT(key) DO UPDATE
             SET value = excluded.value, updated_at = excluded.updated_at",
          rusqlite::params![key, value, at],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<()> {
    let key = key.to_owned();
    self
      .conn
      .call(move |conn| {
        conn.execute("DELETE FROM kv WHERE key = ?1", rusqlite::params![key])?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn multi_get(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
    let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    let values = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let mut out = Vec::with_capacity(keys.len());
        for key in &keys {
          let value: Option<Vec<u8>> = stmt
            .query_row(rusqlite::params![key], |r| r.get(0))
            .optional()?;
          out.push(value);
        }
        Ok(out)
      })
      .await?;
    Ok(values)
  }

  async fn multi_set(&self, entries: Vec<(String, Vec<u8>)>) -> Result<()> {
    let at = Utc::now().to_rfc3339();
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE
               SET value = excluded.value, updated_at = excluded.updated_at",
          )?;
          for (key, value) in &entries {
            stmt.execute(rusqlite::params![key, value, at])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
