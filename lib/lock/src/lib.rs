//! Distributed lock over the Mongo-backed lock collection (spec §4.B).
//!
//! Same acquire-returns-a-guard shape as an in-process busy-tracking
//! mutex: the guard's `Drop` clears the held state. Here the state lives
//! in Mongo instead of a `Mutex`, so release needs to cross an await
//! point — the guard's `Drop` spawns the release instead of running it
//! inline.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, anyhow};
use database::Client;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Default time a held lock survives without renewal before another holder
/// may steal it. Chosen well above the renewal interval so a single missed
/// renewal doesn't cause a handoff.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);
const RENEW_INTERVAL: Duration = Duration::from_secs(10);
const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Clone)]
pub struct LockManager {
  db: Arc<Client>,
}

impl LockManager {
  pub fn new(db: Arc<Client>) -> Self {
    Self { db }
  }

  /// Blocks until `name` is acquired or `timeout` elapses. While held, a
  /// background task renews the lock's TTL; the returned guard releases it
  /// on drop (spec §4.B).
  pub async fn acquire(
    &self,
    name: impl Into<String>,
    timeout: Duration,
  ) -> anyhow::Result<LockGuard> {
    let name = name.into();
    let holder = Uuid::new_v4().to_string();
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
      if self
        .db
        .try_acquire_lock(&name, &holder, DEFAULT_TTL.as_millis() as i64)
        .await
        .context("failed to attempt lock acquisition")?
      {
        break;
      }
      if tokio::time::Instant::now() >= deadline {
        return Err(anyhow!("timed out waiting for lock '{name}'"));
      }
      tokio::time::sleep(ACQUIRE_POLL_INTERVAL).await;
    }

    let renew_task = {
      let db = self.db.clone();
      let name = name.clone();
      let holder = holder.clone();
      tokio::spawn(async move {
        loop {
          tokio::time::sleep(RENEW_INTERVAL).await;
          if let Err(e) = db
            .renew_lock(&name, &holder, DEFAULT_TTL.as_millis() as i64)
            .await
          {
            tracing::warn!("failed to renew lock '{name}': {e:#}");
          }
        }
      })
    };

    Ok(LockGuard {
      db: self.db.clone(),
      name,
      holder,
      renew_task: Some(renew_task),
    })
  }

  /// Non-blocking acquisition, used where the caller treats "already locked"
  /// as a normal outcome rather than something to wait out (e.g. a periodic
  /// reconciler skipping a deployment another operation already touches).
  pub async fn try_acquire(
    &self,
    name: impl Into<String>,
  ) -> anyhow::Result<Option<LockGuard>> {
    match self.acquire(name, Duration::ZERO).await {
      Ok(guard) => Ok(Some(guard)),
      Err(_) => Ok(None),
    }
  }
}

/// Held while the lock is owned. Dropping it stops the renewal task and
/// spawns a best-effort release; release failure just lets the TTL expire.
pub struct LockGuard {
  db: Arc<Client>,
  name: String,
  holder: String,
  renew_task: Option<JoinHandle<()>>,
}

impl LockGuard {
  pub fn name(&self) -> &str {
    &self.name
  }
}

impl Drop for LockGuard {
  fn drop(&mut self) {
    if let Some(task) = self.renew_task.take() {
      task.abort();
    }
    let db = self.db.clone();
    let name = self.name.clone();
    let holder = self.holder.clone();
    tokio::spawn(async move {
      if let Err(e) = db.release_lock(&name, &holder).await {
        tracing::warn!("failed to release lock '{name}': {e:#}");
      }
    });
  }
}
