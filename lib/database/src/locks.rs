use anyhow::Context;
use director_client::entities::{director_timestamp, lock::LockRecord};
use mungos::mongodb::bson::doc;

use crate::Client;

impl Client {
  /// Attempts to acquire a named lock. Succeeds if no row exists, or if the
  /// existing row's `expiry` has already passed — a dead holder's lock is
  /// fair game (spec §4.B).
  pub async fn try_acquire_lock(
    &self,
    name: &str,
    holder: &str,
    ttl_ms: i64,
  ) -> anyhow::Result<bool> {
    let now = director_timestamp();
    let res = self
      .locks
      .update_one(
        doc! { "_id": name, "expiry": { "$lt": now } },
        doc! { "$set": { "holder": holder, "expiry": now + ttl_ms } },
      )
      .upsert(true)
      .await;

    match res {
      Ok(res) => Ok(res.modified_count == 1 || res.upserted_id.is_some()),
      // Upsert raced another acquirer's insert; the other holder won.
      Err(e) if is_duplicate_key(&e) => Ok(false),
      Err(e) => Err(e).context("failed to acquire lock"),
    }
  }

  /// Extends a held lock's expiry, only if `holder` still owns it.
  pub async fn renew_lock(
    &self,
    name: &str,
    holder: &str,
    ttl_ms: i64,
  ) -> anyhow::Result<bool> {
    let res = self
      .locks
      .update_one(
        doc! { "_id": name, "holder": holder },
        doc! { "$set": { "expiry": director_timestamp() + ttl_ms } },
      )
      .await
      .context("failed to renew lock")?;
    Ok(res.modified_count == 1)
  }

  /// Releases a held lock, only if `holder` still owns it.
  pub async fn release_lock(&self, name: &str, holder: &str) -> anyhow::Result<()> {
    self
      .locks
      .delete_one(doc! { "_id": name, "holder": holder })
      .await
      .context("failed to release lock")?;
    Ok(())
  }

  pub async fn get_lock(&self, name: &str) -> anyhow::Result<Option<LockRecord>> {
    self
      .locks
      .find_one(doc! { "_id": name })
      .await
      .context("failed to query lock")
  }
}

fn is_duplicate_key(e: &mungos::mongodb::error::Error) -> bool {
  matches!(
    *e.kind,
    mungos::mongodb::error::ErrorKind::Write(
      mungos::mongodb::error::WriteFailure::WriteError(
        mungos::mongodb::error::WriteError { code: 11000, .. }
      )
    )
  )
}
