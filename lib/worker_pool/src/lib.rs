//! Bounded concurrent execution with first-error-abort semantics (spec
//! §4.C). Generalizes a `join_all` batch-execute pattern from unbounded
//! fan-out to a fixed-width pool and from "collect every result" to "stop
//! at the first failure".

use std::{
  future::Future,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
};

use futures_util::stream::{FuturesUnordered, StreamExt};

/// Shared across a pool run; a worker is expected to check this
/// periodically during long-running steps (e.g. between canary and bulk in
/// the job updater) and return early once it flips, rather than being
/// forcibly killed.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::Relaxed)
  }

  /// Flips the token. Called internally on the first worker error, and
  /// externally by the task manager when a task's cancellation is
  /// requested (spec §4.D) — either source ends in the same state, so
  /// nothing downstream needs to distinguish them.
  pub fn cancel(&self) {
    self.0.store(true, Ordering::Relaxed);
  }
}

pub struct WorkerPool {
  capacity: usize,
}

impl WorkerPool {
  pub fn new(capacity: usize) -> Self {
    Self { capacity: capacity.max(1) }
  }

  /// Runs `items` through `worker`, with at most `capacity` in flight at
  /// once. On the first `Err`, no further items are started; workers
  /// already running are left to observe `cancel.is_cancelled()` and wind
  /// down on their own. Returns the first error once every in-flight
  /// worker has finished.
  pub async fn run<I, T, E, F, Fut>(
    &self,
    items: Vec<I>,
    worker: F,
  ) -> Result<Vec<T>, E>
  where
    F: Fn(I, CancelToken) -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    let cancel = CancelToken::default();
    let mut pending = items.into_iter();
    let mut in_flight = FuturesUnordered::new();
    let mut results = Vec::new();
    let mut first_error = None;

    for item in pending.by_ref().take(self.capacity) {
      in_flight.push(worker(item, cancel.clone()));
    }

    while let Some(outcome) = in_flight.next().await {
      match outcome {
        Ok(value) => {
          results.push(value);
          if first_error.is_none()
            && let Some(item) = pending.next()
          {
            in_flight.push(worker(item, cancel.clone()));
          }
        }
        Err(e) => {
          cancel.cancel();
          first_error.get_or_insert(e);
        }
      }
    }

    match first_error {
      Some(e) => Err(e),
      None => Ok(results),
    }
  }
}
