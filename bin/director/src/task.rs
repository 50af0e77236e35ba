//! Task manager (spec §4.D): create durable task records, run their body
//! on a single background worker, capture logs and result, expose status
//! and cooperative cancellation.

use std::{future::Future, pin::Pin, sync::Arc};

use dashmap::DashMap;
use database::Client as Db;
use director_client::{
  entities::task::{Task, TaskKind, TaskState},
  error::{DirectorError, Result},
};
use tokio::{
  fs::{self, File, OpenOptions},
  io::AsyncWriteExt,
  sync::{Mutex, mpsc},
};
use worker_pool::CancelToken;

type BodyFuture = Pin<Box<dyn Future<Output = Result<String>> + Send>>;

/// Append-only sink for a task's `debug`/`event` files (spec §3). Kept
/// open for the task body's entire run.
pub struct TaskLog {
  debug: File,
  event: File,
}

impl TaskLog {
  async fn open(dir: &str) -> anyhow::Result<Self> {
    fs::create_dir_all(dir).await?;
    let debug = OpenOptions::new()
      .create(true)
      .append(true)
      .open(format!("{dir}/debug"))
      .await?;
    let event = OpenOptions::new()
      .create(true)
      .append(true)
      .open(format!("{dir}/event"))
      .await?;
    Ok(Self { debug, event })
  }

  pub async fn debug(&mut self, line: &str) {
    let _ = self.debug.write_all(format!("{line}\n").as_bytes()).await;
  }

  pub async fn event(&mut self, line: &str) {
    let _ = self.event.write_all(format!("{line}\n").as_bytes()).await;
  }
}

struct QueuedTask {
  task: Task,
  cancel: CancelToken,
  body: BodyFuture,
}

/// Handed to every task body closure so it can check for cooperative
/// cancellation and write to the task's log files without reaching back
/// into the manager.
pub struct TaskHandle {
  pub log: TaskLog,
  pub cancel: CancelToken,
}

#[derive(Clone)]
pub struct TaskManager {
  db: Arc<Db>,
  tx: mpsc::UnboundedSender<QueuedTask>,
  cancels: Arc<DashMap<String, CancelToken>>,
}

impl TaskManager {
  /// Spawns `workers` background workers pulling from a shared queue (spec
  /// §4.D: the queue is "keyed by kind", not a single serial drain) — an
  /// `update_deployment` task for one deployment must not block a task for
  /// an unrelated deployment or stemcell. Two tasks that do need to
  /// serialize (e.g. the same deployment) still do, via the
  /// deployment/release/stemcell lock their body acquires, not via the
  /// queue itself.
  pub fn spawn(db: Arc<Db>, workers: usize) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    let rx = Arc::new(Mutex::new(rx));
    let manager =
      Self { db, tx, cancels: Arc::new(DashMap::new()) };
    for _ in 0..workers.max(1) {
      tokio::spawn(manager.clone().run(rx.clone()));
    }
    manager
  }

  async fn run(self, rx: Arc<Mutex<mpsc::UnboundedReceiver<QueuedTask>>>) {
    loop {
      let queued = match rx.lock().await.recv().await {
        Some(queued) => queued,
        None => return,
      };
      self.process(queued).await;
    }
  }

  async fn process(&self, queued: QueuedTask) {
    let id = queued.task.id.clone();
    let became_processing = self
      .db
      .transition_task(&id, TaskState::Queued, TaskState::Processing)
      .await
      .unwrap_or(false);

    if !became_processing {
      // Raced a cancellation request submitted before pickup.
      self
        .db
        .finish_task(&id, TaskState::Cancelled, "cancelled before start".to_string())
        .await
        .ok();
      self.cancels.remove(&id);
      return;
    }

    let outcome = queued.body.await;
    self.cancels.remove(&id);

    match outcome {
      Ok(result) => {
        self.db.finish_task(&id, TaskState::Done, result).await.ok();
      }
      Err(DirectorError::Cancelled) => {
        self
          .db
          .finish_task(&id, TaskState::Cancelled, "cancelled".to_string())
          .await
          .ok();
      }
      Err(e) => {
        self.db.finish_task(&id, TaskState::Error, e.to_string()).await.ok();
      }
    }
  }

  /// Inserts the task row, allocates its output directory, and enqueues
  /// `body` to run on the background worker. Returns immediately with the
  /// task record; the caller (the HTTP layer) redirects to its location.
  pub async fn create<F, Fut>(
    &self,
    task_log_directory: &str,
    kind: TaskKind,
    description: String,
    target: String,
    body: F,
  ) -> Result<Task>
  where
    F: FnOnce(TaskHandle) -> Fut + Send + 'static,
    Fut: Future<Output = Result<String>> + Send + 'static,
  {
    let output = format!("{task_log_directory}/{}", uuid::Uuid::new_v4());
    let task = self
      .db
      .create_task(kind, description, target, output.clone())
      .await
      .map_err(|e| DirectorError::Internal(e.to_string()))?;

    let log = TaskLog::open(&output)
      .await
      .map_err(|e| DirectorError::Internal(e.to_string()))?;
    let cancel = CancelToken::default();
    self.cancels.insert(task.id.clone(), cancel.clone());

    let handle = TaskHandle { log, cancel: cancel.clone() };
    let queued = QueuedTask { task: task.clone(), cancel, body: Box::pin(body(handle)) };
    self
      .tx
      .send(queued)
      .map_err(|_| DirectorError::Internal("task worker channel closed".to_string()))?;

    Ok(task)
  }

  /// Requests cancellation: flips the task row to `cancelling` (only if
  /// it's still queued or processing) and, if it was already running,
  /// flips the in-memory token its body is polling.
  pub async fn request_cancel(&self, id: &str) -> Result<bool> {
    let requested = self
      .db
      .request_cancel_task(id)
      .await
      .map_err(|e| DirectorError::Internal(e.to_string()))?;
    if requested
      && let Some(cancel) = self.cancels.get(id)
    {
      cancel.cancel();
    }
    Ok(requested)
  }
}
