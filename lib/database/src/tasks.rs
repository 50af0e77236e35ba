use anyhow::Context;
use director_client::entities::{
  director_timestamp,
  task::{Task, TaskKind, TaskState},
};
use futures_util::TryStreamExt;
use mungos::mongodb::bson::{doc, oid::ObjectId};

use crate::Client;

impl Client {
  pub async fn create_task(
    &self,
    kind: TaskKind,
    description: String,
    target: String,
    output: String,
  ) -> anyhow::Result<Task> {
    let number = self.next_counter("task").await?;
    let task = Task {
      id: ObjectId::new().to_hex(),
      number,
      kind,
      state: TaskState::Queued,
      timestamp: director_timestamp(),
      description,
      result: String::new(),
      output,
      target,
    };
    self
      .tasks
      .insert_one(&task)
      .await
      .context("failed to insert task")?;
    Ok(task)
  }

  pub async fn get_task(&self, id: &str) -> anyhow::Result<Option<Task>> {
    self
      .tasks
      .find_one(doc! { "_id": id })
      .await
      .context("failed to query task")
  }

  pub async fn list_tasks(&self, limit: i64) -> anyhow::Result<Vec<Task>> {
    let cursor = self
      .tasks
      .find(doc! {})
      .sort(doc! { "timestamp": -1 })
      .limit(limit)
      .await
      .context("failed to query tasks")?;
    cursor
      .try_collect()
      .await
      .context("failed to collect tasks")
  }

  /// Conditional state transition: only applies if the task is currently in
  /// `from`. Returns whether the transition was applied, matching the
  /// at-most-once semantics the task manager relies on (spec §4.D) — a
  /// cancellation racing a worker's own completion must not resurrect a
  /// finished task.
  pub async fn transition_task(
    &self,
    id: &str,
    from: TaskState,
    to: TaskState,
  ) -> anyhow::Result<bool> {
    let res = self
      .tasks
      .update_one(
        doc! { "_id": id, "state": from.as_ref() },
        doc! { "$set": { "state": to.as_ref() } },
      )
      .await
      .context("failed to transition task")?;
    Ok(res.modified_count == 1)
  }

  pub async fn finish_task(
    &self,
    id: &str,
    state: TaskState,
    result: String,
  ) -> anyhow::Result<()> {
    self
      .tasks
      .update_one(
        doc! { "_id": id },
        doc! { "$set": { "state": state.as_ref(), "result": result } },
      )
      .await
      .context("failed to finish task")?;
    Ok(())
  }

  /// Requests cancellation. Only moves `queued` or `processing` tasks into
  /// `cancelling`; a task already terminal is left untouched (spec §4.D).
  pub async fn request_cancel_task(&self, id: &str) -> anyhow::Result<bool> {
    let res = self
      .tasks
      .update_one(
        doc! {
          "_id": id,
          "state": { "$in": [TaskState::Queued.as_ref(), TaskState::Processing.as_ref()] },
        },
        doc! { "$set": { "state": TaskState::Cancelling.as_ref() } },
      )
      .await
      .context("failed to request task cancellation")?;
    Ok(res.modified_count == 1)
  }

  /// Atomically claims the oldest queued task for processing, used by
  /// worker-pool slots pulling work (spec §4.C).
  pub async fn claim_next_queued_task(&self) -> anyhow::Result<Option<Task>> {
    self
      .tasks
      .find_one_and_update(
        doc! { "state": TaskState::Queued.as_ref() },
        doc! { "$set": { "state": TaskState::Processing.as_ref() } },
      )
      .sort(doc! { "timestamp": 1 })
      .await
      .context("failed to claim queued task")
  }

  /// Run once at startup: any task still `processing`/`cancelling` did not
  /// survive the previous process, so it can never be picked back up by a
  /// worker. Mark it `error` rather than leave it stuck forever.
  pub async fn mark_stuck_tasks_errored(&self) -> anyhow::Result<u64> {
    let res = self
      .tasks
      .update_many(
        doc! {
          "state": { "$in": [TaskState::Processing.as_ref(), TaskState::Cancelling.as_ref()] },
        },
        doc! {
          "$set": {
            "state": TaskState::Error.as_ref(),
            "result": "director restarted while task was in flight",
          },
        },
      )
      .await
      .context("failed to clean up stuck tasks on startup")?;
    Ok(res.modified_count)
  }
}
