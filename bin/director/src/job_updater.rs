//! Job updater (spec §4.K): orchestrates instance updaters within one job,
//! canaries first and serially, then the remainder bounded by
//! `max_in_flight`. A canary failure means zero non-canary instances are
//! touched.

use director_client::error::{DirectorError, Result};
use worker_pool::{CancelToken, WorkerPool};

use crate::{
  compiler::{BoundInstance, InstanceAction},
  context::Context,
  instance_updater,
  plan::{JobPlan, Plan},
};

pub async fn update_job(
  ctx: &Context,
  plan: &Plan,
  job: &JobPlan,
  instances: &[BoundInstance],
  cancel: &CancelToken,
) -> Result<()> {
  let needs_update: Vec<&BoundInstance> =
    instances.iter().filter(|i| i.action != InstanceAction::NoChange).collect();
  if needs_update.is_empty() {
    return Ok(());
  }

  let mut ordered = needs_update;
  ordered.sort_by_key(|i| i.spec.index);

  let canary_count = job.update.canaries.min(ordered.len());
  let (canaries, rest) = ordered.split_at(canary_count);

  for bound in canaries {
    instance_updater::update_instance(ctx, plan, job, bound, cancel).await?;
  }

  if rest.is_empty() {
    return Ok(());
  }

  let pool = WorkerPool::new(job.update.max_in_flight);
  let rest: Vec<BoundInstance> = rest.iter().map(|i| (*i).clone()).collect();
  pool
    .run(rest, |bound, pool_cancel| async move {
      // The pool's own token only flips on a worker error; fold in the
      // task-level cancellation (set externally via the task manager) so a
      // requested cancellation also halts the bulk phase from spawning
      // further instances.
      if cancel.is_cancelled() {
        return Err(DirectorError::Cancelled);
      }
      instance_updater::update_instance(ctx, plan, job, &bound, &pool_cancel).await
    })
    .await?;

  Ok(())
}
