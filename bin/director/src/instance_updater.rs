//! Instance updater (spec §4.J): per-instance state machine that drives a
//! VM from its current configuration to the target one. Every branch
//! bottoms out at `done` or a `DirectorError::InstanceUpdateFailed`.

use std::time::Duration;

use agent_client::api;
use director_client::{
  entities::{
    deployment::{Disk, Instance, Vm},
    director_timestamp,
  },
  error::{DirectorError, Result},
};
use uuid::Uuid;
use worker_pool::CancelToken;

use crate::{
  compiler::{BoundInstance, InstanceAction},
  context::Context,
  plan::{JobPlan, Plan},
};

/// Drives one bound instance to its target state. `cancel` is polled
/// before the update starts and again before `watch`, the two suspension
/// points a task body can observe a cancellation request at (spec §5).
pub async fn update_instance(
  ctx: &Context,
  plan: &Plan,
  job: &JobPlan,
  bound: &BoundInstance,
  cancel: &CancelToken,
) -> Result<()> {
  if cancel.is_cancelled() {
    return Err(DirectorError::Cancelled);
  }

  match bound.action {
    InstanceAction::NoChange => Ok(()),
    InstanceAction::Restart => restart(ctx, plan, job, bound, cancel).await,
    InstanceAction::Recreate => recreate(ctx, plan, job, bound, cancel, true).await,
    InstanceAction::New => recreate(ctx, plan, job, bound, cancel, false).await,
  }
}

async fn restart(
  ctx: &Context,
  plan: &Plan,
  job: &JobPlan,
  bound: &BoundInstance,
  cancel: &CancelToken,
) -> Result<()> {
  let existing = bound.existing.as_ref().ok_or_else(|| {
    DirectorError::Internal(format!(
      "restart requested for {}/{} with no existing instance",
      bound.spec.job, bound.spec.index
    ))
  })?;
  let agent_id = agent_id_for(ctx, existing).await?;

  ctx.agent.send(&agent_id, api::Stop).await?;
  ctx.agent.send(&agent_id, api::Apply { state: bound.spec.target_state.clone() }).await?;
  ctx.agent.send(&agent_id, api::Start).await?;
  watch(ctx, &agent_id, job, bound, cancel).await?;

  persist_instance(ctx, plan, bound, existing.vm.clone(), existing.disk.clone()).await
}

async fn recreate(
  ctx: &Context,
  plan: &Plan,
  job: &JobPlan,
  bound: &BoundInstance,
  cancel: &CancelToken,
  has_prior_vm: bool,
) -> Result<()> {
  let mut prior_disk_cid = None;

  if has_prior_vm {
    if let Some(existing) = &bound.existing {
      let agent_id = agent_id_for(ctx, existing).await?;
      ctx.agent.send(&agent_id, api::Stop).await?;

      if let Some(disk_cid) = &existing.disk {
        ctx.agent.send(&agent_id, api::UnmountDisk { cid: disk_cid.clone() }).await?;
        ctx.cloud.detach_disk(existing.vm.as_deref().unwrap_or_default(), disk_cid).await?;
        prior_disk_cid = Some(disk_cid.clone());
      }

      if let Some(vm_cid) = &existing.vm {
        ctx.cloud.delete_vm(vm_cid).await?;
        ctx
          .db
          .delete_vm(vm_cid)
          .await
          .map_err(|e| DirectorError::Internal(e.to_string()))?;
      }
    }
  }

  let pool = plan.resource_pools.get(&job.resource_pool).ok_or_else(|| {
    DirectorError::Internal(format!("resource pool {} not found in plan", job.resource_pool))
  })?;

  let vm = reserve_instance_vm(ctx, plan, pool).await?;

  let instance_key = format!("{}/{}", bound.spec.job, bound.spec.index);

  // The VM stays registered even if disk provisioning fails; a retry of
  // this instance picks it up as an idle VM to reuse rather than leaking it.
  let disk_cid = match job.persistent_disk_mb {
    Some(size_mb) => {
      Some(provision_disk(ctx, &vm, size_mb, prior_disk_cid.as_deref(), &instance_key).await?)
    }
    None => None,
  };

  ctx
    .db
    .bind_vm(&vm.cid, Some(&format!("{}/{}", bound.spec.job, bound.spec.index)))
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?;

  ctx.agent.send(&vm.agent_id, api::Apply { state: bound.spec.target_state.clone() }).await?;
  ctx.agent.send(&vm.agent_id, api::Start).await?;
  watch(ctx, &vm.agent_id, job, bound, cancel).await?;

  persist_instance(ctx, plan, bound, Some(vm.cid), disk_cid).await
}

async fn agent_id_for(ctx: &Context, existing: &Instance) -> Result<String> {
  let vm_cid = existing.vm.as_deref().ok_or_else(|| {
    DirectorError::Internal(format!(
      "instance {}/{} has no vm to address",
      existing.job, existing.index
    ))
  })?;
  let vm = ctx
    .db
    .find_vm(vm_cid)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?
    .ok_or_else(|| DirectorError::NotFound(format!("vm {vm_cid}")))?;
  Ok(vm.agent_id)
}

/// Reuses an idle VM from the job's resource pool if one is available,
/// otherwise creates one fresh — the resource pool updater (§4.I) is
/// expected to have already grown the pool to cover this instance, so the
/// idle path is the common one.
async fn reserve_instance_vm(
  ctx: &Context,
  plan: &Plan,
  pool: &crate::plan::ResourcePool,
) -> Result<Vm> {
  if let Some(vm) = ctx
    .db
    .find_idle_vm(&plan.name, &pool.name)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?
  {
    return Ok(vm);
  }

  let stemcell = ctx
    .db
    .find_stemcell(&pool.stemcell_name, &pool.stemcell_version)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?
    .ok_or_else(|| {
      DirectorError::NotFound(format!("stemcell {}/{}", pool.stemcell_name, pool.stemcell_version))
    })?;

  let agent_id = format!("{}-{}", plan.name, Uuid::new_v4());
  let networks = serde_json::json!({ "name": pool.network });
  let cid = ctx
    .cloud
    .create_vm(&agent_id, &stemcell.cid, &pool.cloud_properties, &networks, &pool.env)
    .await?;

  wait_for_agent_ready(ctx, &agent_id).await?;

  let vm = Vm {
    id: String::new(),
    cid,
    agent_id,
    deployment: plan.name.clone(),
    resource_pool: pool.name.clone(),
    stemcell_name: pool.stemcell_name.clone(),
    stemcell_version: pool.stemcell_version.clone(),
    instance: None,
    created_at: director_timestamp(),
  };
  ctx.db.insert_vm(&vm).await.map_err(|e| DirectorError::Internal(e.to_string()))?;
  Ok(vm)
}

async fn wait_for_agent_ready(ctx: &Context, agent_id: &str) -> Result<()> {
  let deadline = tokio::time::Instant::now() + Duration::from_secs(120);
  loop {
    match ctx.agent.send_timeout(agent_id, api::Ping, Duration::from_secs(5)).await {
      Ok(()) => return Ok(()),
      Err(_) if tokio::time::Instant::now() < deadline => {
        tokio::time::sleep(Duration::from_secs(2)).await;
      }
      Err(e) => return Err(e),
    }
  }
}

/// Creates the new disk, attaches both old and new, asks the agent to
/// migrate data, then detaches and deletes the old one. The old disk is
/// preserved and the new one torn down on any failure (spec §4.J).
async fn provision_disk(
  ctx: &Context,
  vm: &Vm,
  size_mb: i64,
  prior_cid: Option<&str>,
  instance_key: &str,
) -> Result<String> {
  let Some(prior_cid) = prior_cid else {
    let cid = ctx.cloud.create_disk(size_mb, &vm.cid).await?;
    ctx.cloud.attach_disk(&vm.cid, &cid).await?;
    ctx.agent.send(&vm.agent_id, api::MountDisk { cid: cid.clone() }).await?;
    let disk =
      Disk { id: String::new(), cid: cid.clone(), size_mb, instance: instance_key.to_string() };
    ctx.db.insert_disk(&disk).await.map_err(|e| DirectorError::Internal(e.to_string()))?;
    return Ok(cid);
  };

  let prior = ctx
    .db
    .find_disk(prior_cid)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?
    .ok_or_else(|| DirectorError::NotFound(format!("disk {prior_cid}")))?;

  if prior.size_mb == size_mb {
    ctx.cloud.attach_disk(&vm.cid, prior_cid).await?;
    ctx.agent.send(&vm.agent_id, api::MountDisk { cid: prior_cid.to_string() }).await?;
    return Ok(prior_cid.to_string());
  }

  let new_cid = ctx.cloud.create_disk(size_mb, &vm.cid).await?;
  let migrate = async {
    ctx.cloud.attach_disk(&vm.cid, prior_cid).await?;
    ctx.cloud.attach_disk(&vm.cid, &new_cid).await?;
    ctx
      .agent
      .send(&vm.agent_id, api::MigrateDisk { old_cid: prior_cid.to_string(), new_cid: new_cid.clone() })
      .await?;
    ctx.cloud.detach_disk(&vm.cid, prior_cid).await?;
    ctx.cloud.delete_disk(prior_cid).await?;
    ctx.db.delete_disk(prior_cid).await.map_err(|e| DirectorError::Internal(e.to_string()))?;
    Result::Ok(())
  }
  .await;

  if let Err(e) = migrate {
    ctx.cloud.delete_disk(&new_cid).await.ok();
    return Err(e);
  }

  let disk = Disk {
    id: String::new(),
    cid: new_cid.clone(),
    size_mb,
    instance: instance_key.to_string(),
  };
  ctx.db.insert_disk(&disk).await.map_err(|e| DirectorError::Internal(e.to_string()))?;
  Ok(new_cid)
}

/// Polls `get_job_status` until `running` or `update_watch_time` elapses;
/// any other terminal condition is `instance_update_failed` (spec §4.J).
async fn watch(
  ctx: &Context,
  agent_id: &str,
  job: &JobPlan,
  bound: &BoundInstance,
  cancel: &CancelToken,
) -> Result<()> {
  if cancel.is_cancelled() {
    return Err(DirectorError::Cancelled);
  }

  let deadline = tokio::time::Instant::now() + Duration::from_millis(job.update.update_watch_time);
  loop {
    match ctx.agent.send(agent_id, api::GetJobStatus).await? {
      api::JobStatus::Running => return Ok(()),
      api::JobStatus::Starting | api::JobStatus::Failing => {
        if tokio::time::Instant::now() >= deadline {
          return Err(DirectorError::InstanceUpdateFailed {
            job: bound.spec.job.clone(),
            index: bound.spec.index,
            message: "job did not reach running before the watch deadline".to_string(),
          });
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
      }
    }
  }
}

async fn persist_instance(
  ctx: &Context,
  plan: &Plan,
  bound: &BoundInstance,
  vm: Option<String>,
  disk: Option<String>,
) -> Result<()> {
  let instance = Instance {
    id: bound.existing.as_ref().map(|i| i.id.clone()).unwrap_or_default(),
    deployment: plan.name.clone(),
    job: bound.spec.job.clone(),
    index: bound.spec.index,
    current_state: Some(bound.spec.target_state.clone()),
    vm,
    disk,
    ip: bound.spec.ip.map(|ip| ip.to_string()),
    network: Some(bound.spec.network.clone()),
  };
  ctx
    .db
    .upsert_instance(&instance)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))
}
