//! Resource pool updater (spec §4.I): grows/shrinks each pool's idle VM
//! set to match the deltas the plan compiler computed.

use std::{collections::HashMap, time::Duration};

use agent_client::api;
use director_client::{
  entities::{deployment::Vm, director_timestamp},
  error::{DirectorError, Result},
  manifest::Manifest,
};
use serde_json::json;

use crate::{context::Context, plan::Plan};

const AGENT_READY_TIMEOUT: Duration = Duration::from_secs(120);
const AGENT_READY_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Periodically re-derives each deployment's resource pool sizes from the
/// database and reapplies any drift (e.g. a VM the cloud provider lost
/// without the updater observing it). Best-effort: failures are logged,
/// never propagated, since this runs unattended for the life of the process.
pub fn spawn_sweep_loop(ctx: Context) {
  let period = Duration::from_secs(ctx.config.resource_pool_sweep_interval_secs);
  tokio::spawn(async move {
    let mut interval = tokio::time::interval(period);
    loop {
      interval.tick().await;
      sweep_all(&ctx).await;
    }
  });
}

async fn sweep_all(ctx: &Context) {
  let deployments = match ctx.db.list_deployments().await {
    Ok(d) => d,
    Err(e) => {
      error!("resource pool sweep: failed to list deployments | {e:#}");
      return;
    }
  };
  for deployment in deployments {
    if let Err(e) = sweep_deployment(ctx, &deployment.manifest).await {
      warn!("resource pool sweep: deployment {} failed | {e:#?}", deployment.name);
    }
  }
}

async fn sweep_deployment(ctx: &Context, manifest_text: &str) -> Result<()> {
  let manifest = Manifest::parse(manifest_text)
    .map_err(|e| DirectorError::BadManifest(e.to_string()))?;
  let plan = Plan::from_manifest(&manifest)?;

  let mut deltas = HashMap::new();
  for (pool_name, pool) in &plan.resource_pools {
    let current = ctx
      .db
      .count_vms(&plan.name, pool_name)
      .await
      .map_err(|e| DirectorError::Internal(e.to_string()))? as i64;
    let drift = pool.size as i64 - current;
    if drift != 0 {
      warn!(
        "resource pool sweep: {}/{} has {current} vm(s), wants {}, self-healing",
        plan.name, pool_name, pool.size
      );
      deltas.insert(pool_name.clone(), drift);
    }
  }

  if !deltas.is_empty() {
    apply_pool_deltas(ctx, &plan, &deltas).await?;
  }
  Ok(())
}

pub async fn apply_pool_deltas(
  ctx: &Context,
  plan: &Plan,
  deltas: &HashMap<String, i64>,
) -> Result<()> {
  for (pool_name, delta) in deltas {
    let Some(pool) = plan.resource_pools.get(pool_name) else { continue };
    match delta.cmp(&0) {
      std::cmp::Ordering::Greater => {
        for _ in 0..*delta {
          create_pool_vm(ctx, plan, pool).await?;
        }
      }
      std::cmp::Ordering::Less => {
        delete_idle_vms(ctx, plan, pool_name, (-delta) as i64).await?;
      }
      std::cmp::Ordering::Equal => {}
    }
  }
  Ok(())
}

async fn create_pool_vm(
  ctx: &Context,
  plan: &Plan,
  pool: &crate::plan::ResourcePool,
) -> Result<Vm> {
  let stemcell = ctx
    .db
    .find_stemcell(&pool.stemcell_name, &pool.stemcell_version)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?
    .ok_or_else(|| {
      DirectorError::NotFound(format!(
        "stemcell {}/{}",
        pool.stemcell_name, pool.stemcell_version
      ))
    })?;

  let agent_id = format!("{}-{}", plan.name, uuid::Uuid::new_v4());
  let networks = json!({ "name": pool.network });

  let cid = ctx
    .cloud
    .create_vm(
      &agent_id,
      &stemcell.cid,
      &pool.cloud_properties,
      &networks,
      &pool.env,
    )
    .await?;

  if let Err(e) = wait_for_agent_ready(ctx, &agent_id).await {
    // Creation wasn't cancellable once initiated (spec §5); tear it back
    // down rather than leave an unreachable VM registered.
    ctx.cloud.delete_vm(&cid).await.ok();
    return Err(e);
  }

  ctx.agent.send(&agent_id, api::Apply { state: json!({}) }).await?;

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
  ctx
    .db
    .insert_vm(&vm)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?;
  Ok(vm)
}

async fn wait_for_agent_ready(ctx: &Context, agent_id: &str) -> Result<()> {
  let deadline = tokio::time::Instant::now() + AGENT_READY_TIMEOUT;
  loop {
    match ctx.agent.send_timeout(agent_id, api::Ping, Duration::from_secs(5)).await
    {
      Ok(()) => return Ok(()),
      Err(_) if tokio::time::Instant::now() < deadline => {
        tokio::time::sleep(AGENT_READY_POLL_INTERVAL).await;
      }
      Err(e) => return Err(e),
    }
  }
}

async fn delete_idle_vms(
  ctx: &Context,
  plan: &Plan,
  pool_name: &str,
  count: i64,
) -> Result<()> {
  let idle = ctx
    .db
    .list_idle_vms(&plan.name, pool_name, count)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?;
  for vm in idle {
    ctx.cloud.delete_vm(&vm.cid).await?;
    ctx
      .db
      .delete_vm(&vm.cid)
      .await
      .map_err(|e| DirectorError::Internal(e.to_string()))?;
  }
  Ok(())
}
