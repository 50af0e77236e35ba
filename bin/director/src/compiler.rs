//! Deployment plan compiler / binding (spec §4.G): reconciles a validated
//! `Plan` against the database to produce bound work. Every decision here
//! is materialized before any agent RPC or cloud call — the rest of the
//! update is a pure execution of the bound plan.

use std::collections::{HashMap, HashSet};

use database::Client as Db;
use director_client::{
  entities::deployment::{Deployment, Instance},
  error::{DirectorError, Result},
};

use crate::plan::{InstanceSpec, Plan, ResourcePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceAction {
  NoChange,
  Restart,
  Recreate,
  New,
}

#[derive(Debug, Clone)]
pub struct BoundInstance {
  pub spec: InstanceSpec,
  pub action: InstanceAction,
  pub existing: Option<Instance>,
}

#[derive(Debug, Clone)]
pub struct BoundPlan {
  pub deployment: Deployment,
  pub instances: Vec<BoundInstance>,
  /// Instance rows present in the database but absent from the current
  /// plan — scheduled for deletion (spec §4.G step 4).
  pub obsolete: Vec<Instance>,
  /// `target_size - (bound_instances + idle_vms)` per resource pool.
  pub pool_deltas: HashMap<String, i64>,
}

/// Loads or creates the `Deployment` row, adopts existing instances by
/// `(job, index)`, classifies each against its target state, and computes
/// the obsolete set and resource pool deltas.
pub async fn bind(db: &Db, plan: &Plan, manifest_text: &str) -> Result<BoundPlan> {
  let deployment = load_or_create_deployment(db, plan, manifest_text).await?;

  let existing = db
    .find_instances(&plan.name)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?;
  let mut existing_by_key: HashMap<(String, i64), Instance> =
    existing.into_iter().map(|i| (i.key(), i.clone())).collect();

  let mut planned_keys = HashSet::new();
  let mut bound = Vec::new();

  for job in &plan.jobs {
    let pool = plan.resource_pools.get(&job.resource_pool);
    for spec in &job.instances {
      planned_keys.insert((spec.job.clone(), spec.index));
      let existing = existing_by_key.remove(&(spec.job.clone(), spec.index));
      let action =
        classify(db, &existing, spec, job.persistent_disk_mb, pool).await?;
      bound.push(BoundInstance { spec: spec.clone(), action, existing });
    }
  }

  // Anything left in `existing_by_key` wasn't claimed by the plan.
  let obsolete: Vec<Instance> = existing_by_key.into_values().collect();

  let pool_deltas = compute_pool_deltas(db, plan, &bound).await?;

  Ok(BoundPlan { deployment, instances: bound, obsolete, pool_deltas })
}

async fn load_or_create_deployment(
  db: &Db,
  plan: &Plan,
  manifest_text: &str,
) -> Result<Deployment> {
  if let Some(mut deployment) = db
    .find_deployment(&plan.name)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?
  {
    deployment.manifest = manifest_text.to_string();
    deployment.release = plan.release_name.clone();
    deployment.release_version = plan.release_version.clone();
    deployment.updated_at = director_client::entities::director_timestamp();
    db.upsert_deployment(&deployment)
      .await
      .map_err(|e| DirectorError::Internal(e.to_string()))?;
    Ok(deployment)
  } else {
    let deployment = Deployment {
      id: String::new(),
      name: plan.name.clone(),
      manifest: manifest_text.to_string(),
      release: plan.release_name.clone(),
      release_version: plan.release_version.clone(),
      stemcells: plan
        .resource_pools
        .values()
        .map(|p| format!("{}/{}", p.stemcell_name, p.stemcell_version))
        .collect(),
      updated_at: director_client::entities::director_timestamp(),
    };
    db.upsert_deployment(&deployment)
      .await
      .map_err(|e| DirectorError::Internal(e.to_string()))?;
    db.find_deployment(&plan.name)
      .await
      .map_err(|e| DirectorError::Internal(e.to_string()))?
      .ok_or_else(|| {
        DirectorError::Internal("deployment vanished after insert".into())
      })
  }
}

/// `recreate` is required when persistent disk size changes, the
/// stemcell backing the instance's VM differs from the job's resource
/// pool stemcell, or network topology requires a new VM; `restart` when
/// only the target state (job config/packages) changed; `no_change` when
/// the target state is identical to what's currently applied.
async fn classify(
  db: &Db,
  existing: &Option<Instance>,
  spec: &InstanceSpec,
  persistent_disk_mb: Option<i64>,
  pool: Option<&ResourcePool>,
) -> Result<InstanceAction> {
  let Some(existing) = existing else {
    return Ok(InstanceAction::New);
  };

  let Some(vm_cid) = &existing.vm else {
    return Ok(InstanceAction::New);
  };

  if let (Some(disk_cid), Some(target_mb)) = (&existing.disk, persistent_disk_mb)
  {
    if let Some(disk) = db
      .find_disk(disk_cid)
      .await
      .map_err(|e| DirectorError::Internal(e.to_string()))?
    {
      if disk.size_mb != target_mb {
        return Ok(InstanceAction::Recreate);
      }
    }
  } else if existing.disk.is_some() != persistent_disk_mb.is_some() {
    // Disk added or removed entirely requires a new VM attach/detach cycle.
    return Ok(InstanceAction::Recreate);
  }

  if existing.network.as_deref() != Some(spec.network.as_str()) {
    return Ok(InstanceAction::Recreate);
  }

  if let Some(pool) = pool
    && let Some(vm) = db
      .find_vm(vm_cid)
      .await
      .map_err(|e| DirectorError::Internal(e.to_string()))?
    && (vm.stemcell_name != pool.stemcell_name
      || vm.stemcell_version != pool.stemcell_version)
  {
    return Ok(InstanceAction::Recreate);
  }

  match &existing.current_state {
    Some(current) if *current == spec.target_state => {
      Ok(InstanceAction::NoChange)
    }
    _ => Ok(InstanceAction::Restart),
  }
}

/// `target_size - (bound_instances + idle_vms)` (spec §4.I) — `count_vms`
/// already counts every VM the deployment holds in that pool, bound or
/// idle, so the delta is simply size minus that total.
async fn compute_pool_deltas(
  db: &Db,
  plan: &Plan,
  _bound: &[BoundInstance],
) -> Result<HashMap<String, i64>> {
  let mut deltas = HashMap::new();
  for pool in plan.resource_pools.values() {
    let total = db
      .count_vms(&plan.name, &pool.name)
      .await
      .map_err(|e| DirectorError::Internal(e.to_string()))?;
    deltas.insert(pool.name.clone(), pool.size as i64 - total as i64);
  }
  Ok(deltas)
}
