//! Top-level deployment/release/stemcell jobs (spec §4.L): compose the
//! plan, compiler, package compiler, resource pool updater and job updater
//! under the appropriate lock as a single task body.

use std::time::Duration;

use director_client::{
  entities::{
    release::{Package, ReleaseVersion, Template},
    stemcell::Stemcell,
  },
  error::{DirectorError, Result},
  manifest::Manifest,
};

use crate::{
  compiler, context::Context, job_updater, package_compiler, plan::Plan, resource_pool,
  task::TaskHandle,
};

/// Already-parsed release metadata handed down from the HTTP layer once it
/// has extracted the uploaded release tarball — byte-level blobstore
/// transfer and tarball parsing are out of scope here (spec §1).
pub struct ReleaseUpload {
  pub name: String,
  pub version: String,
  pub packages: Vec<Package>,
  pub templates: Vec<Template>,
}

pub async fn update_deployment(
  ctx: Context,
  manifest_text: String,
  mut handle: TaskHandle,
) -> Result<String> {
  let manifest =
    Manifest::parse(&manifest_text).map_err(|e| DirectorError::BadManifest(e.to_string()))?;
  let plan = Plan::from_manifest(&manifest)?;

  let _busy = ctx
    .action_states
    .try_enter(&plan.name)
    .ok_or_else(|| DirectorError::LockBusy(plan.name.clone()))?;

  handle.log.event(&format!("acquiring lock for deployment {}", plan.name)).await;
  let lock_name = format!("lock:deployment:{}", plan.name);
  let _lock = ctx
    .locks
    .acquire(lock_name, Duration::from_millis(ctx.config.lock_acquire_timeout_ms))
    .await
    .map_err(|e| DirectorError::LockBusy(e.to_string()))?;

  check_not_cancelled(&handle)?;

  handle.log.event("binding plan against database state").await;
  let bound = compiler::bind(&ctx.db, &plan, &manifest_text).await?;

  let packages = resolve_packages(&ctx, &plan).await?;

  handle.log.event("compiling packages").await;
  package_compiler::compile_needed(&ctx, &plan, &packages).await?;

  handle.log.event("reconciling resource pools").await;
  resource_pool::apply_pool_deltas(&ctx, &plan, &bound.pool_deltas).await?;

  check_not_cancelled(&handle)?;

  // Jobs are walked in manifest order; across jobs, updates are sequential
  // (spec §5) — only within a job's canary/bulk split is there parallelism.
  for job in &plan.jobs {
    handle.log.event(&format!("updating job {}", job.name)).await;
    let instances: Vec<_> =
      bound.instances.iter().filter(|i| i.spec.job == job.name).cloned().collect();
    job_updater::update_job(&ctx, &plan, job, &instances, &handle.cancel).await?;
  }

  handle.log.event("removing obsolete instances").await;
  for instance in &bound.obsolete {
    teardown_instance(&ctx, instance).await?;
  }

  Ok(format!("deployment {} updated", plan.name))
}

pub async fn delete_deployment(ctx: Context, name: String, mut handle: TaskHandle) -> Result<String> {
  let _busy = ctx
    .action_states
    .try_enter(&name)
    .ok_or_else(|| DirectorError::LockBusy(name.clone()))?;

  handle.log.event(&format!("acquiring lock for deployment {name}")).await;
  let lock_name = format!("lock:deployment:{name}");
  let _lock = ctx
    .locks
    .acquire(lock_name, Duration::from_millis(ctx.config.lock_acquire_timeout_ms))
    .await
    .map_err(|e| DirectorError::LockBusy(e.to_string()))?;

  let instances = ctx
    .db
    .find_instances(&name)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?;

  for instance in &instances {
    check_not_cancelled(&handle)?;
    handle.log.event(&format!("tearing down {}/{}", instance.job, instance.index)).await;
    teardown_instance(&ctx, instance).await?;
  }

  ctx
    .db
    .delete_deployment(&name)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?;

  Ok(format!("deployment {name} deleted"))
}

pub async fn update_release(ctx: Context, upload: ReleaseUpload, mut handle: TaskHandle) -> Result<String> {
  handle.log.event("acquiring release lock").await;
  let _lock = ctx
    .locks
    .acquire("lock:release", Duration::from_millis(ctx.config.lock_acquire_timeout_ms))
    .await
    .map_err(|e| DirectorError::LockBusy(e.to_string()))?;

  let release = ctx
    .db
    .get_or_create_release(&upload.name)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?;

  if ctx
    .db
    .find_release_version(&release.name, &upload.version)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?
    .is_some()
  {
    return Ok(format!("release {}/{} already present", upload.name, upload.version));
  }

  let mut package_names = Vec::with_capacity(upload.packages.len());
  for package in upload.packages {
    let saved = ctx
      .db
      .upsert_package(package)
      .await
      .map_err(|e| DirectorError::Internal(e.to_string()))?;
    package_names.push(saved.name);
  }

  let mut template_names = Vec::with_capacity(upload.templates.len());
  for template in upload.templates {
    let saved = ctx
      .db
      .upsert_template(template)
      .await
      .map_err(|e| DirectorError::Internal(e.to_string()))?;
    template_names.push(saved.name);
  }

  let version = ReleaseVersion {
    id: String::new(),
    release: release.name.clone(),
    version: upload.version.clone(),
    packages: package_names,
    templates: template_names,
    created_at: director_client::entities::director_timestamp(),
  };
  ctx
    .db
    .insert_release_version(&version)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?;

  Ok(format!("release {}/{} created", upload.name, upload.version))
}

/// `force`: operator override for §9's open question of whether a release
/// still referenced by a deployment manifest can be deleted anyway — by
/// default it can't (`ReleaseInUse`), `force=true` skips the check, same as
/// the `?force=true` query flag on `DELETE /releases/:name` (spec §6).
pub async fn delete_release(ctx: Context, name: String, force: bool, _handle: TaskHandle) -> Result<String> {
  let _lock = ctx
    .locks
    .acquire("lock:release", Duration::from_millis(ctx.config.lock_acquire_timeout_ms))
    .await
    .map_err(|e| DirectorError::LockBusy(e.to_string()))?;

  if !force {
    let deployments = ctx
      .db
      .list_deployments()
      .await
      .map_err(|e| DirectorError::Internal(e.to_string()))?;
    if deployments.iter().any(|d| d.release == name) {
      return Err(DirectorError::ReleaseInUse(name));
    }
  }

  Ok(format!("release {name} marked for deletion (records retained as content-addressed)"))
}

pub async fn update_stemcell(
  ctx: Context,
  image_path: String,
  properties: serde_json::Value,
  name: String,
  version: String,
  sha1: String,
  mut handle: TaskHandle,
) -> Result<String> {
  handle.log.event("acquiring stemcells lock").await;
  let _lock = ctx
    .locks
    .acquire("lock:stemcells", Duration::from_millis(ctx.config.lock_acquire_timeout_ms))
    .await
    .map_err(|e| DirectorError::LockBusy(e.to_string()))?;

  if ctx
    .db
    .find_stemcell(&name, &version)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?
    .is_some()
  {
    return Ok(format!("stemcell {name}/{version} already present"));
  }

  handle.log.event("uploading stemcell to cloud provider").await;
  let cid = ctx.cloud.create_stemcell(&image_path, &properties).await?;

  let stemcell = Stemcell { id: String::new(), name: name.clone(), version: version.clone(), cid, sha1 };
  ctx
    .db
    .insert_stemcell(&stemcell)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?;

  Ok(format!("stemcell {name}/{version} created"))
}

pub async fn delete_stemcell(
  ctx: Context,
  name: String,
  version: String,
  _handle: TaskHandle,
) -> Result<String> {
  let _lock = ctx
    .locks
    .acquire("lock:stemcells", Duration::from_millis(ctx.config.lock_acquire_timeout_ms))
    .await
    .map_err(|e| DirectorError::LockBusy(e.to_string()))?;

  let identity = format!("{name}/{version}");
  let deployments = ctx
    .db
    .list_deployments()
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?;
  if deployments.iter().any(|d| d.stemcells.contains(&identity)) {
    return Err(DirectorError::StemcellInUse(identity));
  }

  let stemcell = ctx
    .db
    .find_stemcell(&name, &version)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?
    .ok_or_else(|| DirectorError::NotFound(format!("stemcell {identity}")))?;

  ctx.cloud.delete_stemcell(&stemcell.cid).await?;
  ctx
    .db
    .delete_stemcell(&name, &version)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?;

  Ok(format!("stemcell {identity} deleted"))
}

fn check_not_cancelled(handle: &TaskHandle) -> Result<()> {
  if handle.cancel.is_cancelled() { Err(DirectorError::Cancelled) } else { Ok(()) }
}

async fn teardown_instance(
  ctx: &Context,
  instance: &director_client::entities::deployment::Instance,
) -> Result<()> {
  if let Some(vm_cid) = &instance.vm {
    if let Some(vm) = ctx
      .db
      .find_vm(vm_cid)
      .await
      .map_err(|e| DirectorError::Internal(e.to_string()))?
    {
      ctx.agent.send(&vm.agent_id, agent_client::api::Stop).await.ok();
    }
    if let Some(disk_cid) = &instance.disk {
      ctx.cloud.detach_disk(vm_cid, disk_cid).await.ok();
      ctx.cloud.delete_disk(disk_cid).await?;
      ctx.db.delete_disk(disk_cid).await.map_err(|e| DirectorError::Internal(e.to_string()))?;
    }
    ctx.cloud.delete_vm(vm_cid).await?;
    ctx.db.delete_vm(vm_cid).await.map_err(|e| DirectorError::Internal(e.to_string()))?;
  }
  ctx
    .db
    .delete_instance(&instance.deployment, &instance.job, instance.index)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))
}

/// Resolves the set of packages actually required by the plan's jobs: each
/// job names a template (spec §3), each template names the packages its
/// job needs (`Template.packages`), and §4.F requires every one of those
/// names be present in the release version — not merely "every package the
/// release happens to contain." Among a name's uploaded versions, the
/// newest is used (spec §3 doesn't pin a version past the name).
async fn resolve_packages(ctx: &Context, plan: &Plan) -> Result<Vec<Package>> {
  let release_version = ctx
    .db
    .find_release_version(&plan.release_name, &plan.release_version)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?
    .ok_or_else(|| {
      DirectorError::NotFound(format!("release version {}/{}", plan.release_name, plan.release_version))
    })?;

  let mut errors = Vec::new();
  let mut package_names = std::collections::HashSet::new();

  for job in &plan.jobs {
    if !release_version.templates.iter().any(|t| t == &job.template) {
      errors.push(format!(
        "job {}: template {} not present in release {}/{}",
        job.name, job.template, plan.release_name, plan.release_version
      ));
      continue;
    }

    let template_versions = ctx
      .db
      .find_templates_by_name(&job.template)
      .await
      .map_err(|e| DirectorError::Internal(e.to_string()))?;
    let Some(template) = template_versions.into_iter().max_by(|a, b| a.version.cmp(&b.version))
    else {
      errors.push(format!("job {}: template {} not found", job.name, job.template));
      continue;
    };

    for name in &template.packages {
      if !release_version.packages.iter().any(|p| p == name) {
        errors.push(format!(
          "job {}: template {} requires package {name}, not present in release {}/{}",
          job.name, job.template, plan.release_name, plan.release_version
        ));
        continue;
      }
      package_names.insert(name.clone());
    }
  }

  if !errors.is_empty() {
    return Err(DirectorError::ValidationFailed(errors));
  }

  let mut packages = Vec::with_capacity(package_names.len());
  for name in package_names {
    let versions = ctx
      .db
      .find_packages_by_name(&name)
      .await
      .map_err(|e| DirectorError::Internal(e.to_string()))?;
    let newest = versions
      .into_iter()
      .max_by(|a, b| a.version.cmp(&b.version))
      .ok_or_else(|| DirectorError::NotFound(format!("package {name}")))?;
    packages.push(newest);
  }
  Ok(packages)
}
