//! Package compiler (spec §4.H): compiles every package a deployment's
//! jobs need, per target stemcell, with results cached by dependency
//! closure so an unchanged package/stemcell pair is never recompiled.

use std::{
  collections::{HashMap, HashSet},
  time::Duration,
};

use agent_client::api;
use director_client::{
  entities::{
    compiled_package::{CompileKey, CompiledPackage},
    deployment::Vm,
    director_timestamp,
    release::Package,
  },
  error::{DirectorError, Result},
};
use sha1::{Digest, Sha1};
use worker_pool::WorkerPool;

use crate::{
  context::Context,
  plan::{CompilationPlan, Plan},
};

/// Compiles every package the plan's jobs need, for every stemcell a job's
/// resource pool runs on. Packages already cached for a given stemcell and
/// dependency closure are skipped entirely.
pub async fn compile_needed(
  ctx: &Context,
  plan: &Plan,
  packages: &[Package],
) -> Result<()> {
  let by_name: HashMap<&str, &Package> =
    packages.iter().map(|p| (p.name.as_str(), p)).collect();

  let mut targets: HashSet<(String, String)> = HashSet::new();
  for job in &plan.jobs {
    let Some(pool) = plan.resource_pools.get(&job.resource_pool) else { continue };
    targets.insert((pool.stemcell_name.clone(), pool.stemcell_version.clone()));
  }

  for (stemcell_name, stemcell_version) in targets {
    compile_for_stemcell(ctx, plan, packages, &by_name, &stemcell_name, &stemcell_version)
      .await?;
  }
  Ok(())
}

async fn compile_for_stemcell(
  ctx: &Context,
  plan: &Plan,
  packages: &[Package],
  by_name: &HashMap<&str, &Package>,
  stemcell_name: &str,
  stemcell_version: &str,
) -> Result<()> {
  let mut keys: HashMap<String, CompileKey> = HashMap::new();
  for package in packages {
    let dependency_key = dependency_key(package, by_name)?;
    keys.insert(
      package.name.clone(),
      CompileKey {
        package_name: package.name.clone(),
        package_version: package.version.clone(),
        stemcell_name: stemcell_name.to_string(),
        stemcell_version: stemcell_version.to_string(),
        dependency_key,
      },
    );
  }

  let mut done: HashMap<String, CompiledPackage> = HashMap::new();
  let mut remaining: HashSet<String> =
    packages.iter().map(|p| p.name.clone()).collect();

  for package in packages {
    let key = &keys[&package.name];
    if let Some(cached) = ctx
      .db
      .find_compiled_package(key)
      .await
      .map_err(|e| DirectorError::Internal(e.to_string()))?
    {
      done.insert(package.name.clone(), cached);
      remaining.remove(&package.name);
    }
  }

  // Drive a ready-set, wave by wave: a package is ready once every package
  // it depends on is either already compiled or outside this plan's set.
  while !remaining.is_empty() {
    let ready: Vec<String> = remaining
      .iter()
      .filter(|name| {
        let package = by_name[name.as_str()];
        package.dependencies.iter().all(|dep| !remaining.contains(dep))
      })
      .cloned()
      .collect();

    if ready.is_empty() {
      return Err(DirectorError::BadManifest(
        "package dependency cycle".to_string(),
      ));
    }

    let pool = WorkerPool::new(plan.compilation.workers);
    let compiled = pool
      .run(ready.clone(), |name, _cancel| {
        let ctx = ctx.clone();
        let key = keys[&name].clone();
        let package = (*by_name[name.as_str()]).clone();
        let deps = package
          .dependencies
          .iter()
          .filter_map(|dep| done.get(dep).map(|c| (dep.clone(), c.clone())))
          .collect::<Vec<_>>();
        let compilation = plan.compilation.clone();
        // `run` completes items out of order, so carry the name through
        // rather than zipping against `ready`'s submission order.
        async move { compile_one(&ctx, &package, &key, &deps, &compilation).await.map(|c| (name, c)) }
      })
      .await?;

    for (name, compiled) in compiled {
      remaining.remove(&name);
      done.insert(name, compiled);
    }
  }

  Ok(())
}

/// `sha1(sorted((name, version, fingerprint) of each transitive compile
/// dependency))` — recomputed whenever a package's dependency closure
/// changes, even if the package's own fingerprint didn't.
fn dependency_key(package: &Package, by_name: &HashMap<&str, &Package>) -> Result<String> {
  let mut seen = HashSet::new();
  let mut identities = Vec::new();
  collect_transitive_deps(package, by_name, &mut seen, &mut identities)?;
  identities.sort();

  let mut hasher = Sha1::new();
  for (name, version, fingerprint) in &identities {
    hasher.update(name.as_bytes());
    hasher.update(b":");
    hasher.update(version.as_bytes());
    hasher.update(b":");
    hasher.update(fingerprint.as_bytes());
    hasher.update(b"\n");
  }
  Ok(hex::encode(hasher.finalize()))
}

fn collect_transitive_deps(
  package: &Package,
  by_name: &HashMap<&str, &Package>,
  seen: &mut HashSet<String>,
  out: &mut Vec<(String, String, String)>,
) -> Result<()> {
  for dep_name in &package.dependencies {
    if !seen.insert(dep_name.clone()) {
      continue;
    }
    let dep = by_name.get(dep_name.as_str()).ok_or_else(|| {
      DirectorError::BadManifest(format!(
        "package {} depends on unknown package {dep_name}",
        package.name
      ))
    })?;
    out.push((dep.name.clone(), dep.version.clone(), dep.fingerprint.clone()));
    collect_transitive_deps(dep, by_name, seen, out)?;
  }
  Ok(())
}

/// Compiles a single package under its own `lock:compile:<package>:<stemcell>`
/// lock, re-checking the cache once the lock is held in case a concurrent
/// deployment update compiled it first.
async fn compile_one(
  ctx: &Context,
  package: &Package,
  key: &CompileKey,
  deps: &[(String, CompiledPackage)],
  compilation: &CompilationPlan,
) -> Result<CompiledPackage> {
  let lock_name = format!(
    "lock:compile:{}:{}:{}",
    package.name, key.stemcell_name, key.stemcell_version
  );
  let guard = ctx
    .locks
    .acquire(lock_name, Duration::from_millis(ctx.config.lock_acquire_timeout_ms))
    .await
    .map_err(|e| DirectorError::LockBusy(e.to_string()))?;

  if let Some(cached) = ctx
    .db
    .find_compiled_package(key)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?
  {
    return Ok(cached);
  }

  let vm =
    reserve_compilation_vm(ctx, &key.stemcell_name, &key.stemcell_version, compilation).await?;

  let request = api::CompilePackage {
    blob_id: package.blob_id.clone(),
    sha1: package.fingerprint.clone(),
    name: package.name.clone(),
    version: package.version.clone(),
    deps: deps
      .iter()
      .map(|(name, c)| (name.clone(), c.package_version.clone(), c.blob_id.clone(), c.sha1.clone()))
      .collect(),
  };

  let result = ctx.agent.send(&vm.agent_id, request).await;
  release_compilation_vm(ctx, &vm).await;

  let result = result.map_err(|e| DirectorError::CompilationFailed {
    package: package.name.clone(),
    message: e.to_string(),
  })?;

  let compiled = CompiledPackage {
    id: String::new(),
    package_name: package.name.clone(),
    package_version: package.version.clone(),
    stemcell_name: key.stemcell_name.clone(),
    stemcell_version: key.stemcell_version.clone(),
    dependency_key: key.dependency_key.clone(),
    blob_id: result.blob_id,
    sha1: result.sha1,
  };
  ctx
    .db
    .insert_compiled_package(&compiled)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?;

  drop(guard);
  Ok(compiled)
}

/// Compilation VMs are drawn from a dedicated idle pool (spec §4.H step
/// 3c/d), the same idle-VM bookkeeping ordinary resource pools get (spec
/// §4.I): a deployment/resource-pool pair that exists only to namespace
/// this stemcell's compile VMs in the `vms` collection, not a deployment a
/// manifest ever names.
fn compilation_pool_key(stemcell_name: &str, stemcell_version: &str) -> (String, &'static str) {
  (format!("_compilation:{stemcell_name}:{stemcell_version}"), "_compilation")
}

/// Reserves a compile VM for `(stemcell_name, stemcell_version)`: reuses an
/// idle one from a prior compile if one is available and still reachable,
/// otherwise creates a fresh one straight off the stemcell against the
/// release's compilation network.
async fn reserve_compilation_vm(
  ctx: &Context,
  stemcell_name: &str,
  stemcell_version: &str,
  compilation: &CompilationPlan,
) -> Result<Vm> {
  let (deployment, resource_pool) = compilation_pool_key(stemcell_name, stemcell_version);

  while let Some(vm) = ctx
    .db
    .find_idle_vm(&deployment, resource_pool)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?
  {
    ctx
      .db
      .bind_vm(&vm.cid, Some("compiling"))
      .await
      .map_err(|e| DirectorError::Internal(e.to_string()))?;
    match ctx.agent.send_timeout(&vm.agent_id, api::Ping, Duration::from_secs(5)).await {
      Ok(()) => return Ok(vm),
      Err(_) => {
        // Stale idle VM (cloud provider lost it between compiles); drop it
        // and try the next idle one or fall through to creating fresh.
        ctx.cloud.delete_vm(&vm.cid).await.ok();
        ctx.db.delete_vm(&vm.cid).await.ok();
      }
    }
  }

  let stemcell = ctx
    .db
    .find_stemcell(stemcell_name, stemcell_version)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?
    .ok_or_else(|| {
      DirectorError::NotFound(format!("stemcell {stemcell_name}/{stemcell_version}"))
    })?;

  let agent_id = format!("compile-{}", uuid::Uuid::new_v4());
  let networks = match &compilation.network {
    Some(name) => serde_json::json!({ "name": name }),
    None => serde_json::Value::Null,
  };
  let cid = ctx
    .cloud
    .create_vm(
      &agent_id,
      &stemcell.cid,
      &compilation.cloud_properties,
      &networks,
      &serde_json::Value::Null,
    )
    .await?;

  let deadline = tokio::time::Instant::now() + Duration::from_secs(120);
  loop {
    match ctx.agent.send_timeout(&agent_id, api::Ping, Duration::from_secs(5)).await {
      Ok(()) => break,
      Err(_) if tokio::time::Instant::now() < deadline => {
        tokio::time::sleep(Duration::from_secs(2)).await;
      }
      Err(e) => {
        ctx.cloud.delete_vm(&cid).await.ok();
        return Err(e);
      }
    }
  }

  let vm = Vm {
    id: String::new(),
    cid,
    agent_id,
    deployment,
    resource_pool: resource_pool.to_string(),
    stemcell_name: stemcell_name.to_string(),
    stemcell_version: stemcell_version.to_string(),
    instance: Some("compiling".to_string()),
    created_at: director_timestamp(),
  };
  ctx
    .db
    .insert_vm(&vm)
    .await
    .map_err(|e| DirectorError::Internal(e.to_string()))?;
  Ok(vm)
}

/// Returns a compile VM to its pool's idle set instead of tearing it down,
/// so the next package compiled against the same stemcell can reuse it.
async fn release_compilation_vm(ctx: &Context, vm: &Vm) {
  if let Err(e) = ctx.db.bind_vm(&vm.cid, None).await {
    warn!("failed to return compile vm {} to idle pool | {e:#}", vm.cid);
  }
}
