//! Deployment plan (spec §4.F): the validated, resolved view of a manifest
//! before any database or cloud interaction. Construction is pure — it
//! never touches `Context` — so it can be unit tested without a database.

use std::{
  collections::{HashMap, HashSet},
  net::Ipv4Addr,
  str::FromStr,
};

use director_client::{
  error::DirectorError,
  manifest::{
    JobNetwork, JobSpec, Manifest, NetworkSpec, NetworkType,
    ResourcePoolSpec, UpdatePolicy,
  },
};
use ipnetwork::Ipv4Network;
use serde_json::Value;

pub type Result<T> = std::result::Result<T, DirectorError>;

#[derive(Debug, Clone)]
pub struct Plan {
  pub name: String,
  pub release_name: String,
  pub release_version: String,
  pub networks: HashMap<String, Network>,
  pub resource_pools: HashMap<String, ResourcePool>,
  pub compilation: CompilationPlan,
  pub jobs: Vec<JobPlan>,
}

#[derive(Debug, Clone)]
pub struct Network {
  pub name: String,
  pub kind: NetworkType,
  pub subnets: Vec<Subnet>,
}

#[derive(Debug, Clone)]
pub struct Subnet {
  pub range: Ipv4Network,
  pub static_ranges: Vec<(Ipv4Addr, Ipv4Addr)>,
  pub reserved_ranges: Vec<(Ipv4Addr, Ipv4Addr)>,
  pub dns: Vec<String>,
  pub cloud_properties: Value,
}

impl Subnet {
  fn contains_static(&self, ip: Ipv4Addr) -> bool {
    self.static_ranges.iter().any(|(lo, hi)| ip >= *lo && ip <= *hi)
  }
}

#[derive(Debug, Clone)]
pub struct ResourcePool {
  pub name: String,
  pub stemcell_name: String,
  pub stemcell_version: String,
  pub cloud_properties: Value,
  pub network: String,
  pub size: usize,
  pub env: Value,
}

#[derive(Debug, Clone, Default)]
pub struct CompilationPlan {
  pub workers: usize,
  pub cloud_properties: Value,
  pub network: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JobPlan {
  pub name: String,
  pub template: String,
  pub resource_pool: String,
  pub update: UpdatePolicy,
  pub persistent_disk_mb: Option<i64>,
  pub instances: Vec<InstanceSpec>,
}

#[derive(Debug, Clone)]
pub struct InstanceSpec {
  pub job: String,
  pub index: i64,
  pub network: String,
  /// `None` for dynamic/vip network bindings, resolved by the provider.
  pub ip: Option<Ipv4Addr>,
  pub target_state: Value,
}

impl Plan {
  /// Builds and validates a `Plan` from a parsed manifest. Every invariant
  /// in spec §4.F that is checkable without the database is checked here;
  /// all violations are collected and returned together as a single
  /// `ValidationFailed`, per §7's aggregation policy — template/package
  /// presence is checked later by the compiler, which has release data.
  pub fn from_manifest(manifest: &Manifest) -> Result<Plan> {
    let mut errors = Vec::new();

    let networks = build_networks(manifest, &mut errors);
    let resource_pools = build_resource_pools(manifest, &networks, &mut errors);
    let jobs =
      build_jobs(manifest, &networks, &resource_pools, &mut errors);

    if !errors.is_empty() {
      return Err(DirectorError::ValidationFailed(errors));
    }

    Ok(Plan {
      name: manifest.name.clone(),
      release_name: manifest.release.name.clone(),
      release_version: manifest.release.version.clone(),
      networks,
      resource_pools,
      compilation: CompilationPlan {
        workers: manifest.compilation.workers,
        cloud_properties: manifest.compilation.cloud_properties.clone(),
        network: manifest.compilation.network.clone(),
      },
      jobs,
    })
  }
}

fn build_networks(
  manifest: &Manifest,
  errors: &mut Vec<String>,
) -> HashMap<String, Network> {
  let mut networks = HashMap::new();
  for spec in &manifest.networks {
    let NetworkSpec { name, kind, subnets } = spec;
    let mut resolved = Vec::with_capacity(subnets.len());
    for subnet in subnets {
      let range = match Ipv4Network::from_str(&subnet.range) {
        Ok(range) => range,
        Err(e) => {
          errors.push(format!(
            "network {name}: invalid subnet range {:?}: {e}",
            subnet.range
          ));
          continue;
        }
      };
      let static_ranges = parse_ranges(&subnet.static_ranges, name, errors);
      let reserved_ranges =
        parse_ranges(&subnet.reserved_ranges, name, errors);
      resolved.push(Subnet {
        range,
        static_ranges,
        reserved_ranges,
        dns: subnet.dns.clone(),
        cloud_properties: subnet.cloud_properties.clone(),
      });
    }
    // Two subnets in the same network must not overlap (consistency of
    // cloud properties across a shared range is only meaningful if the
    // ranges themselves don't already collide).
    for i in 0..resolved.len() {
      for j in (i + 1)..resolved.len() {
        if ranges_overlap(resolved[i].range, resolved[j].range) {
          errors.push(format!(
            "network {name}: subnets {} and {} overlap",
            resolved[i].range, resolved[j].range
          ));
        }
      }
    }
    networks.insert(
      name.clone(),
      Network { name: name.clone(), kind: *kind, subnets: resolved },
    );
  }
  networks
}

fn ranges_overlap(a: Ipv4Network, b: Ipv4Network) -> bool {
  let a_lo = u32::from(a.network());
  let a_hi = u32::from(a.broadcast());
  let b_lo = u32::from(b.network());
  let b_hi = u32::from(b.broadcast());
  a_lo <= b_hi && b_lo <= a_hi
}

fn parse_ranges(
  raw: &[String],
  network: &str,
  errors: &mut Vec<String>,
) -> Vec<(Ipv4Addr, Ipv4Addr)> {
  raw
    .iter()
    .filter_map(|range| match range.split_once('-') {
      Some((lo, hi)) => {
        match (Ipv4Addr::from_str(lo.trim()), Ipv4Addr::from_str(hi.trim()))
        {
          (Ok(lo), Ok(hi)) => Some((lo, hi)),
          _ => {
            errors.push(format!(
              "network {network}: invalid ip range {range:?}"
            ));
            None
          }
        }
      }
      None => match Ipv4Addr::from_str(range.trim()) {
        Ok(ip) => Some((ip, ip)),
        Err(_) => {
          errors.push(format!(
            "network {network}: invalid ip range {range:?}"
          ));
          None
        }
      },
    })
    .collect()
}

fn build_resource_pools(
  manifest: &Manifest,
  networks: &HashMap<String, Network>,
  errors: &mut Vec<String>,
) -> HashMap<String, ResourcePool> {
  let mut pools = HashMap::new();
  for ResourcePoolSpec { name, stemcell, cloud_properties, network, size, env } in
    &manifest.resource_pools
  {
    if !networks.contains_key(network) {
      errors.push(format!(
        "resource pool {name}: references unknown network {network}"
      ));
    }
    pools.insert(
      name.clone(),
      ResourcePool {
        name: name.clone(),
        stemcell_name: stemcell.name.clone(),
        stemcell_version: stemcell.version.clone(),
        cloud_properties: cloud_properties.clone(),
        network: network.clone(),
        size: *size,
        env: env.clone(),
      },
    );
  }
  pools
}

fn build_jobs(
  manifest: &Manifest,
  networks: &HashMap<String, Network>,
  resource_pools: &HashMap<String, ResourcePool>,
  errors: &mut Vec<String>,
) -> Vec<JobPlan> {
  let mut reserved_ips: HashMap<&str, HashSet<Ipv4Addr>> = HashMap::new();
  let mut pool_demand: HashMap<String, usize> = HashMap::new();
  let mut jobs = Vec::with_capacity(manifest.jobs.len());

  for job in &manifest.jobs {
    let JobSpec {
      name,
      template,
      resource_pool,
      networks: job_networks,
      persistent_disk,
      update,
      instances,
    } = job;

    if !resource_pools.contains_key(resource_pool) {
      errors.push(format!(
        "job {name}: references unknown resource pool {resource_pool}"
      ));
    } else {
      *pool_demand.entry(resource_pool.clone()).or_default() += instances;
    }

    let mut instance_specs = Vec::with_capacity(*instances);
    for index in 0..*instances as i64 {
      let Some((network_name, ip)) =
        resolve_instance_network(job_networks, index, networks, name, errors)
      else {
        continue;
      };
      if let Some(ip) = ip {
        let seen = reserved_ips.entry(network_name).or_default();
        if !seen.insert(ip) {
          errors.push(format!(
            "job {name}: static ip {ip} on network {network_name} reused"
          ));
        }
      }
      instance_specs.push(InstanceSpec {
        job: name.clone(),
        index,
        network: network_name.to_string(),
        ip,
        target_state: serde_json::json!({
          "template": template,
          "resource_pool": resource_pool,
          "persistent_disk_mb": persistent_disk,
          "network": network_name,
          "ip": ip.map(|ip| ip.to_string()),
        }),
      });
    }

    jobs.push(JobPlan {
      name: name.clone(),
      template: template.clone(),
      resource_pool: resource_pool.clone(),
      update: update.unwrap_or_default(),
      persistent_disk_mb: *persistent_disk,
      instances: instance_specs,
    });
  }

  for (pool, demand) in pool_demand {
    if let Some(pool_spec) = resource_pools.get(&pool) {
      if pool_spec.size < demand {
        errors.push(format!(
          "resource pool {pool}: size {} smaller than {demand} requested instances",
          pool_spec.size
        ));
      }
    }
  }

  jobs
}

fn resolve_instance_network<'a>(
  job_networks: &'a [JobNetwork],
  index: i64,
  networks: &HashMap<String, Network>,
  job_name: &str,
  errors: &mut Vec<String>,
) -> Option<(&'a str, Option<Ipv4Addr>)> {
  let binding = job_networks
    .iter()
    .find(|n| n.default)
    .or_else(|| job_networks.first())?;

  let Some(network) = networks.get(&binding.name) else {
    errors.push(format!(
      "job {job_name}: references unknown network {}",
      binding.name
    ));
    return None;
  };

  let ip = match network.kind {
    NetworkType::Manual => {
      let Some(raw) = binding.static_ips.get(index as usize) else {
        errors.push(format!(
          "job {job_name}: no static ip for instance {index} on manual network {}",
          binding.name
        ));
        return None;
      };
      match Ipv4Addr::from_str(raw) {
        Ok(ip) => {
          if !network.subnets.iter().any(|s| s.contains_static(ip)) {
            errors.push(format!(
              "job {job_name}: static ip {ip} not within any static range of network {}",
              binding.name
            ));
          }
          Some(ip)
        }
        Err(e) => {
          errors.push(format!(
            "job {job_name}: invalid static ip {raw:?}: {e}"
          ));
          None
        }
      }
    }
    NetworkType::Dynamic | NetworkType::Vip => None,
  };

  Some((&binding.name, ip))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn manifest(yaml: &str) -> Manifest {
    Manifest::parse(yaml).unwrap()
  }

  #[test]
  fn accepts_a_minimal_valid_manifest() {
    let m = manifest(
      r#"
name: my-deployment
release: { name: my-release, version: "1.0.0" }
update: { canaries: 1, max_in_flight: 2, canary_watch_time: 1000, update_watch_time: 1000 }
resource_pools:
  - name: default
    stemcell: { name: ubuntu, version: "1" }
    network: default
    size: 3
networks:
  - name: default
    type: manual
    subnets:
      - range: 10.0.0.0/24
        static_ranges: ["10.0.0.10-10.0.0.12"]
jobs:
  - name: web
    template: web
    resource_pool: default
    instances: 3
    networks:
      - name: default
        static_ips: ["10.0.0.10", "10.0.0.11", "10.0.0.12"]
"#,
    );
    let plan = Plan::from_manifest(&m).unwrap();
    assert_eq!(plan.jobs[0].instances.len(), 3);
    assert_eq!(
      plan.jobs[0].instances[2].ip,
      Some(Ipv4Addr::new(10, 0, 0, 12))
    );
  }

  #[test]
  fn rejects_duplicate_static_ips() {
    let m = manifest(
      r#"
name: d
release: { name: r, version: "1" }
update: { canaries: 1, max_in_flight: 1, canary_watch_time: 1, update_watch_time: 1 }
resource_pools:
  - name: default
    stemcell: { name: ubuntu, version: "1" }
    network: default
    size: 2
networks:
  - name: default
    type: manual
    subnets:
      - range: 10.0.0.0/24
        static_ranges: ["10.0.0.10-10.0.0.12"]
jobs:
  - name: web
    template: web
    resource_pool: default
    instances: 2
    networks:
      - name: default
        static_ips: ["10.0.0.10", "10.0.0.10"]
"#,
    );
    let err = Plan::from_manifest(&m).unwrap_err();
    assert!(matches!(err, DirectorError::ValidationFailed(_)));
  }

  #[test]
  fn rejects_undersized_resource_pool() {
    let m = manifest(
      r#"
name: d
release: { name: r, version: "1" }
update: { canaries: 1, max_in_flight: 1, canary_watch_time: 1, update_watch_time: 1 }
resource_pools:
  - name: default
    stemcell: { name: ubuntu, version: "1" }
    network: default
    size: 1
networks:
  - name: default
    type: manual
    subnets:
      - range: 10.0.0.0/24
        static_ranges: ["10.0.0.10-10.0.0.12"]
jobs:
  - name: web
    template: web
    resource_pool: default
    instances: 2
    networks:
      - name: default
        static_ips: ["10.0.0.10", "10.0.0.11"]
"#,
    );
    let err = Plan::from_manifest(&m).unwrap_err();
    match err {
      DirectorError::ValidationFailed(msgs) => {
        assert!(msgs.iter().any(|m| m.contains("smaller than")));
      }
      other => panic!("expected ValidationFailed, got {other:?}"),
    }
  }
}
