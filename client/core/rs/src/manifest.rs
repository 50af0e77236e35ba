//! The deployment manifest (spec §4.F, §6) — parsed and field-validated,
//! but file-level parsing beyond the fields consumed is out of scope
//! (spec §1).

use serde::{Deserialize, Serialize};

use crate::deserializers::item_or_vec_deserializer;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
  pub name: String,
  pub release: ManifestRelease,
  #[serde(default)]
  pub compilation: CompilationSpec,
  pub update: UpdatePolicy,
  #[serde(default)]
  pub resource_pools: Vec<ResourcePoolSpec>,
  #[serde(default)]
  pub networks: Vec<NetworkSpec>,
  #[serde(default)]
  pub jobs: Vec<JobSpec>,
}

impl Manifest {
  pub fn parse(yaml: &str) -> Result<Self, serde_yaml_ng::Error> {
    serde_yaml_ng::from_str(yaml)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestRelease {
  pub name: String,
  pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilationSpec {
  #[serde(default = "default_compilation_workers")]
  pub workers: usize,
  #[serde(default)]
  pub cloud_properties: serde_json::Value,
  pub network: Option<String>,
}

fn default_compilation_workers() -> usize {
  1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePoolSpec {
  pub name: String,
  pub stemcell: StemcellRef,
  #[serde(default)]
  pub cloud_properties: serde_json::Value,
  pub network: String,
  pub size: usize,
  #[serde(default)]
  pub env: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StemcellRef {
  pub name: String,
  pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSpec {
  pub name: String,
  #[serde(rename = "type")]
  pub kind: NetworkType,
  #[serde(default)]
  pub subnets: Vec<SubnetSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
  Manual,
  Dynamic,
  Vip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetSpec {
  pub range: String,
  #[serde(default)]
  pub static_ranges: Vec<String>,
  #[serde(default)]
  pub reserved_ranges: Vec<String>,
  #[serde(default)]
  pub dns: Vec<String>,
  #[serde(default)]
  pub cloud_properties: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
  pub name: String,
  pub template: String,
  pub resource_pool: String,
  #[serde(default, deserialize_with = "item_or_vec_deserializer")]
  pub networks: Vec<JobNetwork>,
  #[serde(default)]
  pub persistent_disk: Option<i64>,
  #[serde(default)]
  pub update: Option<UpdatePolicy>,
  pub instances: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobNetwork {
  pub name: String,
  #[serde(default)]
  pub static_ips: Vec<String>,
  #[serde(default)]
  pub default: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpdatePolicy {
  pub canaries: usize,
  pub max_in_flight: usize,
  pub canary_watch_time: u64,
  pub update_watch_time: u64,
}

impl Default for UpdatePolicy {
  fn default() -> Self {
    Self { canaries: 1, max_in_flight: 1, canary_watch_time: 1000, update_watch_time: 1000 }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_minimal_manifest() {
    let yaml = r#"
name: my-deployment
release:
  name: my-release
  version: "1.0.0"
update:
  canaries: 1
  max_in_flight: 2
  canary_watch_time: 3000
  update_watch_time: 3000
resource_pools:
  - name: default
    stemcell:
      name: ubuntu
      version: "1"
    network: default
    size: 3
networks:
  - name: default
    type: manual
    subnets:
      - range: 10.0.0.0/24
        static_ranges:
          - 10.0.0.10-10.0.0.12
jobs:
  - name: web
    template: web
    resource_pool: default
    instances: 3
    networks:
      - name: default
        static_ips:
          - 10.0.0.10
          - 10.0.0.11
          - 10.0.0.12
"#;
    let manifest = Manifest::parse(yaml).unwrap();
    assert_eq!(manifest.name, "my-deployment");
    assert_eq!(manifest.jobs.len(), 1);
    assert_eq!(manifest.jobs[0].instances, 3);
    assert_eq!(manifest.networks[0].subnets[0].static_ranges.len(), 1);
  }

  #[test]
  fn job_network_accepts_single_item_or_seq() {
    let yaml = r#"
name: d
release: { name: r, version: "1" }
update: { canaries: 1, max_in_flight: 1, canary_watch_time: 1, update_watch_time: 1 }
jobs:
  - name: web
    template: web
    resource_pool: default
    instances: 1
    networks:
      name: default
      static_ips: ["10.0.0.1"]
"#;
    let manifest = Manifest::parse(yaml).unwrap();
    assert_eq!(manifest.jobs[0].networks.len(), 1);
    assert_eq!(manifest.jobs[0].networks[0].name, "default");
  }
}
