use serde::{Deserialize, Serialize};

use super::{I64, MongoId};

/// A named collection of jobs, networks, and resource pools declaring
/// desired state (spec §3, §4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
  #[serde(
    default,
    rename = "_id",
    skip_serializing_if = "String::is_empty"
  )]
  pub id: MongoId,
  pub name: String,
  /// The raw manifest text last submitted for this deployment.
  pub manifest: String,
  pub release: String,
  pub release_version: String,
  pub stemcells: Vec<String>,
  pub updated_at: I64,
}

/// One numbered replica of a job in a deployment. Owns one VM and
/// optionally one persistent disk (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
  #[serde(
    default,
    rename = "_id",
    skip_serializing_if = "String::is_empty"
  )]
  pub id: MongoId,
  pub deployment: String,
  pub job: String,
  pub index: i64,
  /// The configuration blob last successfully applied on this instance.
  /// `None` for a freshly planned instance that has never been converged.
  pub current_state: Option<serde_json::Value>,
  pub vm: Option<String>,
  pub disk: Option<String>,
  pub ip: Option<String>,
  pub network: Option<String>,
}

impl Instance {
  pub fn key(&self) -> (String, i64) {
    (self.job.clone(), self.index)
  }
}

/// A VM created through the cloud provider. Belongs to a resource pool's
/// idle set until bound to an [Instance].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vm {
  #[serde(
    default,
    rename = "_id",
    skip_serializing_if = "String::is_empty"
  )]
  pub id: MongoId,
  pub cid: String,
  pub agent_id: String,
  pub deployment: String,
  pub resource_pool: String,
  pub stemcell_name: String,
  pub stemcell_version: String,
  pub instance: Option<String>,
  pub created_at: I64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Disk {
  #[serde(
    default,
    rename = "_id",
    skip_serializing_if = "String::is_empty"
  )]
  pub id: MongoId,
  pub cid: String,
  pub size_mb: i64,
  pub instance: String,
}
