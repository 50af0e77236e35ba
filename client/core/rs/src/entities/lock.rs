use serde::{Deserialize, Serialize};

use super::I64;

/// A named, expiring lock row (spec §3, §4.B). At most one row per name
/// with `expiry` in the future.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
  #[serde(rename = "_id")]
  pub name: String,
  pub holder: String,
  pub expiry: I64,
}

pub fn deployment_lock_name(deployment: &str) -> String {
  format!("lock:deployment:{deployment}")
}

pub const RELEASE_LOCK_NAME: &str = "lock:release";
pub const STEMCELLS_LOCK_NAME: &str = "lock:stemcells";

pub fn compile_lock_name(package: &str, stemcell: &str) -> String {
  format!("lock:compile:{package}:{stemcell}")
}
