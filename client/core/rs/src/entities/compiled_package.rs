use serde::{Deserialize, Serialize};

use super::MongoId;

/// Content-addressed compile output, keyed by source package identity,
/// target stemcell identity, and a hash over the identities of its
/// transitive compile-time dependencies (spec §3, §4.H).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledPackage {
  #[serde(
    default,
    rename = "_id",
    skip_serializing_if = "String::is_empty"
  )]
  pub id: MongoId,
  pub package_name: String,
  pub package_version: String,
  pub stemcell_name: String,
  pub stemcell_version: String,
  /// `sha1(sorted((name,version,fingerprint) of each transitive compile dep))`.
  pub dependency_key: String,
  pub blob_id: String,
  pub sha1: String,
}

/// The natural key a [CompiledPackage] is looked up and deduplicated by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompileKey {
  pub package_name: String,
  pub package_version: String,
  pub stemcell_name: String,
  pub stemcell_version: String,
  pub dependency_key: String,
}
