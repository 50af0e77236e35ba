use serde::{Deserialize, Serialize};

use super::MongoId;

/// A base OS image uploaded to the cloud provider. `(name, version)` is
/// unique (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stemcell {
  #[serde(
    default,
    rename = "_id",
    skip_serializing_if = "String::is_empty"
  )]
  pub id: MongoId,
  pub name: String,
  pub version: String,
  /// Cloud id assigned by the provider on `create_stemcell`.
  pub cid: String,
  pub sha1: String,
}
