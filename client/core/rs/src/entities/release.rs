use serde::{Deserialize, Serialize};

use super::{I64, MongoId};

/// A named collection of release versions (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
  #[serde(
    default,
    rename = "_id",
    skip_serializing_if = "String::is_empty"
  )]
  pub id: MongoId,
  pub name: String,
}

/// One uploaded version of a [Release]. Holds the packages and templates
/// that version shipped with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseVersion {
  #[serde(
    default,
    rename = "_id",
    skip_serializing_if = "String::is_empty"
  )]
  pub id: MongoId,
  pub release: String,
  pub version: String,
  pub packages: Vec<String>,
  pub templates: Vec<String>,
  pub created_at: I64,
}

/// A source package. `(name, version, fingerprint)` is a content-addressed
/// identity: two packages with the same fingerprint are interchangeable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
  #[serde(
    default,
    rename = "_id",
    skip_serializing_if = "String::is_empty"
  )]
  pub id: MongoId,
  pub name: String,
  pub version: String,
  /// Content hash of the package's source tree.
  pub fingerprint: String,
  /// Names of packages this package depends on at compile time.
  #[serde(default)]
  pub dependencies: Vec<String>,
  /// Opaque reference into the blobstore for the source tarball.
  pub blob_id: String,
}

impl Package {
  pub fn identity(&self) -> (String, String, String) {
    (self.name.clone(), self.version.clone(), self.fingerprint.clone())
  }
}

/// A job template: the packages a job needs plus the config it renders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
  #[serde(
    default,
    rename = "_id",
    skip_serializing_if = "String::is_empty"
  )]
  pub id: MongoId,
  pub name: String,
  pub version: String,
  pub blob_id: String,
  pub packages: Vec<String>,
}
