use serde::{Deserialize, Serialize};

use super::MongoId;

/// Minimal operator account for HTTP basic auth. User CRUD and richer auth
/// flows are out of scope (spec §1) — this exists only so the `401`
/// behavior in spec §6 is backed by real rows rather than stubbed out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  #[serde(
    default,
    rename = "_id",
    skip_serializing_if = "String::is_empty"
  )]
  pub id: MongoId,
  pub username: String,
  pub password_hash: String,
}
