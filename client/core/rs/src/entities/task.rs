use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use super::{I64, MongoId};

/// A durable record of an asynchronous mutating operation (spec §3, §4.D).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
  #[serde(
    default,
    rename = "_id",
    skip_serializing_if = "String::is_empty"
  )]
  pub id: MongoId,

  /// Monotonic, human facing task number (distinct from the Mongo id,
  /// matching spec §3's "id (monotonic integer)").
  pub number: I64,

  pub kind: TaskKind,

  pub state: TaskState,

  /// Unix ms when the task row was created.
  pub timestamp: I64,

  pub description: String,

  /// Short result string. Set on completion: the `body`'s return value on
  /// success, or `{code, description}` rendered to text on domain error,
  /// or the non-domain error's class/message on internal failure.
  #[serde(default)]
  pub result: String,

  /// Directory holding this task's `debug`, `event`, `result` files.
  pub output: String,

  /// Name of the deployment/release/stemcell this task targets, used to
  /// derive the lock name the task body must hold.
  pub target: String,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
  UpdateDeployment,
  DeleteDeployment,
  UpdateRelease,
  DeleteRelease,
  UpdateStemcell,
  DeleteStemcell,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskState {
  #[default]
  Queued,
  Processing,
  Cancelling,
  Done,
  Error,
  Cancelled,
}

impl TaskState {
  /// Terminal states never transition further (spec §8 Task monotonicity).
  pub fn is_terminal(self) -> bool {
    matches!(self, TaskState::Done | TaskState::Error | TaskState::Cancelled)
  }
}
