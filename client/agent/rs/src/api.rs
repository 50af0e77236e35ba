//! One struct per agent RPC method: a request type, a response type, and
//! the method name that ties them to the wire.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Implemented by every agent RPC request. `METHOD` is the JSON `method`
/// field sent on the wire.
pub trait AgentRequest: Serialize {
  const METHOD: &'static str;
  type Response: DeserializeOwned;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ping;

impl AgentRequest for Ping {
  const METHOD: &'static str = "ping";
  type Response = ();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Apply {
  pub state: Value,
}

impl AgentRequest for Apply {
  const METHOD: &'static str = "apply";
  type Response = ();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Start;

impl AgentRequest for Start {
  const METHOD: &'static str = "start";
  type Response = ();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop;

impl AgentRequest for Stop {
  const METHOD: &'static str = "stop";
  type Response = ();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetState;

impl AgentRequest for GetState {
  const METHOD: &'static str = "get_state";
  type Response = Value;
}

/// Job monitoring status surfaced by the agent while a job converges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
  Starting,
  Running,
  Failing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetJobStatus;

impl AgentRequest for GetJobStatus {
  const METHOD: &'static str = "get_job_status";
  type Response = JobStatus;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTask {
  pub id: String,
}

/// A long-running agent operation's task status, polled by [`crate::Client::wait_task`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AgentTaskStatus {
  Running,
  Done { value: Value },
  Failed { message: String },
}

impl AgentRequest for GetTask {
  const METHOD: &'static str = "get_task";
  type Response = AgentTaskStatus;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilePackage {
  pub blob_id: String,
  pub sha1: String,
  pub name: String,
  pub version: String,
  /// `(name, version, blob_id, sha1)` of each already-compiled dependency
  /// this package needs present on the compilation VM.
  pub deps: Vec<(String, String, String, String)>,
}

/// The compiled artifact handed back by `compile_package` — either
/// immediately or via a task id the caller must poll with `get_task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileResult {
  pub blob_id: String,
  pub sha1: String,
}

impl AgentRequest for CompilePackage {
  const METHOD: &'static str = "compile_package";
  type Response = CompileResult;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateDisk {
  pub old_cid: String,
  pub new_cid: String,
}

impl AgentRequest for MigrateDisk {
  const METHOD: &'static str = "migrate_disk";
  type Response = ();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountDisk {
  pub cid: String,
}

impl AgentRequest for MountDisk {
  const METHOD: &'static str = "mount_disk";
  type Response = ();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmountDisk {
  pub cid: String,
}

impl AgentRequest for UnmountDisk {
  const METHOD: &'static str = "unmount_disk";
  type Response = ();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListDisk;

impl AgentRequest for ListDisk {
  const METHOD: &'static str = "list_disk";
  type Response = Vec<String>;
}

/// Methods safe to retry purely on `timeout` (spec §7) — they don't
/// mutate agent-local state.
pub fn is_idempotent(method: &str) -> bool {
  matches!(method, "ping" | "get_state" | "get_task" | "get_job_status")
}
