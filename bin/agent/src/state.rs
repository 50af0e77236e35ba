//! Per-agent simulated VM state (spec §1: "the agent... is simulated in
//! this implementation rather than driving a real stemcell"). One process
//! answers for every agent id the director addresses, since the cloud
//! provider it pairs with (`DummyCloudProvider`) never spawns a real VM
//! for that id to run on.

use std::{collections::HashSet, time::Duration};

use agent_client::api::{self, AgentTaskStatus, JobStatus};
use command::run_director_command;
use dashmap::DashMap;
use serde_json::Value;

use crate::config::AgentConfig;

struct AgentState {
  applied: Value,
  job_status: JobStatus,
  disks: HashSet<String>,
}

impl Default for AgentState {
  fn default() -> Self {
    Self { applied: Value::Null, job_status: JobStatus::Starting, disks: HashSet::new() }
  }
}

pub type Agents = DashMap<String, AgentState>;

/// Runs one RPC method against `agent_id`'s simulated state. Returns the
/// `value` to put on the wire, or a message to put on the wire as an
/// `exception` (spec §4.A's reply envelope).
pub async fn dispatch(
  agents: &Agents,
  config: &AgentConfig,
  agent_id: &str,
  method: &str,
  arguments: Value,
) -> Result<Value, String> {
  match method {
    "ping" => Ok(Value::Null),

    "apply" => {
      let req: api::Apply = from_args(arguments)?;
      agents.entry(agent_id.to_string()).or_default().applied = req.state;
      Ok(Value::Null)
    }

    "start" => {
      run_director_command("start", None, format!("# start job on {agent_id}")).await;
      tokio::time::sleep(Duration::from_millis(config.job_start_delay_ms)).await;
      agents.entry(agent_id.to_string()).or_default().job_status = JobStatus::Running;
      Ok(Value::Null)
    }

    "stop" => {
      run_director_command("stop", None, format!("# stop job on {agent_id}")).await;
      agents.entry(agent_id.to_string()).or_default().job_status = JobStatus::Starting;
      Ok(Value::Null)
    }

    "get_state" => Ok(agents.entry(agent_id.to_string()).or_default().applied.clone()),

    "get_job_status" => {
      let status = agents.entry(agent_id.to_string()).or_default().job_status;
      to_value(status)
    }

    "get_task" => {
      let _req: api::GetTask = from_args(arguments)?;
      // No method below hands out a task id that stays pending; any
      // poll against this harness observes it as already finished.
      to_value(AgentTaskStatus::Done { value: Value::Null })
    }

    "compile_package" => {
      let req: api::CompilePackage = from_args(arguments)?;
      let log = run_director_command(
        "compile_package",
        None,
        format!("# compile {} {}", req.name, req.version),
      )
      .await;
      if !log.success {
        return Err(log.stderr);
      }
      to_value(api::CompileResult {
        blob_id: format!("compiled-{}-{}", req.name, req.version),
        sha1: req.sha1,
      })
    }

    "migrate_disk" => {
      let req: api::MigrateDisk = from_args(arguments)?;
      let mut state = agents.entry(agent_id.to_string()).or_default();
      state.disks.remove(&req.old_cid);
      state.disks.insert(req.new_cid);
      Ok(Value::Null)
    }

    "mount_disk" => {
      let req: api::MountDisk = from_args(arguments)?;
      agents.entry(agent_id.to_string()).or_default().disks.insert(req.cid);
      Ok(Value::Null)
    }

    "unmount_disk" => {
      let req: api::UnmountDisk = from_args(arguments)?;
      agents.entry(agent_id.to_string()).or_default().disks.remove(&req.cid);
      Ok(Value::Null)
    }

    "list_disk" => {
      let disks: Vec<String> =
        agents.entry(agent_id.to_string()).or_default().disks.iter().cloned().collect();
      to_value(disks)
    }

    other => Err(format!("unknown method {other}")),
  }
}

fn from_args<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T, String> {
  serde_json::from_value(arguments).map_err(|e| format!("bad arguments: {e}"))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, String> {
  serde_json::to_value(value).map_err(|e| format!("failed to encode response: {e}"))
}
