use serde::{Deserialize, Serialize};

use super::I64;

/// A single recorded stage of work inside a task body — a cloud call, an
/// agent RPC, or a compile step. Written to the task's `event` log stream;
/// non-domain failures additionally get their backtrace appended to `debug`.
///
/// Generalizes `lib/command`'s shell-command log record from "a shell
/// stage" to "any stage with a textual outcome".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
  pub stage: String,
  pub command: String,
  #[serde(default)]
  pub stdout: String,
  #[serde(default)]
  pub stderr: String,
  pub success: bool,
  pub start_ts: I64,
  pub end_ts: I64,
}

impl Log {
  pub fn ok(stage: impl Into<String>, command: impl Into<String>, start_ts: I64, stdout: impl Into<String>) -> Self {
    Self {
      stage: stage.into(),
      command: command.into(),
      stdout: stdout.into(),
      stderr: String::new(),
      success: true,
      start_ts,
      end_ts: super::director_timestamp(),
    }
  }

  pub fn err(stage: impl Into<String>, command: impl Into<String>, start_ts: I64, stderr: impl Into<String>) -> Self {
    Self {
      stage: stage.into(),
      command: command.into(),
      stdout: String::new(),
      stderr: stderr.into(),
      success: false,
      start_ts,
      end_ts: super::director_timestamp(),
    }
  }
}
