use std::path::Path;

use director_client::entities::{director_timestamp, log::Log};
use run_command::{CommandOutput, async_run_command};

/// Runs a shell stage and records it as a [Log]. Used by the dummy cloud
/// provider to simulate `create_vm`/`create_disk`/`delete_vm` as real shell
/// invocations, and by the agent to simulate a job's start/stop scripts.
pub async fn run_director_command(
  stage: &str,
  path: impl Into<Option<&Path>>,
  command: impl AsRef<str>,
) -> Log {
  let command = if let Some(path) = path.into() {
    format!("cd {} && {}", path.display(), command.as_ref())
  } else {
    command.as_ref().to_string()
  };
  let start_ts = director_timestamp();
  let output = async_run_command(&command).await;
  output_into_log(stage, command, start_ts, output)
}

/// Runs a command and redacts credentials from the recorded output before
/// they ever reach the task log (spec §1 Logging).
pub async fn run_director_command_with_sanitization(
  stage: &str,
  path: impl Into<Option<&Path>>,
  command: impl AsRef<str>,
  replacers: &[(String, String)],
) -> Log {
  let mut log = run_director_command(stage, path, command).await;
  log.command = svi::replace_in_string(&log.command, replacers);
  log.stdout = svi::replace_in_string(&log.stdout, replacers);
  log.stderr = svi::replace_in_string(&log.stderr, replacers);
  log
}

pub fn output_into_log(
  stage: &str,
  command: String,
  start_ts: i64,
  output: CommandOutput,
) -> Log {
  let success = output.success();
  Log {
    stage: stage.to_string(),
    stdout: output.stdout,
    stderr: output.stderr,
    command,
    success,
    start_ts,
    end_ts: director_timestamp(),
  }
}
