use std::{path::PathBuf, sync::OnceLock};

use anyhow::Context as _;
use colored::Colorize;
use config::ConfigLoader;
use director_client::entities::logger::LogConfig;
use serde::Deserialize;

/// Environment overrides, parsed the same way `bin/director/src/config.rs`
/// layers `Env` on top of a file-backed base config.
#[derive(Debug, Deserialize)]
struct Env {
  #[serde(default = "default_config_paths")]
  agent_config_paths: Vec<PathBuf>,
  #[serde(default)]
  agent_config_keywords: Vec<String>,
  #[serde(default = "default_true")]
  agent_merge_nested_config: bool,
  #[serde(default = "default_true")]
  agent_extend_config_arrays: bool,
  #[serde(default)]
  agent_config_debug: bool,

  agent_nats_url: Option<String>,
  agent_job_start_delay_ms: Option<u64>,
  agent_log_level: Option<director_client::entities::logger::LogLevel>,
  agent_log_pretty: Option<bool>,
}

fn default_config_paths() -> Vec<PathBuf> {
  vec![PathBuf::from("/config/agent.toml")]
}

fn default_true() -> bool {
  true
}

/// One `bin/agent` process answers for every agent id the director
/// addresses it with (spec §1: no per-VM process, no stemcell image —
/// the cloud provider and the agent bus are both simulated here). Holds
/// only the bus address; per-agent state lives in [`crate::state`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
  pub nats_url: String,
  /// Artificial delay before a `start`ed job reports `running`, so
  /// `get_job_status` polling in the director's instance updater has
  /// something to actually observe converging.
  pub job_start_delay_ms: u64,
  pub logging: LogConfig,
}

impl Default for AgentConfig {
  fn default() -> Self {
    Self {
      nats_url: "nats://localhost:4222".to_string(),
      job_start_delay_ms: 500,
      logging: LogConfig::default(),
    }
  }
}

pub fn agent_config() -> &'static AgentConfig {
  static CONFIG: OnceLock<AgentConfig> = OnceLock::new();
  CONFIG.get_or_init(|| load().expect("failed to load agent config"))
}

fn load() -> anyhow::Result<AgentConfig> {
  let env: Env =
    envy::from_env().context("failed to parse agent environment")?;

  let paths = env
    .agent_config_paths
    .iter()
    .map(PathBuf::as_path)
    .collect::<Vec<_>>();
  let existing_paths =
    paths.iter().filter(|p| p.exists()).copied().collect::<Vec<_>>();

  let config = if existing_paths.is_empty() {
    println!("{}: no config paths found, using default config", "INFO".green());
    AgentConfig::default()
  } else {
    let keywords =
      env.agent_config_keywords.iter().map(String::as_str).collect::<Vec<_>>();
    (ConfigLoader {
      paths: &existing_paths,
      match_wildcards: &keywords,
      include_file_name: ".agentinclude",
      merge_nested: env.agent_merge_nested_config,
      extend_array: env.agent_extend_config_arrays,
      debug_print: env.agent_config_debug,
    })
    .load::<AgentConfig>()
    .context("failed to parse config from paths")?
  };

  Ok(AgentConfig {
    nats_url: env.agent_nats_url.unwrap_or(config.nats_url),
    job_start_delay_ms: env
      .agent_job_start_delay_ms
      .unwrap_or(config.job_start_delay_ms),
    logging: LogConfig {
      level: env.agent_log_level.unwrap_or(config.logging.level),
      pretty: env.agent_log_pretty.unwrap_or(config.logging.pretty),
      ..config.logging
    },
  })
}
