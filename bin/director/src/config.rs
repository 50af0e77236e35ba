use std::{path::PathBuf, sync::OnceLock};

use anyhow::Context as _;
use colored::Colorize;
use config::ConfigLoader;
use database::DatabaseConfig;
use director_client::entities::logger::LogConfig;
use serde::Deserialize;

/// Environment overrides, parsed via `envy::from_env()` — only the
/// config-path/keyword knobs and per-field overrides, nothing that holds
/// a live handle.
#[derive(Debug, Deserialize)]
struct Env {
  #[serde(default = "default_config_paths")]
  director_config_paths: Vec<PathBuf>,
  #[serde(default)]
  director_config_keywords: Vec<String>,
  #[serde(default = "default_true")]
  director_merge_nested_config: bool,
  #[serde(default = "default_true")]
  director_extend_config_arrays: bool,
  #[serde(default)]
  director_config_debug: bool,

  director_bind_ip: Option<String>,
  director_port: Option<u16>,

  director_database_uri: Option<String>,
  director_database_address: Option<String>,
  director_database_username: Option<String>,
  director_database_password: Option<String>,
  director_database_app_name: Option<String>,
  director_database_db_name: Option<String>,

  director_nats_url: Option<String>,
  director_agent_subject_prefix: Option<String>,

  director_lock_ttl_ms: Option<u64>,
  director_lock_acquire_timeout_ms: Option<u64>,

  director_agent_rpc_timeout_ms: Option<u64>,
  director_compile_workers: Option<usize>,
  director_job_update_workers: Option<usize>,
  director_task_workers: Option<usize>,
  director_resource_pool_sweep_interval_secs: Option<u64>,

  director_task_log_directory: Option<String>,

  director_cloud_provider: Option<String>,
  director_cloud_provider_base_url: Option<String>,
  director_cloud_provider_token: Option<String>,

  director_init_admin_username: Option<String>,
  director_init_admin_password: Option<String>,

  director_log_level: Option<director_client::entities::logger::LogLevel>,
  director_log_pretty: Option<bool>,
  director_otlp_endpoint: Option<String>,
}

fn default_config_paths() -> Vec<PathBuf> {
  vec![PathBuf::from("/config/director.toml")]
}

fn default_true() -> bool {
  true
}

/// The merged, final, static configuration. Holds only values — no database
/// handle, no bus client, no cloud provider. Those live on `Context`
/// (spec §9's first redesign flag), built once from this in `main`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirectorConfig {
  pub bind_ip: String,
  pub port: u16,
  pub database: DatabaseConfig,
  pub nats_url: String,
  pub agent_subject_prefix: String,
  pub lock_ttl_ms: u64,
  pub lock_acquire_timeout_ms: u64,
  pub agent_rpc_timeout_ms: u64,
  pub compile_workers: usize,
  pub job_update_workers: usize,
  /// Number of tasks (spec §4.D) that may run concurrently off the shared
  /// queue; a second task for the same deployment/release/stemcell still
  /// waits, but on that lock, not on this count.
  pub task_workers: usize,
  pub resource_pool_sweep_interval_secs: u64,
  pub task_log_directory: String,
  /// `"dummy"` (the default, for local/demo runs with `bin/agent`'s
  /// simulated VMs), or `"vsphere"`/`"esx"` to drive [`HttpCloudProvider`]
  /// against a real CPI endpoint.
  ///
  /// [`HttpCloudProvider`]: crate::cloud::HttpCloudProvider
  pub cloud_provider: String,
  pub cloud_provider_base_url: String,
  pub cloud_provider_token: String,
  pub init_admin_username: Option<String>,
  pub init_admin_password: Option<String>,
  pub logging: LogConfig,
}

impl Default for DirectorConfig {
  fn default() -> Self {
    Self {
      bind_ip: "0.0.0.0".to_string(),
      port: 8080,
      database: DatabaseConfig::default(),
      nats_url: "nats://localhost:4222".to_string(),
      agent_subject_prefix: "director.agent".to_string(),
      lock_ttl_ms: lock::DEFAULT_TTL.as_millis() as u64,
      lock_acquire_timeout_ms: 60_000,
      agent_rpc_timeout_ms: 30_000,
      compile_workers: 4,
      job_update_workers: 4,
      task_workers: 8,
      resource_pool_sweep_interval_secs: 30,
      task_log_directory: "/var/lib/director/tasks".to_string(),
      cloud_provider: "dummy".to_string(),
      cloud_provider_base_url: String::new(),
      cloud_provider_token: String::new(),
      init_admin_username: None,
      init_admin_password: None,
      logging: LogConfig::default(),
    }
  }
}

/// Loads config once per process: base `DirectorConfig` from TOML/YAML/JSON
/// files under the configured search paths, then every field the `Env`
/// override set wins. No file-backed secret indirection (`*_FILE` env
/// vars) — nothing here is sensitive enough to warrant it.
pub fn director_config() -> &'static DirectorConfig {
  static CONFIG: OnceLock<DirectorConfig> = OnceLock::new();
  CONFIG.get_or_init(|| load().expect("failed to load director config"))
}

fn load() -> anyhow::Result<DirectorConfig> {
  let env: Env = envy::from_env()
    .context("failed to parse director environment")?;

  let paths = env
    .director_config_paths
    .iter()
    .map(PathBuf::as_path)
    .collect::<Vec<_>>();
  let existing_paths = paths
    .iter()
    .filter(|p| p.exists())
    .copied()
    .collect::<Vec<_>>();

  let config = if existing_paths.is_empty() {
    println!(
      "{}: no config paths found, using default config",
      "INFO".green()
    );
    DirectorConfig::default()
  } else {
    let keywords = env
      .director_config_keywords
      .iter()
      .map(String::as_str)
      .collect::<Vec<_>>();
    (ConfigLoader {
      paths: &existing_paths,
      match_wildcards: &keywords,
      include_file_name: ".directorinclude",
      merge_nested: env.director_merge_nested_config,
      extend_array: env.director_extend_config_arrays,
      debug_print: env.director_config_debug,
    })
    .load::<DirectorConfig>()
    .context("failed to parse config from paths")?
  };

  Ok(DirectorConfig {
    bind_ip: env.director_bind_ip.unwrap_or(config.bind_ip),
    port: env.director_port.unwrap_or(config.port),
    database: DatabaseConfig {
      uri: env.director_database_uri.unwrap_or(config.database.uri),
      address: env
        .director_database_address
        .unwrap_or(config.database.address),
      username: env
        .director_database_username
        .unwrap_or(config.database.username),
      password: env
        .director_database_password
        .unwrap_or(config.database.password),
      app_name: env
        .director_database_app_name
        .unwrap_or(config.database.app_name),
      db_name: env
        .director_database_db_name
        .unwrap_or(config.database.db_name),
    },
    nats_url: env.director_nats_url.unwrap_or(config.nats_url),
    agent_subject_prefix: env
      .director_agent_subject_prefix
      .unwrap_or(config.agent_subject_prefix),
    lock_ttl_ms: env.director_lock_ttl_ms.unwrap_or(config.lock_ttl_ms),
    lock_acquire_timeout_ms: env
      .director_lock_acquire_timeout_ms
      .unwrap_or(config.lock_acquire_timeout_ms),
    agent_rpc_timeout_ms: env
      .director_agent_rpc_timeout_ms
      .unwrap_or(config.agent_rpc_timeout_ms),
    compile_workers: env
      .director_compile_workers
      .unwrap_or(config.compile_workers),
    job_update_workers: env
      .director_job_update_workers
      .unwrap_or(config.job_update_workers),
    task_workers: env.director_task_workers.unwrap_or(config.task_workers),
    resource_pool_sweep_interval_secs: env
      .director_resource_pool_sweep_interval_secs
      .unwrap_or(config.resource_pool_sweep_interval_secs),
    task_log_directory: env
      .director_task_log_directory
      .unwrap_or(config.task_log_directory),
    cloud_provider: env
      .director_cloud_provider
      .unwrap_or(config.cloud_provider),
    cloud_provider_base_url: env
      .director_cloud_provider_base_url
      .unwrap_or(config.cloud_provider_base_url),
    cloud_provider_token: env
      .director_cloud_provider_token
      .unwrap_or(config.cloud_provider_token),
    init_admin_username: env
      .director_init_admin_username
      .or(config.init_admin_username),
    init_admin_password: env
      .director_init_admin_password
      .or(config.init_admin_password),
    logging: LogConfig {
      level: env.director_log_level.unwrap_or(config.logging.level),
      pretty: env.director_log_pretty.unwrap_or(config.logging.pretty),
      otlp_endpoint: env
        .director_otlp_endpoint
        .unwrap_or(config.logging.otlp_endpoint),
      ..config.logging
    },
  })
}
