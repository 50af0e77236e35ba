#[macro_use]
extern crate tracing;

use std::{net::SocketAddr, str::FromStr, sync::Arc, time::Duration};

use anyhow::Context as _;
use database::Client as Db;
use lock::LockManager;

use crate::{
  action_state::ActionStates,
  cloud::{CloudProvider, DummyCloudProvider, HttpCloudProvider, ProviderKind},
  config::director_config,
  context::Context,
  task::TaskManager,
};

mod action_state;
mod api;
mod cloud;
mod compiler;
mod config;
mod context;
mod instance_updater;
mod job_updater;
mod jobs;
mod package_compiler;
mod plan;
mod resource_pool;
mod startup;
mod task;

async fn app() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();
  let config = director_config();
  logger::init(&config.logging)?;

  info!("Director version: v{}", env!("CARGO_PKG_VERSION"));
  info!("{:?}", config);

  let db = Arc::new(
    Db::new(&config.database)
      .await
      .context("failed to initialize database connection")?,
  );

  let bus = async_nats::connect(&config.nats_url)
    .await
    .context("failed to connect to agent bus")?;
  let agent = agent_client::Client::new(bus)
    .with_default_timeout(Duration::from_millis(config.agent_rpc_timeout_ms));

  let cloud: Arc<dyn CloudProvider> = build_cloud_provider(config)?;

  let locks = LockManager::new(db.clone());
  let tasks = TaskManager::spawn(db.clone(), config.task_workers);

  let ctx = Context {
    db,
    agent,
    cloud,
    locks,
    config: Arc::new(config.clone()),
    action_states: ActionStates::default(),
    tasks,
  };

  startup::on_startup(&ctx).await;
  resource_pool::spawn_sweep_loop(ctx.clone());

  let app = api::router(ctx);

  let addr = format!("{}:{}", config.bind_ip, config.port);
  let socket_addr =
    SocketAddr::from_str(&addr).context("failed to parse listen address")?;
  let listener = tokio::net::TcpListener::bind(socket_addr)
    .await
    .context("failed to bind listener")?;

  info!("Director starting on http://{socket_addr}");
  axum::serve(listener, app)
    .await
    .context("failed to start http server")
}

fn build_cloud_provider(
  config: &config::DirectorConfig,
) -> anyhow::Result<Arc<dyn CloudProvider>> {
  match config.cloud_provider.as_str() {
    "dummy" | "" => Ok(Arc::new(DummyCloudProvider::new())),
    "vsphere" => Ok(Arc::new(HttpCloudProvider::new(
      ProviderKind::Vsphere,
      config.cloud_provider_base_url.clone(),
      config.cloud_provider_token.clone(),
    ))),
    "esx" => Ok(Arc::new(HttpCloudProvider::new(
      ProviderKind::Esx,
      config.cloud_provider_base_url.clone(),
      config.cloud_provider_token.clone(),
    ))),
    other => anyhow::bail!("unknown cloud_provider {other:?}, expected dummy/vsphere/esx"),
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let mut term_signal =
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
  tokio::select! {
    res = tokio::spawn(app()) => res?,
    _ = term_signal.recv() => Ok(()),
  }
}
