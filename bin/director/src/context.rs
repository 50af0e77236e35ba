use std::sync::Arc;

use database::Client as Db;
use lock::LockManager;

use crate::{
  action_state::ActionStates, cloud::CloudProvider, config::DirectorConfig, task::TaskManager,
};

/// Explicit collaborator bundle threaded through every task body and HTTP
/// handler, constructed once in `main` — not threaded through process-wide
/// singletons for config/db/bus.
#[derive(Clone)]
pub struct Context {
  pub db: Arc<Db>,
  pub agent: agent_client::Client,
  pub cloud: Arc<dyn CloudProvider>,
  pub locks: LockManager,
  pub config: Arc<DirectorConfig>,
  pub action_states: ActionStates,
  pub tasks: TaskManager,
}
