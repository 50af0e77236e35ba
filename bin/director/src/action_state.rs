//! In-memory "is a task currently mutating this deployment" tracker,
//! generalized from `helpers/action_state.rs`'s `Cache<K, ActionState<S>>`
//! + RAII `UpdateGuard` pattern down to the single busy flag this system
//! needs. This is a fast local rejection layered in front of the
//! distributed lock (§4.B) — it catches same-process races a beat earlier,
//! it never replaces the lock as the source of truth.

use std::sync::Arc;

use dashmap::DashSet;

#[derive(Debug, Default, Clone)]
pub struct ActionStates {
  busy_deployments: Arc<DashSet<String>>,
}

impl ActionStates {
  pub fn is_busy(&self, deployment: &str) -> bool {
    self.busy_deployments.contains(deployment)
  }

  /// Marks `deployment` busy and returns a guard that un-marks it on drop.
  /// Returns `None` if it was already busy.
  pub fn try_enter(&self, deployment: &str) -> Option<BusyGuard> {
    if self.busy_deployments.insert(deployment.to_string()) {
      Some(BusyGuard {
        set: self.busy_deployments.clone(),
        name: deployment.to_string(),
      })
    } else {
      None
    }
  }
}

pub struct BusyGuard {
  set: Arc<DashSet<String>>,
  name: String,
}

impl Drop for BusyGuard {
  fn drop(&mut self) {
    self.set.remove(&self.name);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn second_entry_is_rejected_while_first_is_held() {
    let states = ActionStates::default();
    let guard = states.try_enter("d1").expect("first entry succeeds");
    assert!(states.is_busy("d1"));
    assert!(states.try_enter("d1").is_none());
    drop(guard);
    assert!(!states.is_busy("d1"));
    assert!(states.try_enter("d1").is_some());
  }
}
