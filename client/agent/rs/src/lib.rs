//! Agent RPC client (spec §4.A): request/response over a pub/sub bus with
//! a per-invocation inbox, timeouts, and correlation ids.

pub mod api;

use std::time::Duration;

use api::AgentRequest;
use director_client::DirectorError;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const WAIT_TASK_INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const WAIT_TASK_MAX_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
struct RequestEnvelope<'a> {
  method: &'a str,
  arguments: Value,
  reply_to: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ReplyEnvelope {
  Exception { exception: RemoteException },
  Value { value: Value },
}

#[derive(Debug, Clone, Deserialize)]
struct RemoteException {
  message: String,
}

/// A client for talking to a single agent bus. One client is shared across
/// every agent the director drives; the subject addresses which agent a
/// given call is for.
#[derive(Clone)]
pub struct Client {
  bus: async_nats::Client,
  default_timeout: Duration,
}

impl Client {
  pub fn new(bus: async_nats::Client) -> Self {
    Self { bus, default_timeout: DEFAULT_TIMEOUT }
  }

  pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
    self.default_timeout = timeout;
    self
  }

  fn subject(agent_id: &str) -> String {
    format!("agent.{agent_id}")
  }

  /// `send(agent_id, method, args, {timeout?}) -> reply | error` (spec §4.A).
  pub async fn send<R: AgentRequest>(
    &self,
    agent_id: &str,
    request: R,
  ) -> Result<R::Response, DirectorError> {
    self.send_timeout(agent_id, request, self.default_timeout).await
  }

  pub async fn send_timeout<R: AgentRequest>(
    &self,
    agent_id: &str,
    request: R,
    timeout: Duration,
  ) -> Result<R::Response, DirectorError> {
    let correlation_id = Uuid::new_v4();
    let reply_to = format!("agent-reply.{correlation_id}");

    let mut subscriber = self
      .bus
      .subscribe(reply_to.clone())
      .await
      .map_err(|e| DirectorError::AgentUnreachable(e.to_string()))?;

    let arguments = serde_json::to_value(&request)
      .map_err(|e| DirectorError::Internal(e.to_string()))?;
    let envelope = RequestEnvelope {
      method: R::METHOD,
      arguments,
      reply_to: reply_to.clone(),
    };
    let payload = serde_json::to_vec(&envelope)
      .map_err(|e| DirectorError::Internal(e.to_string()))?;

    self
      .bus
      .publish(Self::subject(agent_id), payload.into())
      .await
      .map_err(|e| DirectorError::AgentUnreachable(e.to_string()))?;

    let result = tokio::time::timeout(timeout, subscriber.next()).await;
    // Unsubscribe on completion or timeout (spec §4.A side effects).
    subscriber.unsubscribe().await.ok();

    let message = result
      .map_err(|_| {
        DirectorError::AgentTimeout(format!(
          "{} on agent {agent_id}",
          R::METHOD
        ))
      })?
      .ok_or_else(|| DirectorError::AgentUnreachable(agent_id.to_string()))?;

    let reply: ReplyEnvelope = serde_json::from_slice(&message.payload)
      .map_err(|e| DirectorError::RemoteError(e.to_string()))?;

    match reply {
      ReplyEnvelope::Exception { exception } => {
        Err(DirectorError::RemoteError(exception.message))
      }
      ReplyEnvelope::Value { value } => serde_json::from_value(value)
        .map_err(|e| DirectorError::RemoteError(e.to_string())),
    }
  }

  /// Retries only on `timeout`, and only for methods known idempotent
  /// (spec §7). `attempts` includes the first try.
  pub async fn send_with_retry<R>(
    &self,
    agent_id: &str,
    request: R,
    attempts: u32,
  ) -> Result<R::Response, DirectorError>
  where
    R: AgentRequest + Clone,
  {
    let idempotent = api::is_idempotent(R::METHOD);
    let mut last_err = None;
    for attempt in 0..attempts.max(1) {
      match self.send(agent_id, request.clone()).await {
        Ok(value) => return Ok(value),
        Err(DirectorError::AgentTimeout(msg)) if idempotent => {
          last_err = Some(DirectorError::AgentTimeout(msg));
          tracing::warn!(
            "agent {agent_id} {} timed out, retry {}/{attempts}",
            R::METHOD,
            attempt + 1
          );
          continue;
        }
        Err(e) => return Err(e),
      }
    }
    Err(last_err.unwrap_or_else(|| {
      DirectorError::AgentTimeout(format!("{} on agent {agent_id}", R::METHOD))
    }))
  }

  /// Polls `get_task` with exponential backoff capped at a few seconds,
  /// returning the final value or the remote error (spec §4.A).
  pub async fn wait_task(
    &self,
    agent_id: &str,
    task_id: &str,
  ) -> Result<Value, DirectorError> {
    let mut backoff = WAIT_TASK_INITIAL_BACKOFF;
    loop {
      match self
        .send(agent_id, api::GetTask { id: task_id.to_string() })
        .await?
      {
        api::AgentTaskStatus::Running => {
          tokio::time::sleep(backoff).await;
          backoff = (backoff * 2).min(WAIT_TASK_MAX_BACKOFF);
        }
        api::AgentTaskStatus::Done { value } => return Ok(value),
        api::AgentTaskStatus::Failed { message } => {
          return Err(DirectorError::RemoteError(message));
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::api::is_idempotent;

  #[test]
  fn idempotent_methods_are_the_read_only_ones() {
    assert!(is_idempotent("ping"));
    assert!(is_idempotent("get_state"));
    assert!(is_idempotent("get_task"));
    assert!(!is_idempotent("apply"));
    assert!(!is_idempotent("compile_package"));
  }
}
