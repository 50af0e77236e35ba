#[macro_use]
extern crate tracing;

mod config;
mod state;

use std::sync::Arc;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{config::agent_config, state::Agents};

/// Mirrors `client/agent/rs/src/lib.rs`'s (private) wire envelopes — this
/// binary is the other end of that same bus protocol, so it keeps its own
/// copies rather than depending on the client crate's internals.
#[derive(Debug, Deserialize)]
struct RequestEnvelope {
  method: String,
  arguments: Value,
  reply_to: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ReplyEnvelope {
  Exception { exception: RemoteException },
  Value { value: Value },
}

#[derive(Debug, Serialize)]
struct RemoteException {
  message: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();
  let config = agent_config();
  logger::init(&config.logging)?;
  info!("Agent bus client connecting to {}", config.nats_url);

  let bus = async_nats::connect(&config.nats_url).await?;
  let mut subscriber = bus.subscribe("agent.*").await?;
  let agents: Arc<Agents> = Arc::new(Agents::default());

  info!("Agent listening on agent.*");

  while let Some(message) = subscriber.next().await {
    let subject = message.subject.to_string();
    let Some(agent_id) = subject.strip_prefix("agent.") else { continue };
    let agent_id = agent_id.to_string();
    let bus = bus.clone();
    let agents = agents.clone();

    tokio::spawn(async move {
      let envelope: RequestEnvelope = match serde_json::from_slice(&message.payload) {
        Ok(envelope) => envelope,
        Err(e) => {
          warn!("agent {agent_id}: malformed request | {e}");
          return;
        }
      };

      let outcome = state::dispatch(
        &agents,
        agent_config(),
        &agent_id,
        &envelope.method,
        envelope.arguments,
      )
      .await;

      let reply = match outcome {
        Ok(value) => ReplyEnvelope::Value { value },
        Err(message) => ReplyEnvelope::Exception { exception: RemoteException { message } },
      };

      let payload = match serde_json::to_vec(&reply) {
        Ok(payload) => payload,
        Err(e) => {
          error!("agent {agent_id}: failed to encode reply | {e}");
          return;
        }
      };

      if let Err(e) = bus.publish(envelope.reply_to, payload.into()).await {
        error!("agent {agent_id}: failed to publish reply | {e}");
      }
    });
  }

  Ok(())
}
