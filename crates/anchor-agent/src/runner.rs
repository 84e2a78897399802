//! Agent event loop
//!
//! One loop owns the state machine and feeds it ticks and discovery events.

use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use anchor_common::{DeviceId, Ticker};

use crate::link::CoreLink;
use crate::state::AgentStateMachine;

/// Drive `machine` until `cancel` fires.
///
/// `on_identity` is called once the core issues this device an identity,
/// so the caller can persist it.
pub async fn run_agent<L, F>(
    mut machine: AgentStateMachine<L>,
    interval: Duration,
    cancel: CancellationToken,
    mut on_identity: F,
) -> AgentStateMachine<L>
where
    L: CoreLink,
    F: FnMut(&DeviceId),
{
    let mut events = machine.beacon().subscribe();
    let mut ticker = Ticker::new(interval);
    let mut listening = true;
    let mut known = machine.identity().cloned();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                machine.tick().await;
            }
            event = events.next(), if listening => match event {
                Some(event) => machine.on_discovery(&event).await,
                None => {
                    tracing::warn!("Discovery stream ended; relying on configured server");
                    listening = false;
                }
            },
        }

        if known.as_ref() != machine.identity() {
            known = machine.identity().cloned();
            if let Some(id) = &known {
                on_identity(id);
            }
        }
    }

    tracing::debug!("Agent loop stopped in {}", machine.mode());
    machine
}
