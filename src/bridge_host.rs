// ABOUTME: Server-side supervisor attaching a responder bridge to each assistant thread.
// ABOUTME: Consumes the ingested transport event stream and routes events to per-thread bridges.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;

use mesh_core::{
    ChatOrchestrator, ChatResult, MessageEvent, ResponderBridge, ResponderTrigger, SessionView,
    ThreadMode,
};

/// Routes ingested transport events to one [`ResponderBridge`] per
/// assistant-mode thread, creating bridges lazily on first sight of a
/// thread. Events for unknown or human-to-human threads are dropped.
pub struct BridgeHost {
    orchestrator: Arc<ChatOrchestrator>,
    trigger: Arc<dyn ResponderTrigger>,
    bridges: HashMap<String, ResponderBridge>,
}

impl BridgeHost {
    pub fn new(orchestrator: Arc<ChatOrchestrator>, trigger: Arc<dyn ResponderTrigger>) -> Self {
        Self {
            orchestrator,
            trigger,
            bridges: HashMap::new(),
        }
    }

    async fn bridge_for(&mut self, transport_thread_id: &str) -> ChatResult<Option<&mut ResponderBridge>> {
        if !self.bridges.contains_key(transport_thread_id) {
            let thread = match self
                .orchestrator
                .registry()
                .find_by_transport_id(transport_thread_id)
                .await?
            {
                Some(t) if t.mode == ThreadMode::Ai => t,
                _ => return Ok(None),
            };

            let assistant = self.orchestrator.directory().assistant().await?;
            let human_id = match thread
                .participant_ids
                .iter()
                .find(|id| **id != assistant.id)
            {
                Some(id) => id.clone(),
                None => return Ok(None),
            };
            let human = self.orchestrator.directory().require(&human_id).await?;
            let user_transport_id = match human.transport_identity {
                Some(id) => id,
                // No identity yet means the human has never attached; their
                // sent-events cannot be matched, so skip for now.
                None => return Ok(None),
            };

            let session = SessionView {
                user_id: human.id,
                thread_id: thread.id.clone(),
                user_transport_id,
                transport_thread_id: thread.transport_thread_id.clone(),
            };
            tracing::info!(
                thread_id = %session.thread_id,
                user_id = %session.user_id,
                "attaching responder bridge"
            );
            self.bridges.insert(
                transport_thread_id.to_string(),
                ResponderBridge::new(
                    Arc::clone(&self.orchestrator),
                    Arc::clone(&self.trigger),
                    session,
                ),
            );
        }
        Ok(self.bridges.get_mut(transport_thread_id))
    }

    async fn handle(&mut self, event: MessageEvent) {
        match self.bridge_for(&event.transport_thread_id).await {
            Ok(Some(bridge)) => {
                bridge.observe(&event);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, thread = %event.transport_thread_id, "bridge routing failed");
            }
        }
    }

    pub async fn run(mut self, mut rx: broadcast::Receiver<MessageEvent>) {
        loop {
            match rx.recv().await {
                Ok(event) => self.handle(event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "bridge host lagged behind event stream");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("event stream closed, bridge host shutting down");
                    break;
                }
            }
        }
    }

    pub fn spawn(self, rx: broadcast::Receiver<MessageEvent>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(rx))
    }
}
