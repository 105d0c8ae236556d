// ABOUTME: Event bridges for assistant-mode conversation views.
// ABOUTME: Forwards outbound human messages to the responder and auto-acks inbound ones.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::ChatResult;
use crate::model::Credential;
use crate::orchestrator::ChatOrchestrator;
use crate::transport::{ChatTransport, MessageDirection, MessageEvent};

/// Upper bound on remembered message ids per bridge. Old ids are evicted
/// FIFO; the transport does not redeliver events that far apart.
const SEEN_CAPACITY: usize = 256;

/// Identifies the conversation view a bridge is attached to.
#[derive(Debug, Clone)]
pub struct SessionView {
    /// Local id of the human whose view this is.
    pub user_id: String,
    /// Local thread id, used to pin typing triggers.
    pub thread_id: String,
    /// The human's transport identity, for sender matching.
    pub user_transport_id: String,
    /// Transport thread the view is attached to.
    pub transport_thread_id: String,
}

/// The external automated-reply generator. Invoked with the human's
/// message; expected to produce and deliver the reply out of band.
#[async_trait]
pub trait ResponderTrigger: Send + Sync {
    async fn trigger(&self, user_id: &str, message_text: &str) -> ChatResult<()>;
}

/// Observes outbound human messages in one assistant-mode conversation and
/// fires the responder and a synthetic typing signal for each new one.
///
/// Both triggers are dispatched as independent tasks; failure of either is
/// logged, never surfaced, and does not block the other. The tracked-id
/// set prevents duplicate forwarding when the transport redelivers a
/// sent-event; it is cleared on teardown, which is safe because message
/// ids are not reused across transport sessions.
pub struct ResponderBridge {
    orchestrator: Arc<ChatOrchestrator>,
    trigger: Arc<dyn ResponderTrigger>,
    session: SessionView,
    seen: HashSet<String>,
    seen_order: VecDeque<String>,
}

impl ResponderBridge {
    pub fn new(
        orchestrator: Arc<ChatOrchestrator>,
        trigger: Arc<dyn ResponderTrigger>,
        session: SessionView,
    ) -> Self {
        Self {
            orchestrator,
            trigger,
            session,
            seen: HashSet::new(),
            seen_order: VecDeque::new(),
        }
    }

    fn track(&mut self, message_id: &str) {
        if self.seen.len() >= SEEN_CAPACITY {
            if let Some(oldest) = self.seen_order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(message_id.to_string());
        self.seen_order.push_back(message_id.to_string());
    }

    /// Handle one observed event. Returns whether the responder was fired.
    pub fn observe(&mut self, event: &MessageEvent) -> bool {
        if event.transport_thread_id != self.session.transport_thread_id {
            return false;
        }
        if event.direction != MessageDirection::Sent {
            return false;
        }
        // An absent sender is treated as the session user, matching the
        // transport adapters that omit it on own sent-events.
        if let Some(sender) = &event.sender_transport_id {
            if sender != &self.session.user_transport_id {
                return false;
            }
        }
        let trimmed = event.body.trim();
        if trimmed.is_empty() {
            return false;
        }
        if self.seen.contains(&event.message_id) {
            return false;
        }
        self.track(&event.message_id);

        let orchestrator = Arc::clone(&self.orchestrator);
        let user_id = self.session.user_id.clone();
        let thread_id = self.session.thread_id.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator
                .send_assistant_typing(&user_id, Some(&thread_id))
                .await
            {
                tracing::warn!(error = %e, user_id = %user_id, "typing trigger failed");
            }
        });

        let trigger = Arc::clone(&self.trigger);
        let user_id = self.session.user_id.clone();
        let text = trimmed.to_string();
        tokio::spawn(async move {
            if let Err(e) = trigger.trigger(&user_id, &text).await {
                tracing::error!(error = %e, user_id = %user_id, "responder trigger failed");
            }
        });
        true
    }

    /// Teardown: forget every tracked message id.
    pub fn clear(&mut self) {
        self.seen.clear();
        self.seen_order.clear();
    }

    /// Consume events until the stream closes, then tear down.
    pub async fn run(mut self, mut rx: broadcast::Receiver<MessageEvent>) {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    self.observe(&event);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "responder bridge lagged behind event stream");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!(
                        thread_id = %self.session.thread_id,
                        "event stream closed, responder bridge shutting down"
                    );
                    break;
                }
            }
        }
        self.clear();
    }

    pub fn spawn(self, rx: broadcast::Receiver<MessageEvent>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(rx))
    }
}

/// Acknowledges inbound messages not sent by the session user with a read
/// receipt. Failures are logged only; receipts are auxiliary.
pub struct ReadReceiptBridge {
    transport: Arc<dyn ChatTransport>,
    credential: Credential,
}

impl ReadReceiptBridge {
    pub fn new(transport: Arc<dyn ChatTransport>, credential: Credential) -> Self {
        Self {
            transport,
            credential,
        }
    }

    /// Handle one observed event. Returns whether a receipt was dispatched.
    pub fn observe(&self, event: &MessageEvent) -> bool {
        if event.transport_thread_id != self.credential.transport_thread_id {
            return false;
        }
        if event.direction != MessageDirection::Received {
            return false;
        }
        if event.message_id.is_empty() {
            return false;
        }
        if event.sender_transport_id.as_deref() == Some(self.credential.transport_user_id.as_str())
        {
            return false;
        }

        let transport = Arc::clone(&self.transport);
        let token = self.credential.token.clone();
        let thread = self.credential.transport_thread_id.clone();
        let message_id = event.message_id.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.send_read_receipt(&token, &thread, &message_id).await {
                tracing::warn!(error = %e, message_id = %message_id, "read receipt failed");
            }
        });
        true
    }

    pub async fn run(self, mut rx: broadcast::Receiver<MessageEvent>) {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    self.observe(&event);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "read receipt bridge lagged behind event stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    pub fn spawn(self, rx: broadcast::Receiver<MessageEvent>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(rx))
    }
}
