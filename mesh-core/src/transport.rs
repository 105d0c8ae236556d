// ABOUTME: Trait boundary for the managed chat transport and its identity service.
// ABOUTME: Also defines the message events the bridges observe.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChatResult;

/// A participant as the transport sees it, addressed by transport identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadParticipant {
    pub transport_user_id: String,
    pub display_name: String,
}

/// External identity service: mints transport identities and short-lived
/// chat-scoped access tokens. Failures surface as `ChatError::Identity`
/// and are never retried here.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Mint a fresh transport identity.
    async fn create_identity(&self) -> ChatResult<String>;

    /// Issue a chat-scoped access token for an existing transport identity.
    async fn issue_chat_token(&self, transport_user_id: &str) -> ChatResult<String>;
}

/// The managed chat transport. Message persistence, delivery, typing and
/// read-receipt signaling all live behind this trait; every call
/// authenticates with a user-scoped token from the identity service.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Create a transport-level thread and return its id.
    async fn create_thread(
        &self,
        token: &str,
        topic: &str,
        participants: &[ThreadParticipant],
    ) -> ChatResult<String>;

    /// Send a message into a thread; returns the transport message id.
    async fn send_message(
        &self,
        token: &str,
        transport_thread_id: &str,
        sender_display_name: &str,
        body: &str,
    ) -> ChatResult<String>;

    /// Surface a typing signal in a thread.
    async fn send_typing(&self, token: &str, transport_thread_id: &str) -> ChatResult<()>;

    /// Acknowledge a message with a read receipt.
    async fn send_read_receipt(
        &self,
        token: &str,
        transport_thread_id: &str,
        message_id: &str,
    ) -> ChatResult<()>;
}

/// Whether an observed message left the current session or arrived into it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    Sent,
    Received,
}

/// A message event observed on the transport, as delivered to the bridges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    #[serde(rename = "messageId")]
    pub message_id: String,
    #[serde(rename = "threadId")]
    pub transport_thread_id: String,
    /// Transport identity of the sender; transports may omit it.
    #[serde(rename = "senderId", skip_serializing_if = "Option::is_none")]
    pub sender_transport_id: Option<String>,
    pub body: String,
    pub direction: MessageDirection,
}
