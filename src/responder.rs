// ABOUTME: The external automated-reply generator behind the assistant.
// ABOUTME: Webhook-backed in production, canned fallback when unconfigured.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use mesh_core::{ChatError, ChatOrchestrator, ChatResult, ResponderTrigger, User};

use crate::config::ResponderConfig;

/// Produces the assistant's reply text for a human message. The reply is
/// delivered separately through the orchestrator.
#[async_trait]
pub trait AssistantResponder: Send + Sync {
    async fn respond(&self, user: &User, message_text: &str) -> ChatResult<String>;
}

/// Webhook-backed responder: posts the human message and reads the reply.
pub struct WebhookResponder {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ReplyEnvelope {
    reply: String,
}

impl WebhookResponder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl AssistantResponder for WebhookResponder {
    async fn respond(&self, user: &User, message_text: &str) -> ChatResult<String> {
        let body = json!({
            "senderUserId": user.id,
            "phoneNumber": user.external_id,
            "messageText": message_text,
        });
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::transport(format!("responder webhook: {}", e)))?;

        if !response.status().is_success() {
            return Err(ChatError::transport(format!(
                "responder webhook returned {}",
                response.status()
            )));
        }
        let envelope: ReplyEnvelope = response
            .json()
            .await
            .map_err(|e| ChatError::transport(format!("responder webhook: {}", e)))?;
        Ok(envelope.reply)
    }
}

/// Fallback responder used when no webhook is configured. Keeps the AI
/// conversation path usable in development.
pub struct CannedResponder;

#[async_trait]
impl AssistantResponder for CannedResponder {
    async fn respond(&self, user: &User, message_text: &str) -> ChatResult<String> {
        let _ = message_text;
        Ok(format!(
            "Thanks {}! I've noted that. Tell me more about what you're working toward and \
             we'll keep your money habits on track.",
            user.first_name()
        ))
    }
}

pub fn build_responder(config: &ResponderConfig) -> Arc<dyn AssistantResponder> {
    match &config.url {
        Some(url) => {
            tracing::info!(url = %url, "using webhook responder");
            Arc::new(WebhookResponder::new(url.clone()))
        }
        None => {
            tracing::warn!("no responder webhook configured, using canned replies");
            Arc::new(CannedResponder)
        }
    }
}

/// Generate a reply for the human's message and deliver it into their
/// assistant thread. Shared by the HTTP trigger route and the bridges.
pub async fn respond_and_deliver(
    orchestrator: &ChatOrchestrator,
    responder: &dyn AssistantResponder,
    user_id: &str,
    message_text: &str,
) -> ChatResult<()> {
    let trimmed = message_text.trim();
    if trimmed.is_empty() {
        return Ok(());
    }
    let user = orchestrator.directory().require(user_id).await?;
    let reply = responder.respond(&user, trimmed).await?;
    orchestrator.deliver_assistant_response(user_id, &reply).await
}

/// [`ResponderTrigger`] wiring: lets the bridges re-enter the orchestrator
/// through the same respond-and-deliver path the HTTP route uses.
pub struct OrchestratorTrigger {
    orchestrator: Arc<ChatOrchestrator>,
    responder: Arc<dyn AssistantResponder>,
}

impl OrchestratorTrigger {
    pub fn new(
        orchestrator: Arc<ChatOrchestrator>,
        responder: Arc<dyn AssistantResponder>,
    ) -> Self {
        Self {
            orchestrator,
            responder,
        }
    }
}

#[async_trait]
impl ResponderTrigger for OrchestratorTrigger {
    async fn trigger(&self, user_id: &str, message_text: &str) -> ChatResult<()> {
        respond_and_deliver(
            &self.orchestrator,
            self.responder.as_ref(),
            user_id,
            message_text,
        )
        .await
    }
}
