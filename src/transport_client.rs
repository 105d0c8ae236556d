// ABOUTME: REST clients for the managed transport's identity and chat APIs.
// ABOUTME: Identity calls authenticate with the admin access key, chat calls with user tokens.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use mesh_core::{ChatError, ChatResult, ChatTransport, IdentityService, ThreadParticipant};

const API_VERSION: &str = "2023-10-01";

#[derive(Debug, Deserialize)]
struct IdentityEnvelope {
    identity: IdentityBody,
}

#[derive(Debug, Deserialize)]
struct IdentityBody {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TokenEnvelope {
    token: String,
}

#[derive(Debug, Deserialize)]
struct CreateThreadEnvelope {
    #[serde(rename = "chatThread")]
    chat_thread: Option<CreatedThreadBody>,
}

#[derive(Debug, Deserialize)]
struct CreatedThreadBody {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendMessageEnvelope {
    id: String,
}

async fn error_body(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    format!("{}: {}", status, snippet)
}

/// Identity service client. Mints identities and chat-scoped tokens using
/// the admin access key; these calls never see a user token.
pub struct RestIdentityService {
    client: reqwest::Client,
    endpoint_url: String,
    access_key: String,
}

impl RestIdentityService {
    pub fn new(endpoint_url: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint_url: trim_trailing_slash(endpoint_url.into()),
            access_key: access_key.into(),
        }
    }
}

#[async_trait]
impl IdentityService for RestIdentityService {
    async fn create_identity(&self) -> ChatResult<String> {
        let url = format!(
            "{}/identities?api-version={}",
            self.endpoint_url, API_VERSION
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_key)
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| ChatError::identity(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChatError::identity(error_body(response).await));
        }
        let envelope: IdentityEnvelope = response
            .json()
            .await
            .map_err(|e| ChatError::identity(e.to_string()))?;
        Ok(envelope.identity.id)
    }

    async fn issue_chat_token(&self, transport_user_id: &str) -> ChatResult<String> {
        let url = format!(
            "{}/identities/{}/:issueAccessToken?api-version={}",
            self.endpoint_url, transport_user_id, API_VERSION
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_key)
            .json(&json!({ "scopes": ["chat"] }))
            .send()
            .await
            .map_err(|e| ChatError::identity(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChatError::identity(error_body(response).await));
        }
        let envelope: TokenEnvelope = response
            .json()
            .await
            .map_err(|e| ChatError::identity(e.to_string()))?;
        Ok(envelope.token)
    }
}

/// Chat transport client. Every call authenticates with the caller's
/// user-scoped token, never the admin key.
pub struct RestChatTransport {
    client: reqwest::Client,
    endpoint_url: String,
}

impl RestChatTransport {
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint_url: trim_trailing_slash(endpoint_url.into()),
        }
    }

    fn thread_url(&self, transport_thread_id: &str, suffix: &str) -> String {
        format!(
            "{}/chat/threads/{}/{}?api-version={}",
            self.endpoint_url, transport_thread_id, suffix, API_VERSION
        )
    }
}

#[async_trait]
impl ChatTransport for RestChatTransport {
    async fn create_thread(
        &self,
        token: &str,
        topic: &str,
        participants: &[ThreadParticipant],
    ) -> ChatResult<String> {
        let url = format!(
            "{}/chat/threads?api-version={}",
            self.endpoint_url, API_VERSION
        );
        let body = json!({
            "topic": topic,
            "participants": participants
                .iter()
                .map(|p| json!({
                    "communicationIdentifier": { "rawId": p.transport_user_id },
                    "displayName": p.display_name,
                }))
                .collect::<Vec<_>>(),
        });
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChatError::transport(error_body(response).await));
        }
        let envelope: CreateThreadEnvelope = response
            .json()
            .await
            .map_err(|e| ChatError::transport(e.to_string()))?;
        envelope
            .chat_thread
            .and_then(|t| t.id)
            .ok_or_else(|| ChatError::transport("thread id missing from create response"))
    }

    async fn send_message(
        &self,
        token: &str,
        transport_thread_id: &str,
        sender_display_name: &str,
        body: &str,
    ) -> ChatResult<String> {
        let url = self.thread_url(transport_thread_id, "messages");
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&json!({
                "content": body,
                "senderDisplayName": sender_display_name,
            }))
            .send()
            .await
            .map_err(|e| ChatError::transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChatError::transport(error_body(response).await));
        }
        let envelope: SendMessageEnvelope = response
            .json()
            .await
            .map_err(|e| ChatError::transport(e.to_string()))?;
        Ok(envelope.id)
    }

    async fn send_typing(&self, token: &str, transport_thread_id: &str) -> ChatResult<()> {
        let url = self.thread_url(transport_thread_id, "typing");
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ChatError::transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChatError::transport(error_body(response).await));
        }
        Ok(())
    }

    async fn send_read_receipt(
        &self,
        token: &str,
        transport_thread_id: &str,
        message_id: &str,
    ) -> ChatResult<()> {
        let url = self.thread_url(transport_thread_id, "readReceipts");
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&json!({ "chatMessageId": message_id }))
            .send()
            .await
            .map_err(|e| ChatError::transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChatError::transport(error_body(response).await));
        }
        Ok(())
    }
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}
