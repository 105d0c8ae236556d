// ABOUTME: Façade combining directory, identity issuer, registry, and transport.
// ABOUTME: Owns the ensure-thread funnel and the assistant delivery/typing paths.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::directory::UserDirectory;
use crate::error::{ChatError, ChatResult};
use crate::identity::IdentityIssuer;
use crate::model::{
    participant_key, AssistantProfile, Credential, Thread, ThreadMode, ThreadSummary, User,
    UserRole,
};
use crate::registry::ThreadRegistry;
use crate::transport::{ChatTransport, ThreadParticipant};

pub const ASSISTANT_TAGLINE: &str = "Always-on finance guide";
pub const ASSISTANT_PERSONA: &str = "Financial wellness coach";

/// Preview length stored on a thread after an assistant delivery.
const PREVIEW_MAX_CHARS: usize = 120;
const OPENING_PREVIEW: &str = "Conversation started";

/// Resolution of an assistant-mode conversation for one human user.
pub struct AssistantConversation {
    pub human: User,
    pub assistant: User,
    pub thread: Thread,
}

/// The chat orchestration façade.
///
/// Maps the application-level "conversation between participants" onto
/// transport-level thread and identity objects. Thread creation is
/// single-flighted per canonical participant key, so two racing
/// first-contact requests resolve to one transport thread.
pub struct ChatOrchestrator {
    directory: UserDirectory,
    registry: ThreadRegistry,
    issuer: Arc<IdentityIssuer>,
    transport: Arc<dyn ChatTransport>,
    endpoint_url: String,
    creating: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ChatOrchestrator {
    pub fn new(
        directory: UserDirectory,
        registry: ThreadRegistry,
        issuer: Arc<IdentityIssuer>,
        transport: Arc<dyn ChatTransport>,
        endpoint_url: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            registry,
            issuer,
            transport,
            endpoint_url: endpoint_url.into(),
            creating: Mutex::new(HashMap::new()),
        }
    }

    pub fn directory(&self) -> &UserDirectory {
        &self.directory
    }

    pub fn registry(&self) -> &ThreadRegistry {
        &self.registry
    }

    async fn creation_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.creating.lock().await;
        Arc::clone(
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Resolve or create the thread for an unordered participant pair.
    ///
    /// The cheap registry lookup short-circuits the common case of
    /// reopening an existing conversation; only a first contact pays for
    /// identity minting and the transport round-trip. The lookup is
    /// re-checked under the pair's creation lock.
    async fn ensure_thread(
        &self,
        participant_ids: [String; 2],
        mode: ThreadMode,
        topic: String,
    ) -> ChatResult<Thread> {
        if let Some(existing) = self.registry.find_by_participants(&participant_ids).await? {
            return Ok(existing);
        }

        let key = participant_key(&participant_ids);
        let lock = self.creation_lock(&key).await;
        let _guard = lock.lock().await;

        if let Some(existing) = self.registry.find_by_participants(&participant_ids).await? {
            return Ok(existing);
        }

        let primary = self.directory.require(&participant_ids[0]).await?;
        let (_, token) = self.issuer.issue_token(&primary).await?;

        let mut participants = Vec::with_capacity(participant_ids.len());
        for id in &participant_ids {
            let user = self.directory.require(id).await?;
            let ensured = self.issuer.ensure_identity(&user).await?;
            let transport_user_id = ensured
                .transport_identity
                .clone()
                .ok_or_else(|| ChatError::identity("transport identity missing after mint"))?;
            participants.push(ThreadParticipant {
                transport_user_id,
                display_name: ensured.display_name,
            });
        }

        let transport_thread_id = self
            .transport
            .create_thread(&token, &topic, &participants)
            .await?;

        let now = Utc::now();
        let record = Thread {
            id: String::new(),
            transport_thread_id,
            mode,
            topic,
            participant_ids,
            created_at: now,
            last_activity_at: now,
            last_message_preview: Some(OPENING_PREVIEW.to_string()),
        };
        let stored = self.registry.save(&record).await?;
        metrics::counter!("meshline_threads_created_total").increment(1);
        tracing::info!(
            thread_id = %stored.id,
            transport_thread_id = %stored.transport_thread_id,
            mode = %stored.mode,
            topic = %stored.topic,
            "thread created"
        );
        Ok(stored)
    }

    /// Human users sorted by display name, for the contact list.
    pub async fn list_human_users(&self) -> ChatResult<Vec<User>> {
        self.directory.list_humans().await
    }

    /// The assistant's public profile, with its transport identity ensured.
    pub async fn assistant_profile(&self) -> ChatResult<AssistantProfile> {
        let assistant = self.directory.assistant().await?;
        let ensured = self.issuer.ensure_identity(&assistant).await?;
        Ok(AssistantProfile {
            id: ensured.id,
            display_name: ensured.display_name,
            tagline: ASSISTANT_TAGLINE.to_string(),
            persona: ASSISTANT_PERSONA.to_string(),
            transport_identity: ensured.transport_identity,
        })
    }

    /// Threads the user participates in, most recently active first.
    pub async fn list_threads_for_user(&self, user_id: &str) -> ChatResult<Vec<ThreadSummary>> {
        let threads = self.registry.list_for_user(user_id).await?;
        Ok(threads.into_iter().map(ThreadSummary::from).collect())
    }

    /// Start (or reopen) a human-to-human DM. Assistant conversations must
    /// use [`start_ai_conversation`](Self::start_ai_conversation), so a
    /// non-human peer is rejected here.
    pub async fn start_user_conversation(
        &self,
        initiator_id: &str,
        peer_id: &str,
    ) -> ChatResult<ThreadSummary> {
        if initiator_id == peer_id {
            return Err(ChatError::validation("cannot start a thread with yourself"));
        }
        let initiator = self.directory.require(initiator_id).await?;
        let peer = self.directory.require(peer_id).await?;
        if peer.role != UserRole::Human {
            return Err(ChatError::validation("peer must be a human user"));
        }

        let topic = format!("{} ↔ {}", initiator.first_name(), peer.first_name());
        let thread = self
            .ensure_thread(
                [initiator_id.to_string(), peer_id.to_string()],
                ThreadMode::User,
                topic,
            )
            .await?;
        Ok(thread.into())
    }

    /// Start (or reopen) the user's conversation with the assistant.
    pub async fn start_ai_conversation(&self, user_id: &str) -> ChatResult<ThreadSummary> {
        let assistant = self.assistant_profile().await?;
        let human = self.directory.require(user_id).await?;
        let topic = format!("{} with {}", assistant.display_name, human.first_name());
        let thread = self
            .ensure_thread(
                [user_id.to_string(), assistant.id],
                ThreadMode::Ai,
                topic,
            )
            .await?;
        Ok(thread.into())
    }

    /// Issue the short-lived credential a client needs to attach to a
    /// thread. Called on every thread selection; nothing is cached here —
    /// the TTL cache is a client-side concern.
    pub async fn credentials_for_thread(
        &self,
        user_id: &str,
        thread_id: &str,
    ) -> ChatResult<Credential> {
        let user = self.directory.require(user_id).await?;
        let thread = self.registry.require(thread_id).await?;
        if !thread.contains(user_id) {
            return Err(ChatError::forbidden("user is not part of this thread"));
        }

        let (ensured, token) = self.issuer.issue_token(&user).await?;
        let transport_user_id = ensured
            .transport_identity
            .clone()
            .ok_or_else(|| ChatError::identity("transport identity missing after mint"))?;
        Ok(Credential {
            transport_user_id,
            display_name: ensured.display_name,
            endpoint_url: self.endpoint_url.clone(),
            token,
            transport_thread_id: thread.transport_thread_id,
            topic: thread.topic,
        })
    }

    /// Resolve the assistant conversation for a human, optionally pinned to
    /// a specific thread id. A pinned id only counts when the thread really
    /// is the assistant↔user pair in `ai` mode; otherwise the pair lookup
    /// (and lazy creation) takes over.
    pub async fn assistant_conversation(
        &self,
        user_id: &str,
        thread_id: Option<&str>,
    ) -> ChatResult<AssistantConversation> {
        let human = self.directory.require(user_id).await?;
        let assistant = self.directory.assistant().await?;

        let mut thread = None;
        if let Some(id) = thread_id {
            if let Some(existing) = self.registry.get(id).await? {
                if existing.contains(user_id)
                    && existing.contains(&assistant.id)
                    && existing.mode == ThreadMode::Ai
                {
                    thread = Some(existing);
                }
            }
        }

        let thread = match thread {
            Some(t) => t,
            None => {
                let pair = [user_id.to_string(), assistant.id.clone()];
                match self.registry.find_by_participants(&pair).await? {
                    Some(t) => t,
                    None => {
                        let topic =
                            format!("{} with {}", assistant.display_name, human.first_name());
                        self.ensure_thread(pair, ThreadMode::Ai, topic).await?
                    }
                }
            }
        };

        Ok(AssistantConversation {
            human,
            assistant,
            thread,
        })
    }

    /// Deliver an automated reply into the user's assistant thread.
    ///
    /// The typing notification before the send is best-effort; the message
    /// send itself is the primary guarantee and propagates failure.
    pub async fn deliver_assistant_response(
        &self,
        user_id: &str,
        message_text: &str,
    ) -> ChatResult<()> {
        let trimmed = message_text.trim();
        if trimmed.is_empty() {
            tracing::debug!(user_id = %user_id, "skipping empty assistant response");
            return Ok(());
        }

        let conversation = self.assistant_conversation(user_id, None).await?;
        let (assistant, token) = self.issuer.issue_token(&conversation.assistant).await?;

        if let Err(e) = self
            .transport
            .send_typing(&token, &conversation.thread.transport_thread_id)
            .await
        {
            tracing::warn!(error = %e, "typing notification before delivery failed");
        }

        self.transport
            .send_message(
                &token,
                &conversation.thread.transport_thread_id,
                &assistant.display_name,
                trimmed,
            )
            .await?;
        metrics::counter!("meshline_assistant_messages_total").increment(1);

        let mut updated = conversation.thread;
        updated.last_activity_at = Utc::now();
        updated.last_message_preview = Some(trimmed.chars().take(PREVIEW_MAX_CHARS).collect());
        self.registry.save(&updated).await?;
        Ok(())
    }

    /// Surface the assistant's typing signal in the user's assistant
    /// thread. Unlike the delivery path, a failure here is the whole point
    /// of the call and propagates.
    pub async fn send_assistant_typing(
        &self,
        user_id: &str,
        thread_id: Option<&str>,
    ) -> ChatResult<()> {
        let conversation = self.assistant_conversation(user_id, thread_id).await?;
        let (_, token) = self.issuer.issue_token(&conversation.assistant).await?;
        self.transport
            .send_typing(&token, &conversation.thread.transport_thread_id)
            .await
    }
}
