// ABOUTME: Domain records for users, threads, and chat credentials.
// ABOUTME: Defines the canonical participant key that keeps threads unique per pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a local user. Exactly one user in the directory carries
/// `Assistant`; everyone else is `Human`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Human,
    Assistant,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Human => write!(f, "human"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(Self::Human),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("unknown user role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Offline,
    Away,
}

impl std::fmt::Display for Presence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
            Self::Away => write!(f, "away"),
        }
    }
}

impl std::str::FromStr for Presence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            "away" => Ok(Self::Away),
            other => Err(format!("unknown presence: {}", other)),
        }
    }
}

/// A known local user. `transport_identity` is assigned lazily on first
/// contact with the identity service and never re-minted afterwards;
/// re-minting would orphan every thread the old identity participates in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub role: UserRole,
    pub accent_color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_identity: Option<String>,
    pub presence: Presence,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl User {
    /// First word of the display name, used when composing thread topics.
    pub fn first_name(&self) -> &str {
        self.display_name
            .split_whitespace()
            .next()
            .unwrap_or(&self.display_name)
    }
}

/// Whether a thread is a human-to-human DM or an assistant conversation.
/// Fixed at creation; derived from whether one participant is the assistant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ThreadMode {
    User,
    Ai,
}

impl std::fmt::Display for ThreadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Ai => write!(f, "ai"),
        }
    }
}

impl std::str::FromStr for ThreadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "ai" => Ok(Self::Ai),
            other => Err(format!("unknown thread mode: {}", other)),
        }
    }
}

/// A conversation record. The unordered participant pair is unique across
/// all threads; see [`participant_key`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    pub transport_thread_id: String,
    pub mode: ThreadMode,
    pub topic: String,
    pub participant_ids: [String; 2],
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_preview: Option<String>,
}

impl Thread {
    pub fn contains(&self, user_id: &str) -> bool {
        self.participant_ids.iter().any(|id| id == user_id)
    }

    pub fn participant_key(&self) -> String {
        participant_key(&self.participant_ids)
    }
}

/// Canonical lookup key for an unordered participant pair: sorted ids
/// joined with `|`. Both orderings of the same pair produce the same key.
pub fn participant_key(participant_ids: &[String; 2]) -> String {
    let mut sorted: Vec<&str> = participant_ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join("|")
}

/// Thread plus the per-user fields the sidebar wants. Unread tracking is
/// delegated to the transport, so the count is always zero here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSummary {
    #[serde(flatten)]
    pub thread: Thread,
    pub unread_count: u32,
}

impl From<Thread> for ThreadSummary {
    fn from(thread: Thread) -> Self {
        Self {
            thread,
            unread_count: 0,
        }
    }
}

/// Short-lived bundle a client needs to attach to a transport thread.
/// Never persisted server-side; lives at most one request/response cycle
/// there, and in the client-side TTL cache after that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "userId")]
    pub transport_user_id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "endpointUrl")]
    pub endpoint_url: String,
    pub token: String,
    #[serde(rename = "threadId")]
    pub transport_thread_id: String,
    pub topic: String,
}

/// Public profile of the singleton assistant user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantProfile {
    pub id: String,
    pub display_name: String,
    pub tagline: String,
    pub persona: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_identity: Option<String>,
}
