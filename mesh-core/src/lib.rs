// ABOUTME: Transport-agnostic chat orchestration core.
// ABOUTME: Directory, identity issuance, thread registry, orchestrator, and event bridges.

pub mod bridge;
pub mod credential_cache;
pub mod directory;
pub mod error;
pub mod identity;
pub mod model;
pub mod orchestrator;
pub mod registry;
pub mod store;
pub mod testing;
pub mod transport;

pub use bridge::{ReadReceiptBridge, ResponderBridge, ResponderTrigger, SessionView};
pub use credential_cache::{CredentialCache, DEFAULT_CREDENTIAL_TTL};
pub use directory::UserDirectory;
pub use error::{ChatError, ChatResult};
pub use identity::IdentityIssuer;
pub use model::{
    participant_key, AssistantProfile, Credential, Presence, Thread, ThreadMode, ThreadSummary,
    User, UserRole,
};
pub use orchestrator::{AssistantConversation, ChatOrchestrator};
pub use registry::ThreadRegistry;
pub use store::{ChatStore, MemoryStore, SqliteStore};
pub use transport::{
    ChatTransport, IdentityService, MessageDirection, MessageEvent, ThreadParticipant,
};
