// ABOUTME: Root library module exposing configuration, HTTP surface, and transport clients
// ABOUTME: Re-exports the orchestration core from mesh-core

pub mod bridge_host;
pub mod config;
pub mod http;
pub mod metrics;
pub mod responder;
pub mod transport_client;

// Re-export the platform-agnostic core
pub use mesh_core::{
    bridge, credential_cache, directory, error, identity, model, orchestrator, registry, store,
    testing, transport,
};

pub use mesh_core::{
    ChatError, ChatOrchestrator, ChatResult, ChatStore, ChatTransport, Credential,
    CredentialCache, IdentityIssuer, IdentityService, MemoryStore, MessageEvent, SqliteStore,
    Thread, ThreadMode, ThreadRegistry, ThreadSummary, User, UserDirectory, UserRole,
};
