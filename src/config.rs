// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Carries the transport endpoint, HTTP bind, storage choice, and user roster
use anyhow::{Context, Result};
use chrono::Utc;
use mesh_core::{Presence, User, UserRole};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub transport: TransportConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub responder: ResponderConfig,
    #[serde(default = "default_assistant")]
    pub assistant: AssistantConfig,
    #[serde(default = "default_roster")]
    pub users: Vec<RosterEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Base URL of the managed chat transport (also handed to clients in
    /// every credential).
    pub endpoint_url: String,
    /// Admin key for the transport's identity service.
    pub access_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "memory" or "sqlite"
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    #[serde(default = "default_storage_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: default_storage_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponderConfig {
    /// Webhook that turns a human message into an assistant reply. When
    /// unset, a canned fallback reply keeps the AI path usable in dev.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default = "default_assistant_id")]
    pub id: String,
    #[serde(default = "default_assistant_name")]
    pub display_name: String,
    #[serde(default = "default_assistant_color")]
    pub accent_color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: String,
    pub display_name: String,
    #[serde(default = "default_accent_color")]
    pub accent_color: String,
    #[serde(default = "default_presence")]
    pub presence: Presence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

fn default_http_host() -> String {
    "localhost".to_string()
}

fn default_http_port() -> u16 {
    4000
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

fn default_storage_path() -> String {
    "./data/meshline.db".to_string()
}

fn default_assistant_id() -> String {
    "coach-mesh".to_string()
}

fn default_assistant_name() -> String {
    "Coach MESH".to_string()
}

fn default_assistant_color() -> String {
    "#E879F9".to_string()
}

fn default_accent_color() -> String {
    "#A5B4FC".to_string()
}

fn default_presence() -> Presence {
    Presence::Online
}

fn default_assistant() -> AssistantConfig {
    AssistantConfig {
        id: default_assistant_id(),
        display_name: default_assistant_name(),
        accent_color: default_assistant_color(),
    }
}

fn default_roster() -> Vec<RosterEntry> {
    vec![
        RosterEntry {
            id: "fredrick".to_string(),
            display_name: "Fredrick Maina".to_string(),
            accent_color: "#38BDF8".to_string(),
            presence: Presence::Online,
            external_id: Some("254743039297".to_string()),
        },
        RosterEntry {
            id: "assumpta".to_string(),
            display_name: "Assumpta Wanyama".to_string(),
            accent_color: "#34D399".to_string(),
            presence: Presence::Online,
            external_id: Some("254736815546".to_string()),
        },
        RosterEntry {
            id: "rohi".to_string(),
            display_name: "Rohi Ogula".to_string(),
            accent_color: "#F472B6".to_string(),
            presence: Presence::Away,
            external_id: Some("254799031228".to_string()),
        },
        RosterEntry {
            id: "guest".to_string(),
            display_name: "Guest".to_string(),
            accent_color: "#A5B4FC".to_string(),
            presence: Presence::Offline,
            external_id: None,
        },
    ]
}

impl Config {
    /// Load configuration from config.toml with environment variable overrides
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            Config {
                transport: TransportConfig {
                    endpoint_url: String::new(),
                    access_key: String::new(),
                },
                http: HttpConfig::default(),
                storage: StorageConfig::default(),
                responder: ResponderConfig::default(),
                assistant: default_assistant(),
                users: default_roster(),
            }
        };

        // Override with environment variables if present
        if let Ok(val) = std::env::var("MESH_TRANSPORT_ENDPOINT") {
            config.transport.endpoint_url = val;
        }
        if let Ok(val) = std::env::var("MESH_TRANSPORT_ACCESS_KEY") {
            config.transport.access_key = val;
        }
        if let Ok(val) = std::env::var("MESH_HTTP_HOST") {
            config.http.host = val;
        }
        if let Ok(val) = std::env::var("MESH_HTTP_PORT") {
            config.http.port = val
                .parse()
                .with_context(|| format!("MESH_HTTP_PORT must be a valid port, got: {}", val))?;
        }
        if let Ok(val) = std::env::var("MESH_STORAGE_BACKEND") {
            config.storage.backend = val;
        }
        if let Ok(val) = std::env::var("MESH_STORAGE_PATH") {
            config.storage.path = val;
        }
        if let Ok(val) = std::env::var("MESH_RESPONDER_URL") {
            config.responder.url = Some(val);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.transport.endpoint_url.trim().is_empty() {
            anyhow::bail!(
                "transport.endpoint_url is required (set in config.toml or MESH_TRANSPORT_ENDPOINT env var)"
            );
        }
        if self.transport.access_key.trim().is_empty() {
            anyhow::bail!(
                "transport.access_key is required (set in config.toml or MESH_TRANSPORT_ACCESS_KEY env var)"
            );
        }
        if !matches!(self.storage.backend.as_str(), "memory" | "sqlite") {
            anyhow::bail!(
                "storage.backend must be 'memory' or 'sqlite', got: {}",
                self.storage.backend
            );
        }
        if self.assistant.id.trim().is_empty() {
            anyhow::bail!("assistant.id must not be empty");
        }
        let mut seen = std::collections::HashSet::new();
        for entry in &self.users {
            if entry.id.trim().is_empty() {
                anyhow::bail!("user roster entries need a non-empty id");
            }
            if !seen.insert(entry.id.as_str()) {
                anyhow::bail!("duplicate user id in roster: {}", entry.id);
            }
            if entry.id == self.assistant.id {
                anyhow::bail!("roster id '{}' collides with the assistant", entry.id);
            }
        }
        Ok(())
    }

    /// The full seed roster as directory records: every configured human
    /// plus the singleton assistant.
    pub fn seed_users(&self) -> Vec<User> {
        let now = Utc::now();
        let mut users: Vec<User> = self
            .users
            .iter()
            .map(|entry| User {
                id: entry.id.clone(),
                display_name: entry.display_name.clone(),
                role: UserRole::Human,
                accent_color: entry.accent_color.clone(),
                external_id: entry.external_id.clone(),
                transport_identity: None,
                presence: entry.presence,
                created_at: now,
                last_seen_at: now,
            })
            .collect();
        users.push(User {
            id: self.assistant.id.clone(),
            display_name: self.assistant.display_name.clone(),
            role: UserRole::Assistant,
            accent_color: self.assistant.accent_color.clone(),
            external_id: None,
            transport_identity: None,
            presence: Presence::Online,
            created_at: now,
            last_seen_at: now,
        });
        users
    }
}
