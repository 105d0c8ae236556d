// ABOUTME: Injected storage boundary owning user and thread records.
// ABOUTME: MemoryStore backs tests and dev; SqliteStore persists metadata for production.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::{ChatError, ChatResult};
use crate::model::{participant_key, Presence, Thread, ThreadMode, User, UserRole};

/// Storage boundary for user and thread records.
///
/// All mutation is upsert-by-id; uniqueness of the participant pair is kept
/// by the participant-key index each implementation maintains. The
/// orchestration layer holds this behind `Arc<dyn ChatStore>` so tests can
/// swap in [`MemoryStore`] and production can use [`SqliteStore`].
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn list_users(&self) -> ChatResult<Vec<User>>;
    async fn get_user(&self, user_id: &str) -> ChatResult<Option<User>>;
    async fn save_user(&self, user: &User) -> ChatResult<()>;

    async fn list_threads_for_user(&self, user_id: &str) -> ChatResult<Vec<Thread>>;
    async fn get_thread(&self, thread_id: &str) -> ChatResult<Option<Thread>>;
    async fn find_thread_by_participants(
        &self,
        participant_ids: &[String; 2],
    ) -> ChatResult<Option<Thread>>;
    async fn find_thread_by_transport_id(
        &self,
        transport_thread_id: &str,
    ) -> ChatResult<Option<Thread>>;

    /// Upsert a thread. A blank id gets a fresh UUID assigned; the stored
    /// record (with its final id) is returned.
    async fn save_thread(&self, thread: &Thread) -> ChatResult<Thread>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    users: HashMap<String, User>,
    threads: HashMap<String, Thread>,
    /// canonical participant key -> thread id
    participant_index: HashMap<String, String>,
}

/// Map-backed reference implementation.
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner::default()),
        }
    }

    fn lock(&self) -> ChatResult<std::sync::MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|e| ChatError::Storage(format!("store mutex poisoned: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn list_users(&self) -> ChatResult<Vec<User>> {
        Ok(self.lock()?.users.values().cloned().collect())
    }

    async fn get_user(&self, user_id: &str) -> ChatResult<Option<User>> {
        Ok(self.lock()?.users.get(user_id).cloned())
    }

    async fn save_user(&self, user: &User) -> ChatResult<()> {
        self.lock()?.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn list_threads_for_user(&self, user_id: &str) -> ChatResult<Vec<Thread>> {
        Ok(self
            .lock()?
            .threads
            .values()
            .filter(|t| t.contains(user_id))
            .cloned()
            .collect())
    }

    async fn get_thread(&self, thread_id: &str) -> ChatResult<Option<Thread>> {
        Ok(self.lock()?.threads.get(thread_id).cloned())
    }

    async fn find_thread_by_participants(
        &self,
        participant_ids: &[String; 2],
    ) -> ChatResult<Option<Thread>> {
        let key = participant_key(participant_ids);
        let inner = self.lock()?;
        Ok(inner
            .participant_index
            .get(&key)
            .and_then(|id| inner.threads.get(id))
            .cloned())
    }

    async fn find_thread_by_transport_id(
        &self,
        transport_thread_id: &str,
    ) -> ChatResult<Option<Thread>> {
        Ok(self
            .lock()?
            .threads
            .values()
            .find(|t| t.transport_thread_id == transport_thread_id)
            .cloned())
    }

    async fn save_thread(&self, thread: &Thread) -> ChatResult<Thread> {
        let mut stored = thread.clone();
        if stored.id.is_empty() {
            stored.id = Uuid::new_v4().to_string();
        }
        let mut inner = self.lock()?;
        inner
            .participant_index
            .insert(stored.participant_key(), stored.id.clone());
        inner.threads.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

/// SQLite-backed store for thread and user metadata. Message content is
/// never stored here; that lives with the transport.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> ChatResult<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ChatError::Storage(format!("create data directory: {}", e)))?;
            }
        }
        let conn = Connection::open(db_path.as_ref())?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                role TEXT NOT NULL,
                accent_color TEXT NOT NULL,
                external_id TEXT,
                transport_identity TEXT,
                presence TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_seen_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS threads (
                id TEXT PRIMARY KEY,
                transport_thread_id TEXT NOT NULL,
                mode TEXT NOT NULL,
                topic TEXT NOT NULL,
                participant_a TEXT NOT NULL,
                participant_b TEXT NOT NULL,
                participant_key TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                last_activity_at TEXT NOT NULL,
                last_message_preview TEXT
            )",
            [],
        )?;

        tracing::info!(db = %db_path.as_ref().display(), "chat store initialized");

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> ChatResult<std::sync::MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|e| ChatError::Storage(format!("database mutex poisoned: {}", e)))
    }
}

fn parse_timestamp(raw: String) -> ChatResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ChatError::Storage(format!("bad timestamp '{}': {}", raw, e)))
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(User, String, String)> {
    let role: String = row.get(2)?;
    let presence: String = row.get(6)?;
    let created_at: String = row.get(7)?;
    let last_seen_at: String = row.get(8)?;
    let user = User {
        id: row.get(0)?,
        display_name: row.get(1)?,
        role: role
            .parse::<UserRole>()
            .unwrap_or(UserRole::Human),
        accent_color: row.get(3)?,
        external_id: row.get(4)?,
        transport_identity: row.get(5)?,
        presence: presence.parse::<Presence>().unwrap_or(Presence::Offline),
        created_at: Utc::now(),
        last_seen_at: Utc::now(),
    };
    Ok((user, created_at, last_seen_at))
}

fn finish_user(parts: (User, String, String)) -> ChatResult<User> {
    let (mut user, created_at, last_seen_at) = parts;
    user.created_at = parse_timestamp(created_at)?;
    user.last_seen_at = parse_timestamp(last_seen_at)?;
    Ok(user)
}

fn thread_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Thread, String, String)> {
    let mode: String = row.get(2)?;
    let created_at: String = row.get(6)?;
    let last_activity_at: String = row.get(7)?;
    let thread = Thread {
        id: row.get(0)?,
        transport_thread_id: row.get(1)?,
        mode: mode.parse::<ThreadMode>().unwrap_or(ThreadMode::User),
        topic: row.get(3)?,
        participant_ids: [row.get(4)?, row.get(5)?],
        created_at: Utc::now(),
        last_activity_at: Utc::now(),
        last_message_preview: row.get(8)?,
    };
    Ok((thread, created_at, last_activity_at))
}

fn finish_thread(parts: (Thread, String, String)) -> ChatResult<Thread> {
    let (mut thread, created_at, last_activity_at) = parts;
    thread.created_at = parse_timestamp(created_at)?;
    thread.last_activity_at = parse_timestamp(last_activity_at)?;
    Ok(thread)
}

const USER_COLUMNS: &str = "id, display_name, role, accent_color, external_id, \
     transport_identity, presence, created_at, last_seen_at";
const THREAD_COLUMNS: &str = "id, transport_thread_id, mode, topic, participant_a, \
     participant_b, created_at, last_activity_at, last_message_preview";

#[async_trait]
impl ChatStore for SqliteStore {
    async fn list_users(&self) -> ChatResult<Vec<User>> {
        let db = self.lock()?;
        let mut stmt = db.prepare(&format!("SELECT {} FROM users", USER_COLUMNS))?;
        let rows = stmt.query_map([], user_from_row)?;
        let mut users = Vec::new();
        for row in rows {
            users.push(finish_user(row?)?);
        }
        Ok(users)
    }

    async fn get_user(&self, user_id: &str) -> ChatResult<Option<User>> {
        let db = self.lock()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM users WHERE id = ?1",
            USER_COLUMNS
        ))?;
        let parts = stmt.query_row(params![user_id], user_from_row).optional()?;
        parts.map(finish_user).transpose()
    }

    async fn save_user(&self, user: &User) -> ChatResult<()> {
        let db = self.lock()?;
        db.execute(
            "INSERT INTO users (id, display_name, role, accent_color, external_id,
                transport_identity, presence, created_at, last_seen_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                role = excluded.role,
                accent_color = excluded.accent_color,
                external_id = excluded.external_id,
                transport_identity = excluded.transport_identity,
                presence = excluded.presence,
                last_seen_at = excluded.last_seen_at",
            params![
                user.id,
                user.display_name,
                user.role.to_string(),
                user.accent_color,
                user.external_id,
                user.transport_identity,
                user.presence.to_string(),
                user.created_at.to_rfc3339(),
                user.last_seen_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn list_threads_for_user(&self, user_id: &str) -> ChatResult<Vec<Thread>> {
        let db = self.lock()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM threads WHERE participant_a = ?1 OR participant_b = ?1",
            THREAD_COLUMNS
        ))?;
        let rows = stmt.query_map(params![user_id], thread_from_row)?;
        let mut threads = Vec::new();
        for row in rows {
            threads.push(finish_thread(row?)?);
        }
        Ok(threads)
    }

    async fn get_thread(&self, thread_id: &str) -> ChatResult<Option<Thread>> {
        let db = self.lock()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM threads WHERE id = ?1",
            THREAD_COLUMNS
        ))?;
        let parts = stmt
            .query_row(params![thread_id], thread_from_row)
            .optional()?;
        parts.map(finish_thread).transpose()
    }

    async fn find_thread_by_participants(
        &self,
        participant_ids: &[String; 2],
    ) -> ChatResult<Option<Thread>> {
        let key = participant_key(participant_ids);
        let db = self.lock()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM threads WHERE participant_key = ?1",
            THREAD_COLUMNS
        ))?;
        let parts = stmt.query_row(params![key], thread_from_row).optional()?;
        parts.map(finish_thread).transpose()
    }

    async fn find_thread_by_transport_id(
        &self,
        transport_thread_id: &str,
    ) -> ChatResult<Option<Thread>> {
        let db = self.lock()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM threads WHERE transport_thread_id = ?1",
            THREAD_COLUMNS
        ))?;
        let parts = stmt
            .query_row(params![transport_thread_id], thread_from_row)
            .optional()?;
        parts.map(finish_thread).transpose()
    }

    async fn save_thread(&self, thread: &Thread) -> ChatResult<Thread> {
        let mut stored = thread.clone();
        if stored.id.is_empty() {
            stored.id = Uuid::new_v4().to_string();
        }
        let db = self.lock()?;
        db.execute(
            "INSERT INTO threads (id, transport_thread_id, mode, topic, participant_a,
                participant_b, participant_key, created_at, last_activity_at, last_message_preview)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                transport_thread_id = excluded.transport_thread_id,
                topic = excluded.topic,
                last_activity_at = excluded.last_activity_at,
                last_message_preview = excluded.last_message_preview",
            params![
                stored.id,
                stored.transport_thread_id,
                stored.mode.to_string(),
                stored.topic,
                stored.participant_ids[0],
                stored.participant_ids[1],
                stored.participant_key(),
                stored.created_at.to_rfc3339(),
                stored.last_activity_at.to_rfc3339(),
                stored.last_message_preview,
            ],
        )?;
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn user(id: &str, name: &str, role: UserRole) -> User {
        User {
            id: id.to_string(),
            display_name: name.to_string(),
            role,
            accent_color: "#34D399".to_string(),
            external_id: None,
            transport_identity: None,
            presence: Presence::Online,
            created_at: Utc::now(),
            last_seen_at: Utc::now(),
        }
    }

    fn thread(a: &str, b: &str) -> Thread {
        let now = Utc::now();
        Thread {
            id: String::new(),
            transport_thread_id: format!("19:{}-{}", a, b),
            mode: ThreadMode::User,
            topic: format!("{} ↔ {}", a, b),
            participant_ids: [a.to_string(), b.to_string()],
            created_at: now,
            last_activity_at: now,
            last_message_preview: Some("Conversation started".to_string()),
        }
    }

    async fn exercise_store(store: &dyn ChatStore) {
        // users
        store
            .save_user(&user("fredrick", "Fredrick Maina", UserRole::Human))
            .await
            .unwrap();
        store
            .save_user(&user("coach-mesh", "Coach MESH", UserRole::Assistant))
            .await
            .unwrap();
        assert_eq!(store.list_users().await.unwrap().len(), 2);

        let mut fredrick = store.get_user("fredrick").await.unwrap().unwrap();
        assert!(fredrick.transport_identity.is_none());
        fredrick.transport_identity = Some("8:mesh:1".to_string());
        store.save_user(&fredrick).await.unwrap();
        let reloaded = store.get_user("fredrick").await.unwrap().unwrap();
        assert_eq!(reloaded.transport_identity.as_deref(), Some("8:mesh:1"));

        assert!(store.get_user("nobody").await.unwrap().is_none());

        // threads
        let saved = store
            .save_thread(&thread("fredrick", "coach-mesh"))
            .await
            .unwrap();
        assert!(!saved.id.is_empty(), "blank id gets assigned");

        let by_pair = store
            .find_thread_by_participants(&["coach-mesh".to_string(), "fredrick".to_string()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_pair.id, saved.id, "lookup works with reversed order");

        let by_transport = store
            .find_thread_by_transport_id(&saved.transport_thread_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_transport.id, saved.id);

        let listed = store.list_threads_for_user("fredrick").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(store
            .list_threads_for_user("assumpta")
            .await
            .unwrap()
            .is_empty());

        // upsert keeps the id and updates the preview
        let mut updated = saved.clone();
        updated.last_message_preview = Some("new preview".to_string());
        let stored = store.save_thread(&updated).await.unwrap();
        assert_eq!(stored.id, saved.id);
        let reloaded = store.get_thread(&saved.id).await.unwrap().unwrap();
        assert_eq!(reloaded.last_message_preview.as_deref(), Some("new preview"));
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryStore::new();
        exercise_store(&store).await;
    }

    #[tokio::test]
    async fn sqlite_store_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::new(tmp.path().join("mesh.db")).unwrap();
        exercise_store(&store).await;
    }

    #[tokio::test]
    async fn sqlite_store_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mesh.db");
        {
            let store = SqliteStore::new(&path).unwrap();
            store
                .save_user(&user("rohi", "Rohi Ogula", UserRole::Human))
                .await
                .unwrap();
        }
        let store = SqliteStore::new(&path).unwrap();
        let rohi = store.get_user("rohi").await.unwrap().unwrap();
        assert_eq!(rohi.display_name, "Rohi Ogula");
    }
}
