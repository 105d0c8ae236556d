// ABOUTME: Thread registry — single source of truth for conversation existence.
// ABOUTME: Keyed by the canonical participant pair via the injected store.

use std::sync::Arc;

use crate::error::{ChatError, ChatResult};
use crate::model::Thread;
use crate::store::ChatStore;

/// Typed accessor layer for thread records. The uniqueness guarantee ("at
/// most one thread per participant pair") comes from the store's
/// participant-key index; callers must go through
/// [`find_by_participants`](Self::find_by_participants) before creating.
#[derive(Clone)]
pub struct ThreadRegistry {
    store: Arc<dyn ChatStore>,
}

impl ThreadRegistry {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    pub async fn find_by_participants(
        &self,
        participant_ids: &[String; 2],
    ) -> ChatResult<Option<Thread>> {
        self.store.find_thread_by_participants(participant_ids).await
    }

    pub async fn find_by_transport_id(
        &self,
        transport_thread_id: &str,
    ) -> ChatResult<Option<Thread>> {
        self.store
            .find_thread_by_transport_id(transport_thread_id)
            .await
    }

    pub async fn get(&self, thread_id: &str) -> ChatResult<Option<Thread>> {
        self.store.get_thread(thread_id).await
    }

    pub async fn require(&self, thread_id: &str) -> ChatResult<Thread> {
        self.get(thread_id)
            .await?
            .ok_or_else(|| ChatError::not_found(format!("thread '{}' not found", thread_id)))
    }

    /// Threads the user participates in, most recently active first.
    pub async fn list_for_user(&self, user_id: &str) -> ChatResult<Vec<Thread>> {
        let mut threads = self.store.list_threads_for_user(user_id).await?;
        threads.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(threads)
    }

    /// Upsert; a blank id gets assigned. Returns the stored record.
    pub async fn save(&self, thread: &Thread) -> ChatResult<Thread> {
        self.store.save_thread(thread).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ThreadMode;
    use crate::store::MemoryStore;
    use chrono::{Duration, Utc};

    fn thread(a: &str, b: &str, activity_offset_secs: i64) -> Thread {
        let now = Utc::now();
        Thread {
            id: String::new(),
            transport_thread_id: format!("19:{}|{}", a, b),
            mode: ThreadMode::User,
            topic: format!("{} ↔ {}", a, b),
            participant_ids: [a.to_string(), b.to_string()],
            created_at: now,
            last_activity_at: now + Duration::seconds(activity_offset_secs),
            last_message_preview: None,
        }
    }

    #[tokio::test]
    async fn list_for_user_orders_by_recent_activity() {
        let registry = ThreadRegistry::new(Arc::new(MemoryStore::new()));
        registry.save(&thread("fredrick", "assumpta", 0)).await.unwrap();
        registry.save(&thread("fredrick", "rohi", 60)).await.unwrap();
        registry
            .save(&thread("fredrick", "coach-mesh", 30))
            .await
            .unwrap();

        let threads = registry.list_for_user("fredrick").await.unwrap();
        let topics: Vec<&str> = threads.iter().map(|t| t.topic.as_str()).collect();
        assert_eq!(
            topics,
            vec![
                "fredrick ↔ rohi",
                "fredrick ↔ coach-mesh",
                "fredrick ↔ assumpta"
            ]
        );
    }

    #[tokio::test]
    async fn require_maps_absent_to_not_found() {
        let registry = ThreadRegistry::new(Arc::new(MemoryStore::new()));
        assert!(matches!(
            registry.require("missing").await,
            Err(ChatError::NotFound(_))
        ));
    }
}
