// ABOUTME: User directory over the injected store.
// ABOUTME: Seeds the known roster at boot and resolves the singleton assistant.

use std::sync::Arc;

use crate::error::{ChatError, ChatResult};
use crate::model::{User, UserRole};
use crate::store::ChatStore;

/// Accessor layer for user records. Owns no state of its own; everything
/// goes through the injected [`ChatStore`].
#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn ChatStore>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    pub async fn list_all(&self) -> ChatResult<Vec<User>> {
        self.store.list_users().await
    }

    pub async fn list_by_role(&self, role: UserRole) -> ChatResult<Vec<User>> {
        let mut users = self.store.list_users().await?;
        users.retain(|u| u.role == role);
        Ok(users)
    }

    /// Human users sorted by display name, the order the contact list shows.
    pub async fn list_humans(&self) -> ChatResult<Vec<User>> {
        let mut humans = self.list_by_role(UserRole::Human).await?;
        humans.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(humans)
    }

    pub async fn get(&self, user_id: &str) -> ChatResult<Option<User>> {
        self.store.get_user(user_id).await
    }

    /// Like [`get`](Self::get) but absent users become `NotFound`.
    pub async fn require(&self, user_id: &str) -> ChatResult<User> {
        self.get(user_id)
            .await?
            .ok_or_else(|| ChatError::not_found(format!("user '{}' not found", user_id)))
    }

    /// Upsert by id. No validation of display name or color happens here.
    pub async fn save(&self, user: &User) -> ChatResult<()> {
        self.store.save_user(user).await
    }

    /// Resolve the singleton assistant profile record.
    pub async fn assistant(&self) -> ChatResult<User> {
        self.list_by_role(UserRole::Assistant)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::not_found("assistant profile missing from the directory"))
    }

    /// Upsert the configured roster at boot. An already-stored user keeps
    /// its minted transport identity and original created_at; everything
    /// else (name, color, presence) follows the roster.
    pub async fn seed(&self, roster: &[User]) -> ChatResult<()> {
        for seed in roster {
            let merged = match self.get(&seed.id).await? {
                Some(existing) => {
                    let mut user = seed.clone();
                    if user.transport_identity.is_none() {
                        user.transport_identity = existing.transport_identity;
                    }
                    user.created_at = existing.created_at;
                    user.last_seen_at = existing.last_seen_at;
                    user
                }
                None => seed.clone(),
            };
            self.save(&merged).await?;
        }
        tracing::info!(users = roster.len(), "user roster seeded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Presence;
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn user(id: &str, name: &str, role: UserRole) -> User {
        User {
            id: id.to_string(),
            display_name: name.to_string(),
            role,
            accent_color: "#A5B4FC".to_string(),
            external_id: None,
            transport_identity: None,
            presence: Presence::Online,
            created_at: Utc::now(),
            last_seen_at: Utc::now(),
        }
    }

    fn directory() -> UserDirectory {
        UserDirectory::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn humans_sorted_by_display_name() {
        let dir = directory();
        dir.seed(&[
            user("rohi", "Rohi Ogula", UserRole::Human),
            user("assumpta", "Assumpta Wanyama", UserRole::Human),
            user("coach-mesh", "Coach MESH", UserRole::Assistant),
        ])
        .await
        .unwrap();

        let humans = dir.list_humans().await.unwrap();
        let names: Vec<&str> = humans.iter().map(|u| u.display_name.as_str()).collect();
        assert_eq!(names, vec!["Assumpta Wanyama", "Rohi Ogula"]);
    }

    #[tokio::test]
    async fn assistant_resolves_singleton() {
        let dir = directory();
        assert!(matches!(
            dir.assistant().await,
            Err(ChatError::NotFound(_))
        ));

        dir.save(&user("coach-mesh", "Coach MESH", UserRole::Assistant))
            .await
            .unwrap();
        let assistant = dir.assistant().await.unwrap();
        assert_eq!(assistant.id, "coach-mesh");
    }

    #[tokio::test]
    async fn seed_preserves_minted_identity() {
        let dir = directory();
        let mut fredrick = user("fredrick", "Fredrick Maina", UserRole::Human);
        dir.seed(std::slice::from_ref(&fredrick)).await.unwrap();

        let mut minted = dir.require("fredrick").await.unwrap();
        minted.transport_identity = Some("8:mesh:keep-me".to_string());
        dir.save(&minted).await.unwrap();

        // Re-seeding (a restart) must not clobber the minted identity.
        fredrick.display_name = "Fredrick M.".to_string();
        dir.seed(std::slice::from_ref(&fredrick)).await.unwrap();
        let reloaded = dir.require("fredrick").await.unwrap();
        assert_eq!(
            reloaded.transport_identity.as_deref(),
            Some("8:mesh:keep-me")
        );
        assert_eq!(reloaded.display_name, "Fredrick M.");
    }

    #[tokio::test]
    async fn require_maps_absent_to_not_found() {
        let dir = directory();
        let err = dir.require("ghost").await.unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
        assert!(err.to_string().contains("ghost"));
    }
}
