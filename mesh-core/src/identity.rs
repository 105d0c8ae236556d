// ABOUTME: Decouples local user identity from transport identity.
// ABOUTME: Serializes first-time minting per user and issues chat-scoped tokens.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::directory::UserDirectory;
use crate::error::{ChatError, ChatResult};
use crate::model::User;
use crate::transport::IdentityService;

/// Issues transport identities and access tokens for local users.
///
/// Minting is single-flighted per user id: two concurrent first-time calls
/// for the same user share one mint instead of leaking an identity to
/// last-write-wins.
pub struct IdentityIssuer {
    directory: UserDirectory,
    identity: Arc<dyn IdentityService>,
    minting: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IdentityIssuer {
    pub fn new(directory: UserDirectory, identity: Arc<dyn IdentityService>) -> Self {
        Self {
            directory,
            identity,
            minting: Mutex::new(HashMap::new()),
        }
    }

    async fn mint_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.minting.lock().await;
        Arc::clone(
            locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Ensure the user has a transport identity, minting one on first use.
    /// Idempotent once set; the identity is immutable for the user's
    /// lifetime.
    pub async fn ensure_identity(&self, user: &User) -> ChatResult<User> {
        if user.transport_identity.is_some() {
            return Ok(user.clone());
        }

        let lock = self.mint_lock(&user.id).await;
        let _guard = lock.lock().await;

        // A concurrent caller may have minted while we waited on the lock.
        if let Some(current) = self.directory.get(&user.id).await? {
            if current.transport_identity.is_some() {
                return Ok(current);
            }
        }

        let transport_identity = self.identity.create_identity().await?;
        tracing::info!(
            user_id = %user.id,
            transport_identity = %transport_identity,
            "minted transport identity"
        );

        let mut updated = user.clone();
        updated.transport_identity = Some(transport_identity);
        updated.last_seen_at = Utc::now();
        self.directory.save(&updated).await?;
        Ok(updated)
    }

    /// Ensure identity, then request a chat-scoped token. Updates
    /// `last_seen_at` as a side effect. Returns the (possibly updated)
    /// user alongside the token.
    pub async fn issue_token(&self, user: &User) -> ChatResult<(User, String)> {
        let ensured = self.ensure_identity(user).await?;
        let transport_id = ensured
            .transport_identity
            .clone()
            .ok_or_else(|| ChatError::identity("transport identity missing after mint"))?;

        let token = self.identity.issue_chat_token(&transport_id).await?;
        metrics::counter!("meshline_tokens_issued_total").increment(1);

        let mut refreshed = ensured;
        refreshed.last_seen_at = Utc::now();
        self.directory.save(&refreshed).await?;
        Ok((refreshed, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Presence, UserRole};
    use crate::store::MemoryStore;
    use crate::testing::MockIdentityService;
    use std::time::Duration;

    fn human(id: &str, name: &str) -> User {
        User {
            id: id.to_string(),
            display_name: name.to_string(),
            role: UserRole::Human,
            accent_color: "#38BDF8".to_string(),
            external_id: None,
            transport_identity: None,
            presence: Presence::Online,
            created_at: Utc::now(),
            last_seen_at: Utc::now(),
        }
    }

    fn issuer() -> (Arc<IdentityIssuer>, UserDirectory, Arc<MockIdentityService>) {
        let directory = UserDirectory::new(Arc::new(MemoryStore::new()));
        let identity = Arc::new(MockIdentityService::new());
        let issuer = Arc::new(IdentityIssuer::new(
            directory.clone(),
            identity.clone() as Arc<dyn IdentityService>,
        ));
        (issuer, directory, identity)
    }

    #[tokio::test]
    async fn ensure_identity_mints_once() {
        let (issuer, directory, identity) = issuer();
        let user = human("fredrick", "Fredrick Maina");
        directory.save(&user).await.unwrap();

        let first = issuer.ensure_identity(&user).await.unwrap();
        let minted = first.transport_identity.clone().unwrap();

        let second = issuer.ensure_identity(&first).await.unwrap();
        assert_eq!(second.transport_identity.as_deref(), Some(minted.as_str()));
        assert_eq!(identity.mint_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_first_mint_is_single_flighted() {
        let (issuer, directory, identity) = issuer();
        identity.set_delay(Duration::from_millis(25));
        let user = human("assumpta", "Assumpta Wanyama");
        directory.save(&user).await.unwrap();

        let (a, b) = tokio::join!(issuer.ensure_identity(&user), issuer.ensure_identity(&user));
        let a = a.unwrap();
        let b = b.unwrap();
        assert_eq!(a.transport_identity, b.transport_identity);
        assert_eq!(identity.mint_count(), 1, "no identity may leak");
    }

    #[tokio::test]
    async fn issue_token_bumps_last_seen() {
        let (issuer, directory, _identity) = issuer();
        let user = human("rohi", "Rohi Ogula");
        directory.save(&user).await.unwrap();
        let before = directory.require("rohi").await.unwrap().last_seen_at;

        tokio::time::sleep(Duration::from_millis(5)).await;
        let (refreshed, token) = issuer.issue_token(&user).await.unwrap();
        assert!(!token.is_empty());
        assert!(refreshed.last_seen_at > before);
    }

    #[tokio::test]
    async fn identity_failure_propagates_without_retry() {
        let (issuer, directory, identity) = issuer();
        identity.fail_minting(true);
        let user = human("guest", "Guest");
        directory.save(&user).await.unwrap();

        let err = issuer.issue_token(&user).await.unwrap_err();
        assert!(matches!(err, ChatError::Identity(_)));
        assert_eq!(identity.mint_count(), 0);
        // the user record is untouched
        let stored = directory.require("guest").await.unwrap();
        assert!(stored.transport_identity.is_none());
    }
}
