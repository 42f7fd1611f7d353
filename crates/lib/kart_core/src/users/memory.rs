//! In-memory user store for tests and development.
//!
//! Every check-and-write happens under one write lock, so concurrent
//! registrations with the same username cannot both succeed and concurrent
//! writes to one user cannot lose each other.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::store::UserStore;
use super::{Field, UserError};
use crate::models::ids::{OrderId, ProductId, UserId};
use crate::models::user::{ProfileUpdate, User};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    by_username: HashMap<String, UserId>,
    by_email: HashMap<String, UserId>,
}

impl Tables {
    fn check_unique(&self, username: &str, email: &str) -> Result<(), UserError> {
        if self.by_username.contains_key(username) {
            return Err(UserError::duplicate(Field::Username, username));
        }
        if self.by_email.contains_key(email) {
            return Err(UserError::duplicate(Field::Email, email));
        }
        Ok(())
    }

    fn user_mut(&mut self, id: UserId) -> Result<&mut User, UserError> {
        self.users
            .get_mut(&id)
            .ok_or_else(|| UserError::NotFound(format!("user {id}")))
    }
}

/// A [`UserStore`] backed by hash maps.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    tables: RwLock<Tables>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    pub async fn len(&self) -> usize {
        self.tables.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Run `change` on one record under the write lock. `change` reports
    /// whether it modified anything; only then is `updated_at` stamped.
    async fn modify<F>(&self, id: UserId, change: F) -> Result<User, UserError>
    where
        F: FnOnce(&mut User) -> bool + Send,
    {
        let mut tables = self.tables.write().await;
        let user = tables.user_mut(id)?;
        if change(user) {
            user.updated_at = Utc::now();
        }
        Ok(user.clone())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: &User) -> Result<User, UserError> {
        let mut tables = self.tables.write().await;
        tables.check_unique(&user.username, &user.email)?;

        tables.by_username.insert(user.username.clone(), user.id);
        tables.by_email.insert(user.email.clone(), user.id);
        tables.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, UserError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, UserError> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_username
            .get(username)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_email
            .get(email)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn update_profile(&self, id: UserId, update: &ProfileUpdate) -> Result<User, UserError> {
        self.modify(id, |user| {
            user.apply_profile(update);
            true
        })
        .await
    }

    async fn update_password_hash(&self, id: UserId, password_hash: &str) -> Result<(), UserError> {
        self.modify(id, |user| {
            user.password_hash = password_hash.to_string();
            true
        })
        .await?;
        Ok(())
    }

    async fn set_refresh_token(&self, id: UserId, digest: Option<&str>) -> Result<(), UserError> {
        self.modify(id, |user| {
            user.refresh_token = digest.map(str::to_string);
            true
        })
        .await?;
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        id: UserId,
        current: &str,
        next: &str,
    ) -> Result<bool, UserError> {
        let mut rotated = false;
        self.modify(id, |user| {
            rotated = user.refresh_token.as_deref() == Some(current);
            if rotated {
                user.refresh_token = Some(next.to_string());
            }
            rotated
        })
        .await?;
        Ok(rotated)
    }

    async fn set_otp(
        &self,
        id: UserId,
        code: u32,
        expires: DateTime<Utc>,
    ) -> Result<(), UserError> {
        self.modify(id, |user| {
            user.otp = Some(code);
            user.otp_expires = Some(expires);
            true
        })
        .await?;
        Ok(())
    }

    async fn discard_otp(&self, id: UserId, code: u32) -> Result<(), UserError> {
        self.modify(id, |user| {
            let pending = user.otp == Some(code);
            if pending {
                user.discard_otp();
            }
            pending
        })
        .await?;
        Ok(())
    }

    async fn confirm_otp(
        &self,
        id: UserId,
        code: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, UserError> {
        let mut confirmed = false;
        let user = self
            .modify(id, |user| {
                confirmed = user.otp == Some(code) && user.has_live_otp(now);
                if confirmed {
                    user.mark_verified();
                }
                confirmed
            })
            .await?;
        Ok(confirmed.then_some(user))
    }

    async fn add_to_wishlist(&self, id: UserId, product: ProductId) -> Result<User, UserError> {
        self.modify(id, |user| {
            if user.wishlist.contains(&product) {
                return false;
            }
            user.wishlist.push(product);
            true
        })
        .await
    }

    async fn remove_from_wishlist(
        &self,
        id: UserId,
        product: ProductId,
    ) -> Result<User, UserError> {
        self.modify(id, |user| {
            let before = user.wishlist.len();
            user.wishlist.retain(|p| *p != product);
            user.wishlist.len() != before
        })
        .await
    }

    async fn add_order(&self, id: UserId, order: OrderId) -> Result<User, UserError> {
        self.modify(id, |user| {
            if user.orders.contains(&order) {
                return false;
            }
            user.orders.push(order);
            true
        })
        .await
    }

    async fn delete(&self, id: UserId) -> Result<bool, UserError> {
        let mut tables = self.tables.write().await;
        let Some(user) = tables.users.remove(&id) else {
            return Ok(false);
        };
        tables.by_username.remove(&user.username);
        tables.by_email.remove(&user.email);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use uuid::Uuid;

    use super::*;
    use crate::models::user::VerificationMethod;
    use crate::users::ValidationError;

    fn user(username: &str, email: &str) -> User {
        let now = Utc::now();
        User {
            id: UserId::new(),
            username: username.into(),
            verification_method: VerificationMethod::Email,
            email: email.into(),
            full_name: "Someone".into(),
            avatar: None,
            password_hash: "hash-1".into(),
            phone: None,
            shipping_address: None,
            billing_address: None,
            orders: Vec::new(),
            wishlist: Vec::new(),
            otp: None,
            otp_expires: None,
            is_verified: false,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_and_lookup() {
        let store = MemoryUserStore::new();
        let alice = store.insert(&user("alice", "alice@example.com")).await.unwrap();

        assert_eq!(store.find_by_id(alice.id).await.unwrap().unwrap().username, "alice");
        assert!(store.find_by_username("alice").await.unwrap().is_some());
        assert!(store.find_by_email("alice@example.com").await.unwrap().is_some());
        assert!(store.find_by_username("bob").await.unwrap().is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn duplicate_username_and_email_are_rejected() {
        let store = MemoryUserStore::new();
        store.insert(&user("alice", "alice@example.com")).await.unwrap();

        let err = store.insert(&user("alice", "other@example.com")).await.unwrap_err();
        assert!(matches!(
            err,
            UserError::Validation(ValidationError::Duplicate { field: Field::Username, .. })
        ));

        let err = store.insert(&user("other", "alice@example.com")).await.unwrap_err();
        assert!(matches!(
            err,
            UserError::Validation(ValidationError::Duplicate { field: Field::Email, .. })
        ));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn profile_update_never_touches_password_hash() {
        let store = MemoryUserStore::new();
        let saved = store.insert(&user("alice", "alice@example.com")).await.unwrap();

        let updated = store
            .update_profile(
                saved.id,
                &ProfileUpdate {
                    full_name: Some("Alice L".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.full_name, "Alice L");
        assert_eq!(updated.password_hash, "hash-1");
        assert!(updated.updated_at >= saved.updated_at);
    }

    #[tokio::test]
    async fn rotation_requires_the_current_digest() {
        let store = MemoryUserStore::new();
        let alice = store.insert(&user("alice", "alice@example.com")).await.unwrap();

        assert!(!store.rotate_refresh_token(alice.id, "a", "b").await.unwrap());
        store.set_refresh_token(alice.id, Some("a")).await.unwrap();
        assert!(store.rotate_refresh_token(alice.id, "a", "b").await.unwrap());
        assert!(!store.rotate_refresh_token(alice.id, "a", "c").await.unwrap());

        let stored = store.find_by_id(alice.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn otp_confirmation_is_conditional() {
        let store = MemoryUserStore::new();
        let alice = store.insert(&user("alice", "alice@example.com")).await.unwrap();
        let now = Utc::now();

        store.set_otp(alice.id, 111_111, now + Duration::minutes(5)).await.unwrap();
        assert!(store.confirm_otp(alice.id, 222_222, now).await.unwrap().is_none());
        assert!(store
            .confirm_otp(alice.id, 111_111, now + Duration::minutes(6))
            .await
            .unwrap()
            .is_none());

        // A stale code does not discard a newer one.
        store.discard_otp(alice.id, 222_222).await.unwrap();
        let confirmed = store.confirm_otp(alice.id, 111_111, now).await.unwrap().unwrap();
        assert!(confirmed.is_verified);
        assert_eq!(confirmed.otp, None);
    }

    #[tokio::test]
    async fn list_writes_skip_duplicates() {
        let store = MemoryUserStore::new();
        let alice = store.insert(&user("alice", "alice@example.com")).await.unwrap();
        let product = ProductId::from_uuid(Uuid::new_v4());
        let order = OrderId::from_uuid(Uuid::new_v4());

        store.add_to_wishlist(alice.id, product).await.unwrap();
        let after = store.add_to_wishlist(alice.id, product).await.unwrap();
        assert_eq!(after.wishlist, vec![product]);

        store.add_order(alice.id, order).await.unwrap();
        let after = store.add_order(alice.id, order).await.unwrap();
        assert_eq!(after.orders, vec![order]);

        let after = store.remove_from_wishlist(alice.id, product).await.unwrap();
        assert!(after.wishlist.is_empty());
    }

    #[tokio::test]
    async fn delete_frees_unique_keys() {
        let store = MemoryUserStore::new();
        let alice = store.insert(&user("alice", "alice@example.com")).await.unwrap();

        assert!(store.delete(alice.id).await.unwrap());
        assert!(!store.delete(alice.id).await.unwrap());
        assert!(store.is_empty().await);
        store.insert(&user("alice", "alice@example.com")).await.unwrap();
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let store = MemoryUserStore::new();
        let ghost = UserId::new();
        assert!(matches!(
            store.update_profile(ghost, &ProfileUpdate::default()).await,
            Err(UserError::NotFound(_))
        ));
        assert!(matches!(
            store.update_password_hash(ghost, "h").await,
            Err(UserError::NotFound(_))
        ));
        assert!(matches!(
            store.set_refresh_token(ghost, None).await,
            Err(UserError::NotFound(_))
        ));
    }
}
