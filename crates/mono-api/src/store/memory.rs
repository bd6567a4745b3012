//! 프로세스 내 사용자 저장소.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{NewUser, StoreError, StoreResult, User, UserStore};

/// `BTreeMap` 기반 사용자 저장소.
///
/// ID는 1부터 순차 할당되며, 이메일과 사용자 이름은 대소문자를 구분하지 않고
/// 유일해야 합니다.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<BTreeMap<u64, User>>,
    next_id: AtomicU64,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 사용자 수.
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

fn conflict(users: &BTreeMap<u64, User>, skip_id: u64, username: &str, email: &str) -> Option<String> {
    users
        .values()
        .filter(|u| u.id != skip_id)
        .find_map(|u| {
            if u.email.eq_ignore_ascii_case(email) {
                Some(format!("email {}", email))
            } else if u.username.eq_ignore_ascii_case(username) {
                Some(format!("username {}", username))
            } else {
                None
            }
        })
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, user: NewUser) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if let Some(field) = conflict(&users, 0, &user.username, &user.email) {
            return Err(StoreError::AlreadyExists(field));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Utc::now();
        let created = User {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        users.insert(id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: u64) -> StoreResult<User> {
        self.users
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> StoreResult<User> {
        self.users
            .read()
            .await
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, mut user: User) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if !users.contains_key(&user.id) {
            return Err(StoreError::NotFound);
        }
        if let Some(field) = conflict(&users, user.id, &user.username, &user.email) {
            return Err(StoreError::AlreadyExists(field));
        }

        user.updated_at = Utc::now();
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn delete(&self, id: u64) -> StoreResult<()> {
        self.users
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn list(&self, page: u32, page_size: u32) -> StoreResult<(Vec<User>, u64)> {
        let users = self.users.read().await;
        let offset = (page.max(1) as usize - 1).saturating_mul(page_size as usize);
        let items = users
            .values()
            .skip(offset)
            .take(page_size as usize)
            .cloned()
            .collect();
        Ok((items, users.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.to_string(),
            email: format!("{}@example.com", name),
            password_hash: "hash".to_string(),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryUserStore::new();
        let alice = store.create(new_user("alice")).await.unwrap();
        let bob = store.create(new_user("bob")).await.unwrap();

        assert_eq!(alice.id, 1);
        assert_eq!(bob.id, 2);
        assert_eq!(store.get_by_id(1).await.unwrap().username, "alice");
        assert_eq!(
            store.get_by_email("BOB@example.com").await.unwrap().id,
            2
        );
        assert_eq!(store.get_by_id(99).await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let store = InMemoryUserStore::new();
        store.create(new_user("alice")).await.unwrap();

        let result = store.create(new_user("alice")).await;
        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));

        let mut same_name = new_user("alice");
        same_name.email = "other@example.com".to_string();
        assert!(matches!(
            store.create(same_name).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = InMemoryUserStore::new();
        let mut alice = store.create(new_user("alice")).await.unwrap();
        store.create(new_user("bob")).await.unwrap();

        alice.email = "alice@new.example.com".to_string();
        let updated = store.update(alice.clone()).await.unwrap();
        assert_eq!(updated.email, "alice@new.example.com");
        assert!(updated.updated_at >= updated.created_at);

        alice.email = "bob@example.com".to_string();
        assert!(matches!(
            store.update(alice).await,
            Err(StoreError::AlreadyExists(_))
        ));

        store.delete(1).await.unwrap();
        assert_eq!(store.delete(1).await, Err(StoreError::NotFound));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_list_pages() {
        let store = InMemoryUserStore::new();
        for i in 0..5 {
            store.create(new_user(&format!("user{}", i))).await.unwrap();
        }

        let (first, total) = store.list(1, 2).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(first.iter().map(|u| u.id).collect::<Vec<_>>(), vec![1, 2]);

        let (last, _) = store.list(3, 2).await.unwrap();
        assert_eq!(last.len(), 1);

        let (beyond, _) = store.list(10, 2).await.unwrap();
        assert!(beyond.is_empty());
    }
}
