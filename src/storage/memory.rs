use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{User, UserId};

use super::{StoreError, UserStore};

/// In-process user store with the same semantics as the SQLite one.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    users: BTreeMap<UserId, User>,
    last_id: UserId,
}

impl Inner {
    fn name_taken_by_other(&self, name: &str, id: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| u.name == name && Some(u.id) != id)
    }
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_by_id(&self, id: UserId) -> Result<User, StoreError> {
        self.inner
            .read()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn get_by_name(&self, name: &str) -> Result<User, StoreError> {
        self.inner
            .read()
            .await
            .users
            .values()
            .find(|u| u.name == name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn create(&self, user: &User) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.name_taken_by_other(&user.name, None) {
            return Err(StoreError::DuplicateName(user.name.clone()));
        }

        inner.last_id += 1;
        let created = User {
            id: inner.last_id,
            version: 0,
            ..user.clone()
        };
        inner.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn compare_and_update(
        &self,
        id: UserId,
        expected_version: u64,
        new_state: &User,
    ) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        let current_version = inner
            .users
            .get(&id)
            .map(|u| u.version)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if current_version != expected_version {
            return Err(StoreError::VersionConflict {
                id,
                expected: expected_version,
            });
        }
        if inner.name_taken_by_other(&new_state.name, Some(id)) {
            return Err(StoreError::DuplicateName(new_state.name.clone()));
        }

        let updated = User {
            id,
            version: expected_version + 1,
            ..new_state.clone()
        };
        inner.users.insert(id, updated.clone());
        Ok(updated)
    }
}
