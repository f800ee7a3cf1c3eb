use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{User, UserId};

mod memory;
mod repository;

pub use memory::*;
pub use repository::*;

/// SQL migration for the users table
pub const MIGRATION_001_USERS: &str = include_str!("migrations/001_users.sql");

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("User not found: {0}")]
    NotFound(String),

    #[error("Name already taken: {0}")]
    DuplicateName(String),

    #[error("User {id} changed concurrently (expected version {expected})")]
    VersionConflict { id: UserId, expected: u64 },

    #[error("Storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Keyed persistence of user records.
///
/// `compare_and_update` only commits when the stored version still equals
/// `expected_version`; the returned user carries the bumped version.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_id(&self, id: UserId) -> Result<User, StoreError>;

    async fn get_by_name(&self, name: &str) -> Result<User, StoreError>;

    async fn create(&self, user: &User) -> Result<User, StoreError>;

    async fn compare_and_update(
        &self,
        id: UserId,
        expected_version: u64,
        new_state: &User,
    ) -> Result<User, StoreError>;
}
