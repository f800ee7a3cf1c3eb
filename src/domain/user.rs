use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifiers are issued by the store in increasing order.
pub type UserId = i64;

/// Balances are whole units; neither balance can go below zero.
pub type Units = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(skip_serializing)]
    pub credential_digest: String,
    pub solid_balance: Units,
    pub stock_balance: Units,
    pub is_blocked: bool,
    pub last_farming_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Bumped by the store on every committed update.
    #[serde(skip)]
    pub version: u64,
}

impl User {
    /// A fresh, not yet persisted account. The store assigns `id`.
    pub fn new(name: String, credential_digest: String, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            name,
            credential_digest,
            solid_balance: 0,
            stock_balance: 0,
            is_blocked: false,
            last_farming_at: now,
            created_at: now,
            version: 0,
        }
    }

    pub fn with_solid_balance(mut self, balance: Units) -> Self {
        self.solid_balance = balance;
        self
    }

    pub fn is_active(&self) -> bool {
        !self.is_blocked
    }
}
