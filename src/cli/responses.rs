use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::application::{FarmResult, LedgerError};
use crate::domain::{Units, User, UserId};

/// Public view of a user. Never carries the credential digest.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseUser {
    pub id: UserId,
    pub name: String,
    pub solid_balance: Units,
    pub stock_balance: Units,
    pub is_blocked: bool,
    pub last_farming: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for ResponseUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            solid_balance: user.solid_balance,
            stock_balance: user.stock_balance,
            is_blocked: user.is_blocked,
            last_farming: user.last_farming_at,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: ResponseUser,
}

#[derive(Debug, Serialize)]
pub struct FarmResponse {
    pub user: ResponseUser,
    pub amount: Units,
}

#[derive(Debug, Serialize)]
pub struct InitResponse {
    pub database: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error_name: String,
    pub error: String,
}

pub const FORBIDDEN: &str = "Forbidden";
const OPAQUE_SERVER_MESSAGE: &str = "internal server error";

impl ErrorResponse {
    /// Server faults keep their kind but hide their cause.
    pub fn from_ledger(err: &LedgerError) -> Self {
        let error = if err.is_server_error() {
            OPAQUE_SERVER_MESSAGE.to_string()
        } else {
            err.to_string()
        };
        Self {
            error_name: err.kind().to_string(),
            error,
        }
    }

    pub fn forbidden() -> Self {
        Self {
            error_name: FORBIDDEN.to_string(),
            error: "missing or invalid administrative key".to_string(),
        }
    }
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self { user: user.into() }
    }
}

impl From<&FarmResult> for FarmResponse {
    fn from(result: &FarmResult) -> Self {
        Self {
            user: (&result.user).into(),
            amount: result.amount,
        }
    }
}
