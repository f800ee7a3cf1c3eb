use std::time::Duration;

use crate::domain::FarmingRules;

pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_UPDATE_ATTEMPTS: u32 = 5;

/// Everything the service needs to know that is not user state.
#[derive(Debug, Clone)]
pub struct LedgerRules {
    /// Process-wide password salt.
    pub salt: String,
    pub farming: FarmingRules,
    pub operation_timeout: Duration,
    /// Attempts per operation before a version conflict becomes a failure.
    pub max_update_attempts: u32,
}

impl LedgerRules {
    pub fn new(salt: impl Into<String>) -> Self {
        Self {
            salt: salt.into(),
            farming: FarmingRules::default(),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            max_update_attempts: DEFAULT_MAX_UPDATE_ATTEMPTS,
        }
    }

    pub fn with_farming(mut self, farming: FarmingRules) -> Self {
        self.farming = farming;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_max_update_attempts(mut self, attempts: u32) -> Self {
        self.max_update_attempts = attempts.max(1);
        self
    }
}
