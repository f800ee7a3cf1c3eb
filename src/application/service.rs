use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::domain::{
    validate_name, validate_password, Clock, CredentialHasher, FarmOutcome, FixedUnitPrice,
    LinearYield, PricePolicy, Sha256Hasher, SystemClock, Units, User, UserId, ValidationError,
    YieldPolicy,
};
use crate::storage::{SqliteUserStore, StoreError, UserStore};

use super::{LedgerError, LedgerRules, UserLocks};

/// Default yield when no policy is configured: one unit per minute.
pub const DEFAULT_UNITS_PER_MINUTE: Units = 1;
/// Default solid price of one stock unit.
pub const DEFAULT_UNIT_PRICE: Units = 10;

/// The account ledger: every balance or flag change goes through here.
/// Mutations for one user are serialised; different users never wait on
/// each other.
pub struct AccountService {
    store: Arc<dyn UserStore>,
    rules: LedgerRules,
    clock: Arc<dyn Clock>,
    hasher: Arc<dyn CredentialHasher>,
    yield_policy: Arc<dyn YieldPolicy>,
    price_policy: Arc<dyn PricePolicy>,
    locks: UserLocks,
}

/// Result of a successful farm
#[derive(Debug, Clone)]
pub struct FarmResult {
    pub amount: Units,
    pub user: User,
}

/// What an operation decided to do with the current user state.
enum Transition<T> {
    Commit(User, T),
    Unchanged(T),
}

impl AccountService {
    /// Create a service over the given store with default policies.
    pub fn new(store: Arc<dyn UserStore>, rules: LedgerRules) -> Self {
        Self {
            store,
            rules,
            clock: Arc::new(SystemClock),
            hasher: Arc::new(Sha256Hasher),
            yield_policy: Arc::new(LinearYield::new(DEFAULT_UNITS_PER_MINUTE)),
            price_policy: Arc::new(FixedUnitPrice::new(DEFAULT_UNIT_PRICE)),
            locks: UserLocks::new(),
        }
    }

    /// Build a service from loaded configuration over an already migrated store.
    pub fn from_config(store: Arc<dyn UserStore>, config: &AppConfig) -> Self {
        Self::new(store, config.ledger_rules())
            .with_yield_policy(Arc::new(config.yield_policy()))
            .with_price_policy(Arc::new(config.price_policy()))
    }

    /// Create the database if needed, migrate it and build the service.
    pub async fn init(config: &AppConfig) -> Result<Self, LedgerError> {
        let store = SqliteUserStore::init(&config.database_url(true)).await?;
        Ok(Self::from_config(Arc::new(store), config))
    }

    /// Connect to an existing database.
    pub async fn connect(config: &AppConfig) -> Result<Self, LedgerError> {
        let store = SqliteUserStore::connect(&config.database_url(false)).await?;
        Ok(Self::from_config(Arc::new(store), config))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn CredentialHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_yield_policy(mut self, policy: Arc<dyn YieldPolicy>) -> Self {
        self.yield_policy = policy;
        self
    }

    pub fn with_price_policy(mut self, policy: Arc<dyn PricePolicy>) -> Self {
        self.price_policy = policy;
        self
    }

    // ========================
    // Credentials
    // ========================

    /// Register a new user with empty balances.
    pub async fn sign_up(&self, name: &str, password: &str) -> Result<User, LedgerError> {
        self.bounded(async {
            let name = validate_name(name)?;
            validate_password(password)?;

            match self.store.get_by_name(&name).await {
                Ok(_) => return Err(LedgerError::DuplicateName(name)),
                Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }

            let digest = self.hasher.hash(password, &self.rules.salt);
            // The unique constraint settles a race between two sign-ups.
            let user = self
                .store
                .create(&User::new(name, digest, self.clock.now()))
                .await?;

            info!(user_id = user.id, name = %user.name, "signed up");
            Ok(user)
        })
        .await
    }

    /// Verify a name/password pair. Does not touch balances.
    pub async fn sign_in(&self, name: &str, password: &str) -> Result<User, LedgerError> {
        self.bounded(async {
            let name = name.trim();
            let user = match self.store.get_by_name(name).await {
                Ok(user) => user,
                Err(StoreError::NotFound(_)) => {
                    // Hash anyway so unknown names cost the same as wrong passwords.
                    let _ = self.hasher.hash(password, &self.rules.salt);
                    return Err(LedgerError::NotFound(name.to_string()));
                }
                Err(e) => return Err(e.into()),
            };

            if !self
                .hasher
                .verify(password, &self.rules.salt, &user.credential_digest)
            {
                return Err(LedgerError::InvalidCredentials);
            }
            if user.is_blocked {
                return Err(LedgerError::Blocked(user.id));
            }
            Ok(user)
        })
        .await
    }

    // ========================
    // Balance operations
    // ========================

    /// Credit solid balance for the time elapsed since the last farm.
    pub async fn farm(&self, id: UserId) -> Result<FarmResult, LedgerError> {
        let (user, amount) = self
            .mutate(id, |user, now| {
                ensure_active(user)?;
                let credited = match self.rules.farming.evaluate(user.last_farming_at, now) {
                    FarmOutcome::TooSoon { next_allowed_at } => {
                        return Err(LedgerError::FarmingTooSoon { next_allowed_at });
                    }
                    FarmOutcome::Ready { credited } => credited,
                };

                let mut next = user.clone();
                next.solid_balance = user
                    .solid_balance
                    .saturating_add(self.yield_policy.yield_for(credited));
                next.last_farming_at = now;
                let amount = next.solid_balance - user.solid_balance;
                Ok(Transition::Commit(next, amount))
            })
            .await?;

        info!(
            user_id = user.id,
            amount,
            solid_balance = user.solid_balance,
            "farmed"
        );
        Ok(FarmResult { amount, user })
    }

    /// Exchange solid balance for `count` stock units at the configured price.
    pub async fn buy_stocks(&self, id: UserId, count: Units) -> Result<User, LedgerError> {
        if count == 0 {
            return Err(ValidationError::ZeroCount.into());
        }

        let (user, cost) = self
            .mutate(id, |user, _| {
                ensure_active(user)?;
                let cost = self.price_policy.cost_of(count).ok_or(
                    LedgerError::InsufficientBalance {
                        balance: user.solid_balance,
                        required: Units::MAX,
                    },
                )?;
                if user.solid_balance < cost {
                    return Err(LedgerError::InsufficientBalance {
                        balance: user.solid_balance,
                        required: cost,
                    });
                }
                let stock_balance = user.stock_balance.checked_add(count).ok_or_else(|| {
                    LedgerError::InvalidInput("stock balance would overflow".to_string())
                })?;

                let mut next = user.clone();
                next.solid_balance -= cost;
                next.stock_balance = stock_balance;
                Ok(Transition::Commit(next, cost))
            })
            .await?;

        info!(
            user_id = user.id,
            count,
            cost,
            solid_balance = user.solid_balance,
            stock_balance = user.stock_balance,
            "bought stocks"
        );
        Ok(user)
    }

    // ========================
    // Profile operations
    // ========================

    pub async fn update_name(&self, id: UserId, new_name: &str) -> Result<User, LedgerError> {
        let new_name = validate_name(new_name)?;

        let (user, previous) = self
            .mutate(id, |user, _| {
                ensure_active(user)?;
                if user.name == new_name {
                    return Ok(Transition::Unchanged(user.name.clone()));
                }
                let mut next = user.clone();
                next.name = new_name.clone();
                Ok(Transition::Commit(next, user.name.clone()))
            })
            .await?;

        info!(user_id = user.id, previous = %previous, name = %user.name, "renamed");
        Ok(user)
    }

    pub async fn update_password(
        &self,
        id: UserId,
        new_password: &str,
    ) -> Result<User, LedgerError> {
        validate_password(new_password)?;
        let digest = self.hasher.hash(new_password, &self.rules.salt);

        let (user, ()) = self
            .mutate(id, |user, _| {
                ensure_active(user)?;
                let mut next = user.clone();
                next.credential_digest = digest.clone();
                Ok(Transition::Commit(next, ()))
            })
            .await?;

        info!(user_id = user.id, "password changed");
        Ok(user)
    }

    // ========================
    // Administration
    // ========================

    /// Freeze a user. Blocking a blocked user is a no-op.
    /// The caller is responsible for checking administrative rights.
    pub async fn block(&self, id: UserId) -> Result<User, LedgerError> {
        self.set_blocked(id, true).await
    }

    /// Lift a block. Unblocking an active user is a no-op.
    pub async fn unblock(&self, id: UserId) -> Result<User, LedgerError> {
        self.set_blocked(id, false).await
    }

    async fn set_blocked(&self, id: UserId, blocked: bool) -> Result<User, LedgerError> {
        let (user, changed) = self
            .mutate(id, |user, _| {
                if user.is_blocked == blocked {
                    return Ok(Transition::Unchanged(false));
                }
                let mut next = user.clone();
                next.is_blocked = blocked;
                Ok(Transition::Commit(next, true))
            })
            .await?;

        if changed {
            info!(user_id = user.id, blocked, "block state changed");
        } else {
            debug!(user_id = user.id, blocked, "block state already set");
        }
        Ok(user)
    }

    // ========================
    // Lookup
    // ========================

    pub async fn get(&self, id: UserId) -> Result<User, LedgerError> {
        self.bounded(async { Ok(self.store.get_by_id(id).await?) })
            .await
    }

    pub async fn get_by_name(&self, name: &str) -> Result<User, LedgerError> {
        self.bounded(async { Ok(self.store.get_by_name(name.trim()).await?) })
            .await
    }

    // ========================
    // Internals
    // ========================

    /// Run `fut` under the operation timeout. Dropping the future before the
    /// store commits leaves no trace, so expiry is all-or-nothing.
    async fn bounded<T, F>(&self, fut: F) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, LedgerError>>,
    {
        let timeout = self.rules.operation_timeout;
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| LedgerError::DeadlineExceeded(timeout))?
    }

    /// Atomic read-modify-write of one user.
    ///
    /// `op` sees a fresh copy of the user and the current time and must be a
    /// pure function of them. The result is committed with compare-and-swap
    /// and re-evaluated on a version conflict.
    async fn mutate<T, F>(&self, id: UserId, op: F) -> Result<(User, T), LedgerError>
    where
        F: Fn(&User, DateTime<Utc>) -> Result<Transition<T>, LedgerError>,
    {
        self.bounded(async {
            let _guard = self.locks.acquire(id).await;
            let attempts = self.rules.max_update_attempts.max(1);

            for attempt in 1..=attempts {
                let current = self.store.get_by_id(id).await?;
                let now = self.clock.now();

                let (next, output) = match op(&current, now)? {
                    Transition::Unchanged(output) => return Ok((current, output)),
                    Transition::Commit(next, output) => (next, output),
                };

                match self
                    .store
                    .compare_and_update(id, current.version, &next)
                    .await
                {
                    Ok(saved) => return Ok((saved, output)),
                    Err(StoreError::VersionConflict { .. }) => {
                        debug!(user_id = id, attempt, "version conflict, retrying");
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            Err(LedgerError::StorageFailure(anyhow!(
                "user {} kept changing concurrently after {} attempts",
                id,
                attempts
            )))
        })
        .await
    }
}

fn ensure_active(user: &User) -> Result<(), LedgerError> {
    if user.is_blocked {
        return Err(LedgerError::Blocked(user.id));
    }
    Ok(())
}
