mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;
use common::{funded_user, memory_service, service_over, test_service, PASSWORD, UNIT_PRICE};
use stocksback::application::{AccountService, ErrorKind, LedgerError, LedgerRules};
use stocksback::domain::{User, UserId};
use stocksback::storage::{MemoryUserStore, StoreError, UserStore};

async fn concurrent_farms(
    service: Arc<AccountService>,
    id: UserId,
    k: usize,
) -> Vec<Result<u64, LedgerError>> {
    let handles: Vec<_> = (0..k)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.farm(id).await.map(|r| r.amount) })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.expect("farm task panicked"));
    }
    results
}

async fn concurrent_buys(
    service: Arc<AccountService>,
    id: UserId,
    k: usize,
) -> Vec<Result<User, LedgerError>> {
    let handles: Vec<_> = (0..k)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.buy_stocks(id, 1).await })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.expect("buy task panicked"));
    }
    results
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_farms_credit_once() -> Result<()> {
    let (service, clock, _temp) = test_service().await?;
    let alice = service.sign_up("alice", PASSWORD).await?;
    clock.advance(Duration::minutes(30));

    let service = Arc::new(service);
    let results = concurrent_farms(service.clone(), alice.id, 16).await;

    let credited: Vec<u64> = results
        .iter()
        .filter_map(|r| r.as_ref().ok().copied())
        .collect();
    assert_eq!(credited.len(), 1, "exactly one farm may use the stale timestamp");
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| matches!(r, Err(LedgerError::FarmingTooSoon { .. }))));

    let stored = service.get(alice.id).await?;
    assert_eq!(stored.solid_balance, credited[0]);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_buys_never_underflow() -> Result<()> {
    let (service, clock, _temp) = test_service().await?;
    // 60 minutes at 10/min = 600 solid = 24 stocks
    let alice = funded_user(&service, &clock, "alice", 60).await?;
    let affordable = alice.solid_balance / UNIT_PRICE;

    let service = Arc::new(service);
    let results = concurrent_buys(service.clone(), alice.id, 30).await;

    let succeeded = results.iter().filter(|r| r.is_ok()).count() as u64;
    assert_eq!(succeeded, affordable);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| matches!(r, Err(LedgerError::InsufficientBalance { .. }))));

    let stored = service.get(alice.id).await?;
    assert_eq!(stored.stock_balance, affordable);
    assert_eq!(stored.solid_balance, alice.solid_balance - affordable * UNIT_PRICE);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_operations_serialize_in_memory() -> Result<()> {
    let (service, clock) = memory_service();
    let alice = funded_user(&service, &clock, "alice", 20).await?;
    clock.advance(Duration::minutes(20));

    let service = Arc::new(service);
    let farms = tokio::spawn(concurrent_farms(service.clone(), alice.id, 8));
    let buys = tokio::spawn(concurrent_buys(service.clone(), alice.id, 8));

    let farmed: u64 = farms.await?.into_iter().filter_map(|r| r.ok()).sum();
    let bought = buys.await?.into_iter().filter(|r| r.is_ok()).count() as u64;

    // Whatever order won, nothing was lost
    let stored = service.get(alice.id).await?;
    assert_eq!(stored.stock_balance, bought);
    assert_eq!(
        stored.solid_balance,
        alice.solid_balance + farmed - bought * UNIT_PRICE
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_different_users_progress_independently() -> Result<()> {
    let (service, clock) = memory_service();
    let mut ids = Vec::new();
    for i in 0..8 {
        ids.push(service.sign_up(&format!("user{}", i), PASSWORD).await?.id);
    }
    clock.advance(Duration::minutes(5));

    let service = Arc::new(service);
    let handles: Vec<_> = ids
        .iter()
        .map(|&id| {
            let service = service.clone();
            tokio::spawn(async move { service.farm(id).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await??.amount, 50);
    }

    Ok(())
}

/// Store wrapper that reports version conflicts a set number of times.
struct ConflictingStore {
    inner: MemoryUserStore,
    conflicts_left: AtomicU32,
}

impl ConflictingStore {
    fn new(conflicts: u32) -> Self {
        Self {
            inner: MemoryUserStore::new(),
            conflicts_left: AtomicU32::new(conflicts),
        }
    }
}

#[async_trait]
impl UserStore for ConflictingStore {
    async fn get_by_id(&self, id: UserId) -> Result<User, StoreError> {
        self.inner.get_by_id(id).await
    }

    async fn get_by_name(&self, name: &str) -> Result<User, StoreError> {
        self.inner.get_by_name(name).await
    }

    async fn create(&self, user: &User) -> Result<User, StoreError> {
        self.inner.create(user).await
    }

    async fn compare_and_update(
        &self,
        id: UserId,
        expected_version: u64,
        new_state: &User,
    ) -> Result<User, StoreError> {
        let injected = self
            .conflicts_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::VersionConflict {
                id,
                expected: expected_version,
            });
        }
        self.inner
            .compare_and_update(id, expected_version, new_state)
            .await
    }
}

#[tokio::test]
async fn test_version_conflicts_are_retried() -> Result<()> {
    let store = Arc::new(ConflictingStore::new(0));
    let (service, clock) = service_over(store.clone());
    let alice = service.sign_up("alice", PASSWORD).await?;
    clock.advance(Duration::minutes(3));

    store.conflicts_left.store(2, Ordering::SeqCst);
    let result = service.farm(alice.id).await?;
    assert_eq!(result.amount, 30);
    assert_eq!(result.user.solid_balance, 30);

    Ok(())
}

#[tokio::test]
async fn test_exhausted_retries_surface_as_storage_failure() -> Result<()> {
    let store = Arc::new(ConflictingStore::new(0));
    let (service, clock) = service_over(store.clone());
    let alice = service.sign_up("alice", PASSWORD).await?;
    clock.advance(Duration::minutes(3));

    store.conflicts_left.store(u32::MAX, Ordering::SeqCst);
    let err = service.farm(alice.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageFailure);
    assert!(err.is_server_error());

    store.conflicts_left.store(0, Ordering::SeqCst);
    let stored = service.get(alice.id).await?;
    assert_eq!(stored.solid_balance, 0);
    assert_eq!(stored.last_farming_at, alice.last_farming_at);

    Ok(())
}

/// Store whose writes take longer than any sensible deadline.
struct SlowStore {
    inner: MemoryUserStore,
    delay: StdDuration,
}

#[async_trait]
impl UserStore for SlowStore {
    async fn get_by_id(&self, id: UserId) -> Result<User, StoreError> {
        self.inner.get_by_id(id).await
    }

    async fn get_by_name(&self, name: &str) -> Result<User, StoreError> {
        self.inner.get_by_name(name).await
    }

    async fn create(&self, user: &User) -> Result<User, StoreError> {
        self.inner.create(user).await
    }

    async fn compare_and_update(
        &self,
        id: UserId,
        expected_version: u64,
        new_state: &User,
    ) -> Result<User, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner
            .compare_and_update(id, expected_version, new_state)
            .await
    }
}

#[tokio::test]
async fn test_deadline_leaves_no_partial_state() -> Result<()> {
    let store = Arc::new(SlowStore {
        inner: MemoryUserStore::new(),
        delay: StdDuration::from_millis(500),
    });
    let rules =
        LedgerRules::new(common::SALT).with_operation_timeout(StdDuration::from_millis(50));
    let service = AccountService::new(store.clone(), rules);

    let alice = service.sign_up("alice", PASSWORD).await?;
    let err = service.block(alice.id).await.unwrap_err();
    assert!(matches!(err, LedgerError::DeadlineExceeded(_)));
    assert!(err.is_server_error());

    let stored = service.get(alice.id).await?;
    assert!(!stored.is_blocked);
    assert_eq!(stored.version, alice.version);

    Ok(())
}
