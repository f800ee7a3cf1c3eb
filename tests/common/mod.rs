// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use stocksback::application::AccountService;
use stocksback::config::AppConfig;
use stocksback::domain::{ManualClock, User};
use stocksback::storage::{MemoryUserStore, UserStore};
use tempfile::TempDir;

pub const SALT: &str = "test-salt";
pub const PASSWORD: &str = "hunter22";
pub const ADMIN_KEY: &str = "admin-key";

/// Units credited per minute of farming in tests.
pub const UNITS_PER_MINUTE: u64 = 10;
/// Solid price of one stock in tests.
pub const UNIT_PRICE: u64 = 25;
pub const MIN_INTERVAL_SECS: i64 = 60;
pub const MAX_CREDIT_SECS: i64 = 3600;

/// Test configuration pointing at a database inside `dir`.
pub fn test_config(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.path = dir.path().join("test.db").display().to_string();
    config.farming.min_interval_secs = MIN_INTERVAL_SECS as u64;
    config.farming.max_credit_secs = MAX_CREDIT_SECS as u64;
    config.farming.units_per_minute = UNITS_PER_MINUTE;
    config.stocks.unit_price = UNIT_PRICE;
    config.security.salt = SALT.to_string();
    config.security.admin_key = ADMIN_KEY.to_string();
    config
}

/// Fixed start of time for tests.
pub fn start_time() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(2024, 1, 15)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        .and_utc()
}

/// Helper to create a test service with a temporary database and a manual clock
pub async fn test_service() -> Result<(AccountService, Arc<ManualClock>, TempDir)> {
    let temp_dir = TempDir::new()?;
    let config = test_config(&temp_dir);
    let clock = Arc::new(ManualClock::new(start_time()));
    let service = AccountService::init(&config).await?.with_clock(clock.clone());
    Ok((service, clock, temp_dir))
}

/// Same rules as `test_service`, over any store.
pub fn service_over(store: Arc<dyn UserStore>) -> (AccountService, Arc<ManualClock>) {
    let config = {
        let mut config = AppConfig::default();
        config.farming.min_interval_secs = MIN_INTERVAL_SECS as u64;
        config.farming.max_credit_secs = MAX_CREDIT_SECS as u64;
        config.farming.units_per_minute = UNITS_PER_MINUTE;
        config.stocks.unit_price = UNIT_PRICE;
        config.security.salt = SALT.to_string();
        config
    };
    let clock = Arc::new(ManualClock::new(start_time()));
    let service = AccountService::from_config(store, &config).with_clock(clock.clone());
    (service, clock)
}

/// Service over a fresh in-memory store.
pub fn memory_service() -> (AccountService, Arc<ManualClock>) {
    service_over(Arc::new(MemoryUserStore::new()))
}

/// Sign up a user and give them `minutes` of farming yield.
pub async fn funded_user(
    service: &AccountService,
    clock: &ManualClock,
    name: &str,
    minutes: i64,
) -> Result<User> {
    let user = service.sign_up(name, PASSWORD).await?;
    clock.advance(Duration::minutes(minutes));
    Ok(service.farm(user.id).await?.user)
}
