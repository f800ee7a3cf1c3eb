pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod storage;
pub mod telemetry;

pub use application::{AccountService, LedgerError};
pub use domain::*;
pub use storage::{MemoryUserStore, SqliteUserStore, UserStore};
