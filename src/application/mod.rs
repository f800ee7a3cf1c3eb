// Application layer - the account ledger and its error model

pub mod error;
mod locks;
mod rules;
mod service;

pub use error::*;
pub use locks::*;
pub use rules::*;
pub use service::*;
