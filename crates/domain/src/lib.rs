pub mod detail;
pub mod engagement;
pub mod error;
pub mod idempotency;
pub mod identity;
pub mod karma;
pub mod leaderboard;
pub mod ports;
pub mod threads;
pub mod tree;
pub mod util;

pub type DomainResult<T> = Result<T, error::DomainError>;
