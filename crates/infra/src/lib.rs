pub mod config;
pub mod db;
pub mod idempotency;
pub mod logging;
pub mod repositories;
