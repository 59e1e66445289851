//! Subscription accounting: per-user recurring charges at month granularity,
//! with CRUD, filtered listing and period cost aggregation over SQLite or
//! PostgreSQL.

pub mod accounting;
pub mod clock;
pub mod config;
mod db;
pub mod error;
pub mod server;
pub mod storage;
pub mod subscription;
