pub mod database;
mod database_subscriptions;
pub mod postgres_store;
mod postgres_subscriptions;
pub mod query;
pub mod time;

pub use database::DatabaseStore;
pub use postgres_store::PgStore;
