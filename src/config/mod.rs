pub mod settings;

pub use settings::{AccountingConfig, LoggingConfig, ServerConfig, Settings, StorageConfig};
