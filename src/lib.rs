pub mod app;
pub mod cli;
pub mod config;
pub mod feed;
pub mod journaling;
pub mod preferences;
pub mod storage;
pub mod ui;
pub mod workspace;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use feed::{Feed, Item};
pub use storage::{KeyValueStore, MemoryStorage, SqliteStorage};
pub use workspace::Workspace;
