pub mod codec;
pub mod env;
pub mod item;
pub mod migrate;
pub mod store;
pub mod text;

pub use env::{Environment, SystemEnvironment};
pub use item::{Item, ItemKind};
pub use migrate::{Migration, MigrationSource};
pub use store::Feed;
pub use text::{resolve_title, DEFAULT_TITLE};
