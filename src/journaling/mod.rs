pub mod autosave;

pub use autosave::{AutoSaveEvent, AutoSaveScheduler, AutoSaveStatus};
