use std::time::Instant;

use anyhow::{Context, Result};

use crate::config::AutoSaveConfig;
use crate::feed::{migrate, Environment, Feed, Item, MigrationSource, SystemEnvironment};
use crate::journaling::{AutoSaveEvent, AutoSaveScheduler, AutoSaveStatus};
use crate::storage::KeyValueStore;

/// Owns the feed, the storage it persists to and the autosave timer.
///
/// Front ends hold one of these and route every user action through it.
/// Body edits are debounced; every other mutation is written immediately,
/// taking any pending body edit along with it.
pub struct Workspace<S, E = SystemEnvironment>
where
    S: KeyValueStore,
    E: Environment,
{
    storage: S,
    env: E,
    feed: Feed,
    autosave: AutoSaveScheduler,
    flush_on_exit: bool,
    migration_source: MigrationSource,
    closed: bool,
}

impl<S: KeyValueStore> Workspace<S, SystemEnvironment> {
    pub fn open_default(storage: S, config: &AutoSaveConfig) -> Result<Self> {
        Self::open(storage, SystemEnvironment, config)
    }
}

impl<S, E> Workspace<S, E>
where
    S: KeyValueStore,
    E: Environment,
{
    /// Runs the migration chain and guarantees at least one item.
    pub fn open(storage: S, env: E, config: &AutoSaveConfig) -> Result<Self> {
        let migration = migrate::run(&storage, &env).context("loading feed")?;
        let mut workspace = Self {
            storage,
            env,
            feed: migration.feed,
            autosave: AutoSaveScheduler::new(config),
            flush_on_exit: config.flush_on_exit,
            migration_source: migration.source,
            closed: false,
        };
        if workspace.feed.is_empty() {
            tracing::info!("feed is empty, starting a fresh item");
            let (feed, _) = workspace.feed.create(&workspace.env, None);
            workspace.feed = feed;
            workspace.persist();
        } else if !migration.persisted {
            workspace.persist();
        }
        Ok(workspace)
    }

    pub fn snapshot(&self) -> &Feed {
        &self.feed
    }

    pub fn active(&self) -> Option<&Item> {
        self.feed.active()
    }

    pub fn resolve_title(&self, item: &Item) -> String {
        self.feed.resolve_title(item)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn migration_source(&self) -> MigrationSource {
        self.migration_source
    }

    pub fn save_status(&self) -> AutoSaveStatus {
        self.autosave.status()
    }

    /// User-facing warning while the last write failed.
    pub fn save_warning(&self) -> Option<String> {
        match self.autosave.status() {
            AutoSaveStatus::Error { message, .. } => {
                Some(format!("Changes may not be saved: {message}"))
            }
            _ => None,
        }
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.autosave.has_pending()
    }

    pub fn create(&mut self, title_hint: Option<&str>) -> Item {
        let (feed, item) = self.feed.create(&self.env, title_hint);
        self.feed = feed;
        self.persist();
        item
    }

    pub fn select(&mut self, id: &str) {
        if self.feed.active_id() == Some(id) {
            return;
        }
        if !self.feed.contains(id) {
            tracing::debug!(id, "ignoring selection of unknown item");
            return;
        }
        self.feed = self.feed.select(id);
        self.persist();
    }

    pub fn update_body(&mut self, id: &str, body: &str) {
        self.update_body_at(id, body, Instant::now());
    }

    /// As [`Workspace::update_body`] with an explicit edit time for the debounce window.
    pub fn update_body_at(&mut self, id: &str, body: &str, now: Instant) {
        if !self.feed.contains(id) {
            tracing::debug!(id, "ignoring edit of unknown item");
            return;
        }
        self.feed = self.feed.update_body(&self.env, id, body);
        if self.autosave.is_enabled() {
            self.autosave.record_edit_at(now);
        } else {
            self.persist();
        }
    }

    pub fn rename(&mut self, id: &str, title: &str) {
        if !self.feed.contains(id) || title.trim().is_empty() {
            tracing::debug!(id, "ignoring rename");
            return;
        }
        self.feed = self.feed.rename(&self.env, id, title.trim());
        self.persist();
    }

    pub fn delete(&mut self, id: &str) {
        if !self.feed.contains(id) {
            tracing::debug!(id, "ignoring delete of unknown item");
            return;
        }
        self.feed = self.feed.delete(&self.env, id);
        self.persist();
    }

    /// Drives the debounce timer; call from the UI loop.
    pub fn tick(&mut self) -> Option<AutoSaveEvent> {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> Option<AutoSaveEvent> {
        self.autosave.poll_at(now, &self.feed, &self.storage)
    }

    /// Writes a pending body edit right away.
    pub fn flush(&mut self) -> Option<AutoSaveEvent> {
        self.autosave.flush_now(&self.feed, &self.storage)
    }

    /// Ends the session, flushing pending edits unless configured otherwise.
    pub fn close(mut self) -> Option<AutoSaveEvent> {
        self.end_session()
    }

    /// As [`Workspace::close`] for owners that cannot give the workspace up.
    pub fn end_session(&mut self) -> Option<AutoSaveEvent> {
        self.closed = true;
        if self.flush_on_exit {
            self.flush()
        } else {
            self.autosave.cancel();
            None
        }
    }

    fn persist(&mut self) -> AutoSaveEvent {
        self.autosave.persist_now(&self.feed, &self.storage)
    }
}

impl<S, E> Drop for Workspace<S, E>
where
    S: KeyValueStore,
    E: Environment,
{
    fn drop(&mut self) {
        if self.closed || !self.autosave.has_pending() {
            return;
        }
        if let Some(AutoSaveEvent::Error { message }) = self.end_session() {
            tracing::error!(%message, "pending edits lost while closing workspace");
        }
    }
}
