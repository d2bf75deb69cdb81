use std::time::{Duration, Instant};

use time::OffsetDateTime;

use crate::config::AutoSaveConfig;
use crate::feed::{codec, Feed};
use crate::storage::{KeyValueStore, FEED_KEY};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoSaveStatus {
    Disabled,
    Idle {
        last_saved_at: Option<OffsetDateTime>,
    },
    Pending {
        since: OffsetDateTime,
    },
    Error {
        message: String,
        occurred_at: OffsetDateTime,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoSaveEvent {
    Saved { timestamp: OffsetDateTime },
    Error { message: String },
}

/// Debounces feed writes.
///
/// The scheduler only tracks timing. The feed is handed in when a write
/// fires, so whatever is written is the newest state rather than the state at
/// the time of the first edit. Each edit pushes the deadline back by the full
/// debounce window.
#[derive(Debug)]
pub struct AutoSaveScheduler {
    enabled: bool,
    debounce: Duration,
    pending: Option<Pending>,
    last_saved_at: Option<OffsetDateTime>,
    last_error: Option<AutoSaveFailure>,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    last_edit: Instant,
    since_wall: OffsetDateTime,
}

#[derive(Debug, Clone)]
struct AutoSaveFailure {
    message: String,
    occurred_at: OffsetDateTime,
}

impl AutoSaveScheduler {
    pub fn new(config: &AutoSaveConfig) -> Self {
        Self {
            enabled: config.enabled,
            debounce: config.debounce_duration(),
            pending: None,
            last_saved_at: None,
            last_error: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// When the pending write becomes due, if there is one.
    pub fn due_at(&self) -> Option<Instant> {
        self.pending.map(|pending| pending.last_edit + self.debounce)
    }

    pub fn status(&self) -> AutoSaveStatus {
        if let Some(failure) = &self.last_error {
            return AutoSaveStatus::Error {
                message: failure.message.clone(),
                occurred_at: failure.occurred_at,
            };
        }
        if let Some(pending) = &self.pending {
            return AutoSaveStatus::Pending {
                since: pending.since_wall,
            };
        }
        if !self.enabled {
            return AutoSaveStatus::Disabled;
        }
        AutoSaveStatus::Idle {
            last_saved_at: self.last_saved_at,
        }
    }

    pub fn record_edit(&mut self) {
        self.record_edit_at(Instant::now());
    }

    /// Restarts the debounce window at `now`.
    pub fn record_edit_at(&mut self, now: Instant) {
        let since_wall = self
            .pending
            .map(|pending| pending.since_wall)
            .unwrap_or_else(OffsetDateTime::now_utc);
        self.pending = Some(Pending {
            last_edit: now,
            since_wall,
        });
    }

    pub fn poll<S>(&mut self, feed: &Feed, storage: &S) -> Option<AutoSaveEvent>
    where
        S: KeyValueStore + ?Sized,
    {
        self.poll_at(Instant::now(), feed, storage)
    }

    /// Writes `feed` if a pending write has been quiet for the debounce window.
    pub fn poll_at<S>(&mut self, now: Instant, feed: &Feed, storage: &S) -> Option<AutoSaveEvent>
    where
        S: KeyValueStore + ?Sized,
    {
        let due = self.due_at()?;
        if now < due {
            return None;
        }
        Some(self.write(now, feed, storage))
    }

    /// Writes immediately if anything is pending.
    pub fn flush_now<S>(&mut self, feed: &Feed, storage: &S) -> Option<AutoSaveEvent>
    where
        S: KeyValueStore + ?Sized,
    {
        if self.pending.is_none() {
            return None;
        }
        Some(self.write(Instant::now(), feed, storage))
    }

    /// Writes unconditionally, absorbing any pending debounced write.
    pub fn persist_now<S>(&mut self, feed: &Feed, storage: &S) -> AutoSaveEvent
    where
        S: KeyValueStore + ?Sized,
    {
        self.write(Instant::now(), feed, storage)
    }

    /// Drops a pending write without performing it.
    pub fn cancel(&mut self) {
        if self.pending.take().is_some() {
            tracing::debug!("pending autosave cancelled");
        }
    }

    fn write<S>(&mut self, now: Instant, feed: &Feed, storage: &S) -> AutoSaveEvent
    where
        S: KeyValueStore + ?Sized,
    {
        let timestamp = OffsetDateTime::now_utc();
        let result = codec::serialize(feed).and_then(|text| storage.set(FEED_KEY, &text));
        match result {
            Ok(()) => {
                self.pending = None;
                self.last_saved_at = Some(timestamp);
                self.last_error = None;
                tracing::debug!(items = feed.len(), "feed saved");
                AutoSaveEvent::Saved { timestamp }
            }
            Err(err) => {
                let message = format!("{err:#}");
                tracing::warn!(%message, "feed save failed");
                // retry after another quiet window instead of on every tick
                let since_wall = self.pending.map_or(timestamp, |pending| pending.since_wall);
                self.pending = Some(Pending {
                    last_edit: now,
                    since_wall,
                });
                self.last_error = Some(AutoSaveFailure {
                    message: message.clone(),
                    occurred_at: timestamp,
                });
                AutoSaveEvent::Error { message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::env::testing::TestEnvironment;
    use crate::storage::MemoryStorage;
    use assert_matches::assert_matches;

    fn scheduler(debounce_ms: u64) -> AutoSaveScheduler {
        AutoSaveScheduler::new(&AutoSaveConfig {
            debounce_ms,
            enabled: true,
            flush_on_exit: true,
        })
    }

    fn stored_body(storage: &MemoryStorage, id: &str) -> Option<String> {
        let raw = storage.get(FEED_KEY).ok().flatten()?;
        codec::decode(&raw)?.get(id).map(|item| item.body.clone())
    }

    #[test]
    fn burst_of_edits_coalesces_into_one_write() {
        let env = TestEnvironment::at(0);
        let storage = MemoryStorage::new();
        let mut autosave = scheduler(300);
        let (mut feed, item) = Feed::new().create(&env, None);

        let start = Instant::now();
        let edits = [(0u64, "a"), (50, "ab"), (100, "abc")];
        let mut writes = Vec::new();
        for tick in (0..=800u64).step_by(10) {
            for (at, body) in edits {
                if at == tick {
                    feed = feed.update_body(&env, &item.id, body);
                    autosave.record_edit_at(start + Duration::from_millis(at));
                }
            }
            let now = start + Duration::from_millis(tick);
            if let Some(event) = autosave.poll_at(now, &feed, &storage) {
                writes.push((tick, event));
            }
        }

        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, 400);
        assert_matches!(writes[0].1, AutoSaveEvent::Saved { .. });
        assert_eq!(storage.write_count(), 1);
        assert_eq!(stored_body(&storage, &item.id).as_deref(), Some("abc"));
    }

    #[test]
    fn write_carries_latest_snapshot_at_fire_time() {
        let env = TestEnvironment::at(0);
        let storage = MemoryStorage::new();
        let mut autosave = scheduler(300);
        let (feed, item) = Feed::new().create(&env, None);
        let start = Instant::now();

        autosave.record_edit_at(start);
        let later = feed.update_body(&env, &item.id, "typed after the timer started");
        let event = autosave.poll_at(start + Duration::from_millis(300), &later, &storage);

        assert_matches!(event, Some(AutoSaveEvent::Saved { .. }));
        assert_eq!(
            stored_body(&storage, &item.id).as_deref(),
            Some("typed after the timer started")
        );
    }

    #[test]
    fn nothing_is_written_without_edits() {
        let storage = MemoryStorage::new();
        let mut autosave = scheduler(0);
        let feed = Feed::new();
        assert!(autosave.poll_at(Instant::now(), &feed, &storage).is_none());
        assert!(autosave.flush_now(&feed, &storage).is_none());
        assert_eq!(storage.write_count(), 0);
        assert_matches!(autosave.status(), AutoSaveStatus::Idle { last_saved_at: None });
    }

    #[test]
    fn flush_writes_pending_edit_before_deadline() {
        let storage = MemoryStorage::new();
        let mut autosave = scheduler(10_000);
        let feed = Feed::new();
        autosave.record_edit();
        assert_matches!(autosave.status(), AutoSaveStatus::Pending { .. });

        assert_matches!(
            autosave.flush_now(&feed, &storage),
            Some(AutoSaveEvent::Saved { .. })
        );
        assert!(!autosave.has_pending());
        assert_eq!(storage.write_count(), 1);
    }

    #[test]
    fn persist_now_absorbs_pending_edit() {
        let storage = MemoryStorage::new();
        let mut autosave = scheduler(300);
        let feed = Feed::new();
        let start = Instant::now();
        autosave.record_edit_at(start);

        assert_matches!(
            autosave.persist_now(&feed, &storage),
            AutoSaveEvent::Saved { .. }
        );
        assert!(autosave
            .poll_at(start + Duration::from_secs(5), &feed, &storage)
            .is_none());
        assert_eq!(storage.write_count(), 1);
    }

    #[test]
    fn cancel_drops_pending_write() {
        let storage = MemoryStorage::new();
        let mut autosave = scheduler(0);
        autosave.record_edit();
        autosave.cancel();
        assert!(autosave.poll(&Feed::new(), &storage).is_none());
        assert_eq!(storage.write_count(), 0);
    }

    #[test]
    fn failed_write_reports_error_and_retries_after_window() {
        let storage = MemoryStorage::new();
        storage.set_reject_writes(true);
        let mut autosave = scheduler(300);
        let feed = Feed::new();
        let start = Instant::now();
        autosave.record_edit_at(start);

        let first = autosave.poll_at(start + Duration::from_millis(300), &feed, &storage);
        assert_matches!(first, Some(AutoSaveEvent::Error { ref message }) if message.contains("quota"));
        assert_matches!(autosave.status(), AutoSaveStatus::Error { .. });
        assert!(autosave.has_pending());

        storage.set_reject_writes(false);
        assert!(autosave
            .poll_at(start + Duration::from_millis(400), &feed, &storage)
            .is_none());
        let retry = autosave.poll_at(start + Duration::from_millis(600), &feed, &storage);
        assert_matches!(retry, Some(AutoSaveEvent::Saved { .. }));
        assert_matches!(autosave.status(), AutoSaveStatus::Idle { last_saved_at: Some(_) });
    }

    #[test]
    fn failed_immediate_write_arms_a_retry() {
        let storage = MemoryStorage::new();
        storage.set_reject_writes(true);
        let mut autosave = scheduler(300);
        let feed = Feed::new();

        assert_matches!(
            autosave.persist_now(&feed, &storage),
            AutoSaveEvent::Error { .. }
        );
        assert!(autosave.has_pending());
        assert_matches!(autosave.status(), AutoSaveStatus::Error { .. });

        storage.set_reject_writes(false);
        assert_matches!(
            autosave.flush_now(&feed, &storage),
            Some(AutoSaveEvent::Saved { .. })
        );
        assert!(!autosave.has_pending());
        assert_eq!(storage.write_count(), 1);
    }

    #[test]
    fn disabled_scheduler_reports_disabled() {
        let autosave = AutoSaveScheduler::new(&AutoSaveConfig {
            debounce_ms: 500,
            enabled: false,
            flush_on_exit: true,
        });
        assert!(!autosave.is_enabled());
        assert_eq!(autosave.status(), AutoSaveStatus::Disabled);
    }
}
