//! One-way upgrade of older storage layouts into the current feed.
//!
//! Each recogniser is a pure parse returning `Option<Feed>`; they are tried
//! newest first and the first hit wins. Once a legacy layout has been written
//! out in the current format its key is removed, so later runs stop at the
//! first step.

use anyhow::Result;
use serde::Deserialize;

use super::codec;
use super::env::Environment;
use super::item::{Item, ItemKind};
use super::store::Feed;
use super::text::DEFAULT_TITLE;
use crate::storage::{KeyValueStore, FEED_KEY, LEGACY_DOCUMENTS_KEY, LEGACY_SCRATCH_KEY};

/// Unreadable current-format data is parked here before it is replaced.
pub const CORRUPT_FEED_KEY: &str = "cleartype-feed-corrupt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationSource {
    Current,
    LegacyDocuments,
    LegacyScratch,
    Fresh,
}

#[derive(Debug, Clone)]
pub struct Migration {
    pub feed: Feed,
    pub source: MigrationSource,
    /// False when the upgraded feed could not be written back; the legacy key
    /// is then left in place for the next attempt.
    pub persisted: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyDocumentStore {
    docs: Vec<LegacyDocument>,
    #[serde(default)]
    active_doc_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyDocument {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl From<LegacyDocument> for Item {
    fn from(doc: LegacyDocument) -> Self {
        let title = doc.title.filter(|title| {
            let trimmed = title.trim();
            !trimmed.is_empty() && trimmed != DEFAULT_TITLE
        });
        Item {
            id: doc.id,
            kind: ItemKind::Note,
            title,
            body: doc.content.unwrap_or_default(),
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

pub fn parse_current(raw: &str) -> Option<Feed> {
    codec::decode(raw)
}

pub fn parse_legacy_documents(raw: &str) -> Option<Feed> {
    match serde_json::from_str::<LegacyDocumentStore>(raw) {
        Ok(store) => Some(Feed::from_parts(
            store.docs.into_iter().map(Item::from),
            store.active_doc_id,
        )),
        Err(err) => {
            tracing::warn!(%err, "legacy document store is unreadable, skipping");
            None
        }
    }
}

pub fn parse_legacy_scratch<E: Environment>(raw: &str, env: &E) -> Option<Feed> {
    if raw.is_empty() {
        return None;
    }
    let item = Item::new(env.fresh_id(), None, raw.to_string(), env.now_millis());
    let active = Some(item.id.clone());
    Some(Feed::from_parts([item], active))
}

/// Loads the feed, upgrading older layouts on the way. Read failures propagate;
/// treating an unreadable store as empty would overwrite it.
pub fn run<S, E>(storage: &S, env: &E) -> Result<Migration>
where
    S: KeyValueStore + ?Sized,
    E: Environment,
{
    let current_raw = storage.get(FEED_KEY)?;
    if let Some(feed) = current_raw.as_deref().and_then(parse_current) {
        tracing::debug!(items = feed.len(), "loaded feed");
        return Ok(Migration {
            feed,
            source: MigrationSource::Current,
            persisted: true,
        });
    }
    if let Some(raw) = current_raw.as_deref() {
        tracing::warn!(backup = CORRUPT_FEED_KEY, "stored feed is corrupt, keeping a copy");
        if let Err(err) = storage.set(CORRUPT_FEED_KEY, raw) {
            tracing::warn!(?err, "failed to back up corrupt feed");
        }
    }

    let documents = storage
        .get(LEGACY_DOCUMENTS_KEY)?
        .as_deref()
        .and_then(parse_legacy_documents);
    let (feed, source, legacy_key) = if let Some(feed) = documents {
        (feed, MigrationSource::LegacyDocuments, Some(LEGACY_DOCUMENTS_KEY))
    } else if let Some(feed) = storage
        .get(LEGACY_SCRATCH_KEY)?
        .as_deref()
        .and_then(|raw| parse_legacy_scratch(raw, env))
    {
        (feed, MigrationSource::LegacyScratch, Some(LEGACY_SCRATCH_KEY))
    } else {
        let (feed, _) = Feed::new().create(env, None);
        (feed, MigrationSource::Fresh, None)
    };

    let persisted = write_back(storage, &feed, legacy_key);
    tracing::info!(?source, items = feed.len(), persisted, "initialised feed");
    Ok(Migration {
        feed,
        source,
        persisted,
    })
}

fn write_back<S>(storage: &S, feed: &Feed, legacy_key: Option<&str>) -> bool
where
    S: KeyValueStore + ?Sized,
{
    let written = codec::serialize(feed).and_then(|text| storage.set(FEED_KEY, &text));
    if let Err(err) = written {
        tracing::warn!(?err, "could not persist migrated feed; legacy data left in place");
        return false;
    }
    if let Some(key) = legacy_key {
        if let Err(err) = storage.remove(key) {
            tracing::warn!(?err, key, "failed to remove migrated legacy key");
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::env::testing::TestEnvironment;
    use crate::storage::MemoryStorage;
    use assert_matches::assert_matches;

    const LEGACY_DOCS: &str = r#"{
        "docs": [
            {"id": "abc1234", "title": "Untitled", "content": "<p>first</p>", "createdAt": 10, "updatedAt": 20},
            {"id": "def5678", "title": "Letters", "content": "<p>second</p>", "createdAt": 30, "updatedAt": 40}
        ],
        "activeDocId": "def5678"
    }"#;

    #[test]
    fn scratch_text_becomes_single_item() -> anyhow::Result<()> {
        let storage = MemoryStorage::with_entries([(LEGACY_SCRATCH_KEY, "draft text")]);
        let env = TestEnvironment::at(99);

        let migration = run(&storage, &env)?;
        assert_eq!(migration.source, MigrationSource::LegacyScratch);
        assert!(migration.persisted);
        assert_eq!(migration.feed.len(), 1);
        let item = migration.feed.active().expect("active item");
        assert_eq!(item.body, "draft text");
        assert_eq!(item.created_at, 99);
        assert!(storage.contains(FEED_KEY));
        assert!(!storage.contains(LEGACY_SCRATCH_KEY));
        Ok(())
    }

    #[test]
    fn legacy_documents_map_content_to_body() -> anyhow::Result<()> {
        let storage = MemoryStorage::with_entries([(LEGACY_DOCUMENTS_KEY, LEGACY_DOCS)]);
        let env = TestEnvironment::at(0);

        let migration = run(&storage, &env)?;
        assert_eq!(migration.source, MigrationSource::LegacyDocuments);
        let feed = &migration.feed;
        let ids: Vec<&str> = feed.items().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["abc1234", "def5678"]);
        assert_eq!(feed.active_id(), Some("def5678"));

        let first = feed.get("abc1234").expect("first doc");
        assert_eq!(first.body, "<p>first</p>");
        assert_eq!(first.title, None);
        assert_eq!((first.created_at, first.updated_at), (10, 20));
        assert_eq!(
            feed.get("def5678").and_then(|item| item.title.as_deref()),
            Some("Letters")
        );
        assert!(!storage.contains(LEGACY_DOCUMENTS_KEY));
        Ok(())
    }

    #[test]
    fn documents_take_priority_over_scratch() -> anyhow::Result<()> {
        let storage = MemoryStorage::with_entries([
            (LEGACY_DOCUMENTS_KEY, LEGACY_DOCS),
            (LEGACY_SCRATCH_KEY, "older text"),
        ]);
        let migration = run(&storage, &TestEnvironment::at(0))?;
        assert_eq!(migration.source, MigrationSource::LegacyDocuments);
        assert!(storage.contains(LEGACY_SCRATCH_KEY));
        Ok(())
    }

    #[test]
    fn current_feed_is_used_as_is() -> anyhow::Result<()> {
        let raw = r#"{"items":[{"id":"x","type":"note","body":"kept","createdAt":1,"updatedAt":2}],"activeId":"x"}"#;
        let storage = MemoryStorage::with_entries([
            (FEED_KEY, raw),
            (LEGACY_SCRATCH_KEY, "ignored"),
        ]);
        let migration = run(&storage, &TestEnvironment::at(0))?;
        assert_eq!(migration.source, MigrationSource::Current);
        assert_eq!(migration.feed.get("x").map(|item| item.body.as_str()), Some("kept"));
        assert_eq!(storage.write_count(), 0);
        assert!(storage.contains(LEGACY_SCRATCH_KEY));
        Ok(())
    }

    #[test]
    fn malformed_documents_fall_through_to_scratch() -> anyhow::Result<()> {
        let storage = MemoryStorage::with_entries([
            (LEGACY_DOCUMENTS_KEY, "{\"docs\": [oops"),
            (LEGACY_SCRATCH_KEY, "rescued"),
        ]);
        let migration = run(&storage, &TestEnvironment::at(0))?;
        assert_eq!(migration.source, MigrationSource::LegacyScratch);
        assert_eq!(
            migration.feed.active().map(|item| item.body.as_str()),
            Some("rescued")
        );
        Ok(())
    }

    #[test]
    fn empty_storage_starts_with_one_editable_item() -> anyhow::Result<()> {
        let storage = MemoryStorage::new();
        let migration = run(&storage, &TestEnvironment::at(7))?;
        assert_eq!(migration.source, MigrationSource::Fresh);
        assert_eq!(migration.feed.len(), 1);
        assert_matches!(migration.feed.active(), Some(item) if item.body.is_empty());
        assert!(storage.contains(FEED_KEY));
        Ok(())
    }

    #[test]
    fn corrupt_feed_is_backed_up_before_replacement() -> anyhow::Result<()> {
        let storage = MemoryStorage::with_entries([(FEED_KEY, "{\"items\": [")]);
        let migration = run(&storage, &TestEnvironment::at(0))?;
        assert_eq!(migration.source, MigrationSource::Fresh);
        assert_eq!(storage.get(CORRUPT_FEED_KEY)?.as_deref(), Some("{\"items\": ["));
        assert!(codec::decode(&storage.get(FEED_KEY)?.unwrap_or_default()).is_some());
        Ok(())
    }

    #[test]
    fn rerunning_is_a_no_op() -> anyhow::Result<()> {
        for seed in [
            vec![(LEGACY_SCRATCH_KEY, "draft text")],
            vec![(LEGACY_DOCUMENTS_KEY, LEGACY_DOCS)],
            vec![],
        ] {
            let storage = MemoryStorage::with_entries(seed);
            let env = TestEnvironment::at(0);
            let first = run(&storage, &env)?;
            env.advance(1_000);
            let second = run(&storage, &env)?;

            assert_eq!(second.source, MigrationSource::Current);
            assert_eq!(second.feed, first.feed);
            assert!(!storage.contains(LEGACY_SCRATCH_KEY));
            assert!(!storage.contains(LEGACY_DOCUMENTS_KEY));
        }
        Ok(())
    }

    #[test]
    fn failed_write_keeps_legacy_key() -> anyhow::Result<()> {
        let storage = MemoryStorage::with_entries([(LEGACY_SCRATCH_KEY, "precious")]);
        storage.set_reject_writes(true);

        let migration = run(&storage, &TestEnvironment::at(0))?;
        assert!(!migration.persisted);
        assert_eq!(
            migration.feed.active().map(|item| item.body.as_str()),
            Some("precious")
        );
        assert_eq!(storage.get(LEGACY_SCRATCH_KEY)?.as_deref(), Some("precious"));
        Ok(())
    }

    #[test]
    fn empty_scratch_is_not_legacy_data() {
        assert!(parse_legacy_scratch("", &TestEnvironment::at(0)).is_none());
    }
}
