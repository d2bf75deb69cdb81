use std::cmp::Ordering;

use indexmap::IndexMap;

use super::env::Environment;
use super::item::Item;
use super::text;
use crate::config::{SortDirection, SortField, SortSpec};

/// All items plus the active pointer.
///
/// Every operation returns a new `Feed` and leaves `self` untouched, so a view
/// can keep the previous value around for diffing. Operations naming an id that
/// is not present are no-ops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feed {
    items: IndexMap<String, Item>,
    active_id: Option<String>,
}

impl Feed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a feed from untrusted parts: later duplicates of an id are dropped
    /// and an unusable active pointer is re-pointed at the first item.
    pub fn from_parts<I>(items: I, active_id: Option<String>) -> Self
    where
        I: IntoIterator<Item = Item>,
    {
        let mut map = IndexMap::new();
        for item in items {
            if map.contains_key(&item.id) {
                tracing::warn!(id = %item.id, "dropping item with duplicate id");
                continue;
            }
            map.insert(item.id.clone(), item);
        }
        let mut feed = Self {
            items: map,
            active_id,
        };
        if feed.active_is_dangling() {
            tracing::warn!(
                active_id = ?feed.active_id,
                "active item missing, selecting first item"
            );
            feed.active_id = feed.first_id();
        }
        feed
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    /// Items in collection order, newest creation first for items made here.
    pub fn items(&self) -> impl ExactSizeIterator<Item = &Item> {
        self.items.values()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn active(&self) -> Option<&Item> {
        self.active_id.as_deref().and_then(|id| self.items.get(id))
    }

    pub fn resolve_title(&self, item: &Item) -> String {
        text::resolve_title(item)
    }

    pub fn sorted(&self, spec: SortSpec) -> Vec<&Item> {
        let mut items: Vec<&Item> = self.items.values().collect();
        items.sort_by(|a, b| {
            let ordering = match spec.field {
                SortField::Updated => a.updated_at.cmp(&b.updated_at),
                SortField::Created => a.created_at.cmp(&b.created_at),
                SortField::Title => compare_titles(a, b),
            };
            match spec.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        });
        items
    }

    /// Prepends a fresh empty item and makes it active.
    #[must_use]
    pub fn create<E: Environment>(&self, env: &E, title_hint: Option<&str>) -> (Feed, Item) {
        let id = self.unused_id(env);
        let title = title_hint
            .map(str::trim)
            .filter(|hint| !hint.is_empty())
            .map(str::to_string);
        let item = Item::new(id.clone(), title, String::new(), env.now_millis());

        let mut next = self.clone();
        next.items.shift_insert(0, id.clone(), item.clone());
        next.active_id = Some(id);
        (next, item)
    }

    #[must_use]
    pub fn select(&self, id: &str) -> Feed {
        if !self.contains(id) {
            tracing::debug!(id, "ignoring selection of unknown item");
            return self.clone();
        }
        let mut next = self.clone();
        next.active_id = Some(id.to_string());
        next
    }

    #[must_use]
    pub fn update_body<E: Environment>(&self, env: &E, id: &str, body: &str) -> Feed {
        self.modify(env, id, |item| item.body = body.to_string())
    }

    /// Blank titles are rejected; callers trim before renaming.
    #[must_use]
    pub fn rename<E: Environment>(&self, env: &E, id: &str, title: &str) -> Feed {
        if title.trim().is_empty() {
            tracing::debug!(id, "ignoring blank title");
            return self.clone();
        }
        self.modify(env, id, |item| item.title = Some(title.to_string()))
    }

    /// Removes an item. When the last one goes, a fresh empty item takes its
    /// place so there is always something to edit.
    #[must_use]
    pub fn delete<E: Environment>(&self, env: &E, id: &str) -> Feed {
        if !self.contains(id) {
            tracing::debug!(id, "ignoring delete of unknown item");
            return self.clone();
        }
        let mut next = self.clone();
        next.items.shift_remove(id);
        if next.items.is_empty() {
            let (replacement, _) = next.create(env, None);
            return replacement;
        }
        if next.active_id.as_deref() == Some(id) {
            next.active_id = next.first_id();
        }
        next
    }

    fn modify<E, F>(&self, env: &E, id: &str, f: F) -> Feed
    where
        E: Environment,
        F: FnOnce(&mut Item),
    {
        let mut next = self.clone();
        let Some(item) = next.items.get_mut(id) else {
            tracing::debug!(id, "ignoring update of unknown item");
            return next;
        };
        f(item);
        item.updated_at = env.now_millis();
        next
    }

    fn unused_id<E: Environment>(&self, env: &E) -> String {
        loop {
            let id = env.fresh_id();
            if !self.items.contains_key(&id) {
                return id;
            }
            tracing::debug!(%id, "regenerating colliding item id");
        }
    }

    fn first_id(&self) -> Option<String> {
        self.items.keys().next().cloned()
    }

    fn active_is_dangling(&self) -> bool {
        match self.active_id.as_deref() {
            Some(id) => !self.items.contains_key(id),
            None => !self.items.is_empty(),
        }
    }
}

fn compare_titles(a: &Item, b: &Item) -> Ordering {
    let left = text::resolve_title(a).to_lowercase();
    let right = text::resolve_title(b).to_lowercase();
    left.cmp(&right).then_with(|| a.id.cmp(&b.id))
}
