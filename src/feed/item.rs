use serde::{Deserialize, Deserializer, Serialize};
use strum::{AsRefStr, Display};

use super::text::{self, DEFAULT_TITLE};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ItemKind {
    #[default]
    Note,
}

/// A single user-authored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: ItemKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Rich-text markup or plain text.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub body: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Item {
    pub fn new(id: String, title: Option<String>, body: String, now: i64) -> Self {
        Self {
            id,
            kind: ItemKind::Note,
            title,
            body,
            created_at: now,
            updated_at: now,
        }
    }

    /// `Some` only for a title the user actually chose.
    pub fn explicit_title(&self) -> Option<&str> {
        self.title
            .as_deref()
            .filter(|title| !title.is_empty() && *title != DEFAULT_TITLE)
    }

    pub fn display_title(&self) -> String {
        text::resolve_title(self)
    }

    pub fn plain_text(&self) -> String {
        text::strip_markup(&self.body)
    }

    pub fn char_count(&self) -> usize {
        text::count_chars(&self.body)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
