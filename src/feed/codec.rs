use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::item::Item;
use super::store::Feed;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FeedWireRef<'a> {
    items: Vec<&'a Item>,
    active_id: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedWire {
    items: Vec<Item>,
    #[serde(default)]
    active_id: Option<String>,
}

pub fn serialize(feed: &Feed) -> Result<String> {
    let wire = FeedWireRef {
        items: feed.items().collect(),
        active_id: feed.active_id(),
    };
    serde_json::to_string(&wire).context("serialising feed")
}

/// Strict parse of the current format. `None` means the text is not a feed.
pub fn decode(text: &str) -> Option<Feed> {
    match serde_json::from_str::<FeedWire>(text) {
        Ok(wire) => Some(Feed::from_parts(wire.items, wire.active_id)),
        Err(err) => {
            tracing::warn!(%err, "persisted feed is not valid");
            None
        }
    }
}

/// Lenient parse: absent or malformed text yields the empty feed.
pub fn deserialize(text: Option<&str>) -> Feed {
    text.and_then(decode).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::env::testing::TestEnvironment;

    fn sample_feed() -> Feed {
        let env = TestEnvironment::at(1_700_000_000_000);
        let (feed, first) = Feed::new().create(&env, Some("Groceries"));
        env.advance(1_000);
        let feed = feed.update_body(&env, &first.id, "<p>eggs &amp; milk</p>");
        let (feed, _) = feed.create(&env, None);
        feed.select(&first.id)
    }

    #[test]
    fn round_trips_items_and_active_pointer() -> anyhow::Result<()> {
        let feed = sample_feed();
        let text = serialize(&feed)?;
        assert_eq!(deserialize(Some(&text)), feed);

        let empty = Feed::new();
        assert_eq!(deserialize(Some(&serialize(&empty)?)), empty);
        Ok(())
    }

    #[test]
    fn serialized_layout_is_stable() -> anyhow::Result<()> {
        let env = TestEnvironment::at(5);
        let (feed, _) = Feed::new().create(&env, None);
        insta::assert_snapshot!(
            serialize(&feed)?,
            @r#"{"items":[{"id":"item-1","type":"note","body":"","createdAt":5,"updatedAt":5}],"activeId":"item-1"}"#
        );
        Ok(())
    }

    #[test]
    fn malformed_or_absent_text_yields_empty_feed() {
        assert_eq!(deserialize(None), Feed::new());
        assert_eq!(deserialize(Some("{not json")), Feed::new());
        assert_eq!(deserialize(Some(r#"{"docs":[]}"#)), Feed::new());
        assert_eq!(deserialize(Some("\"just a string\"")), Feed::new());
    }

    #[test]
    fn accepts_feed_without_active_pointer() {
        let raw = r#"{"items":[{"id":"b","type":"note","body":"<p>x</p>","createdAt":2,"updatedAt":2},{"id":"a","type":"note","body":"","createdAt":1,"updatedAt":1}]}"#;
        let feed = decode(raw).expect("feed decodes");
        assert_eq!(feed.len(), 2);
        assert_eq!(feed.active_id(), Some("b"));
    }

    #[test]
    fn decode_rejects_items_missing_timestamps() {
        assert!(decode(r#"{"items":[{"id":"a","body":""}],"activeId":"a"}"#).is_none());
    }
}
