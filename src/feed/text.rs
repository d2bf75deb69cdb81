use once_cell::sync::Lazy;
use regex::Regex;
use time::macros::format_description;
use time::OffsetDateTime;
use unicode_segmentation::UnicodeSegmentation;

use super::item::Item;

/// Placeholder title; an item carrying it gets a title derived from its body.
pub const DEFAULT_TITLE: &str = "Untitled";

const TITLE_MAX_GRAPHEMES: usize = 30;
const ELLIPSIS: &str = "...";

static BLOCK_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(?:p|div|h[1-6]|li|blockquote|pre|ul|ol)\s*>")
        .expect("valid block break pattern")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));

/// Reduces rich-text markup to plain text. Block boundaries become newlines.
pub fn strip_markup(body: &str) -> String {
    let with_breaks = BLOCK_BREAK.replace_all(body, "\n");
    let without_tags = TAG.replace_all(&with_breaks, "");
    decode_entities(&without_tags).trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Visible characters, ignoring line breaks introduced by block markup.
pub fn count_chars(body: &str) -> usize {
    strip_markup(body)
        .graphemes(true)
        .filter(|g| *g != "\n" && *g != "\r\n")
        .count()
}

pub fn count_words(body: &str) -> usize {
    strip_markup(body).split_whitespace().count()
}

pub fn resolve_title(item: &Item) -> String {
    if let Some(title) = item.explicit_title() {
        return title.to_string();
    }
    let plain = strip_markup(&item.body);
    let Some(first_line) = plain.lines().map(str::trim).find(|line| !line.is_empty()) else {
        return DEFAULT_TITLE.to_string();
    };
    truncate_title(first_line)
}

fn truncate_title(line: &str) -> String {
    let mut graphemes = line.graphemes(true);
    let head: String = graphemes.by_ref().take(TITLE_MAX_GRAPHEMES).collect();
    if graphemes.next().is_some() {
        format!("{head}{ELLIPSIS}")
    } else {
        head
    }
}

/// Day, month name and year, e.g. `18 October 2026`.
pub fn format_date(epoch_millis: i64) -> String {
    let format = format_description!("[day padding:none] [month repr:long] [year]");
    OffsetDateTime::from_unix_timestamp_nanos(epoch_millis as i128 * 1_000_000)
        .ok()
        .and_then(|dt| dt.format(&format).ok())
        .unwrap_or_else(|| epoch_millis.to_string())
}
