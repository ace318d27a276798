use feed_rs::model::Entry;
use tracing::debug;

use super::types::FeedItem;
use super::SourceError;

/// Parse a syndication document and normalize its entries for `source_id`.
///
/// Tolerant at the entry level: an entry missing a stable id, a link, or a
/// usable timestamp is skipped and the rest of the document still yields
/// items. Only an undecodable document fails as a whole.
pub fn parse_feed_items(
    source_id: &str,
    raw: &[u8],
    max_items: usize,
) -> Result<Vec<FeedItem>, SourceError> {
    let feed = feed_rs::parser::parse(raw)
        .map_err(|error| SourceError::Malformed(error.to_string()))?;
    let feed_author = feed.authors.first().map(|person| person.name.clone());

    let mut items: Vec<FeedItem> = Vec::with_capacity(feed.entries.len());
    let mut skipped = 0_usize;
    for entry in &feed.entries {
        match normalize_entry(source_id, entry, feed_author.as_deref()) {
            Some(item) => items.push(item),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!(source_id, skipped, "skipped malformed feed entries");
    }

    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    items.truncate(max_items);
    Ok(items)
}

fn normalize_entry(source_id: &str, entry: &Entry, feed_author: Option<&str>) -> Option<FeedItem> {
    let id = stable_entry_id(entry)?;
    let url = entry.links.first().map(|link| link.href.clone())?;
    let published_at = entry.published.or(entry.updated)?;
    let title = entry
        .title
        .as_ref()
        .map(|text| clean_title(&text.content))
        .filter(|title| !title.is_empty())?;
    let author = entry
        .authors
        .first()
        .map(|person| person.name.clone())
        .or_else(|| feed_author.map(ToString::to_string));

    Some(FeedItem {
        id,
        source_id: source_id.to_string(),
        title,
        url,
        published_at,
        author,
        watched: false,
    })
}

/// Namespaced entry ids (`yt:video:<id>`, `urn:uuid:<id>`) carry the stable
/// key in their last segment; re-fetching must reproduce the same id.
fn stable_entry_id(entry: &Entry) -> Option<String> {
    let raw = entry.id.trim();
    if raw.is_empty() {
        return entry
            .links
            .first()
            .map(|link| link.href.trim().to_string())
            .filter(|href| !href.is_empty());
    }
    let key = raw.rsplit(':').next().unwrap_or(raw).trim();
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

/// Strip emoji and collapse runs of whitespace.
pub fn clean_title(raw: &str) -> String {
    let filtered: String = raw.chars().filter(|ch| !is_emoji(*ch)).collect();
    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_emoji(ch: char) -> bool {
    matches!(
        u32::from(ch),
        0x1F000..=0x1FAFF   // pictographs, emoticons, transport, symbols
            | 0x2600..=0x27BF   // misc symbols and dingbats
            | 0x2B00..=0x2BFF   // arrows and stars
            | 0xFE00..=0xFE0F   // variation selectors
    )
}
