//! Core data model shared by the playlist filter and the guide reducer

use std::collections::{HashMap, HashSet};

/// One advertised channel: an `#EXTINF` metadata line plus its stream URL.
///
/// The raw metadata line is kept alongside the parsed fields so the filtered
/// playlist can be reassembled without re-serializing attributes (no entry is
/// ever invented or reordered within its line).
#[derive(Debug, Clone)]
pub struct PlaylistEntry {
    /// The `#EXTINF:` line exactly as it appeared in the source
    pub extinf: String,
    /// `key="value"` attributes from the metadata line, keys lowercased
    pub attributes: HashMap<String, String>,
    /// Free-text display name after the final comma
    pub display_name: String,
    /// The stream URL line following the metadata line
    pub stream_url: String,
}

impl PlaylistEntry {
    /// Case-insensitive attribute lookup
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(&key.to_lowercase()).map(String::as_str)
    }

    /// The channel identifier (`tvg-id`), if present
    pub fn tvg_id(&self) -> Option<&str> {
        self.attribute("tvg-id")
    }

    /// The category (`group-title`), if present
    pub fn group_title(&self) -> Option<&str> {
        self.attribute("group-title")
    }

    /// Numeric recording priority (`tvg-rec`); absent or unparsable means 0
    pub fn recording_priority(&self) -> i64 {
        self.attribute("tvg-rec")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

/// Channels retained by the playlist filter, handed to the guide reducer.
///
/// Holds the set of unique non-empty channel identifiers and, for identifiers
/// that carried a category attribute, the identifier-to-category map.
/// Immutable once the filter has produced it.
#[derive(Debug, Clone, Default)]
pub struct ChannelRetentionSet {
    ids: HashSet<String>,
    categories: HashMap<String, String>,
}

impl ChannelRetentionSet {
    /// Record a surviving entry. Empty identifiers are not retained.
    pub fn record(&mut self, id: &str, category: Option<&str>) {
        let id = id.trim();
        if id.is_empty() {
            return;
        }
        self.ids.insert(id.to_string());
        if let Some(category) = category {
            self.categories.insert(id.to_string(), category.to_string());
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn category(&self, id: &str) -> Option<&str> {
        self.categories.get(id).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Time-retention and exclusion configuration for the guide reducer.
///
/// Read-only per run. Excluded channels (by category or by identifier) get a
/// tighter time window than ordinary channels.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub past_retention_days: i64,
    pub future_retention_days: i64,
    pub excluded_channel_future_limit_days: i64,
    pub excluded_channel_past_limit_hours: i64,
    /// Categories whose guide data is denylisted, stored lowercased
    excluded_categories: HashSet<String>,
    /// Channel identifiers whose guide data is denylisted
    excluded_channel_ids: HashSet<String>,
}

impl RetentionPolicy {
    pub fn new(
        past_retention_days: i64,
        future_retention_days: i64,
        excluded_channel_future_limit_days: i64,
        excluded_channel_past_limit_hours: i64,
        excluded_categories: &[String],
        excluded_channel_ids: &[String],
    ) -> Self {
        Self {
            past_retention_days,
            future_retention_days,
            excluded_channel_future_limit_days,
            excluded_channel_past_limit_hours,
            excluded_categories: excluded_categories
                .iter()
                .map(|c| c.to_lowercase())
                .collect(),
            excluded_channel_ids: excluded_channel_ids.iter().cloned().collect(),
        }
    }

    /// Whether a channel falls under the tighter excluded-channel window
    pub fn is_excluded(&self, id: &str, category: Option<&str>) -> bool {
        if self.excluded_channel_ids.contains(id) {
            return true;
        }
        category
            .map(|c| self.excluded_categories.contains(&c.to_lowercase()))
            .unwrap_or(false)
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(0, 10, 2, 1, &[], &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_set_skips_empty_ids() {
        let mut set = ChannelRetentionSet::default();
        set.record("", Some("News"));
        set.record("  ", None);
        set.record("ch1", Some("News"));
        assert_eq!(set.len(), 1);
        assert!(set.contains("ch1"));
        assert_eq!(set.category("ch1"), Some("News"));
    }

    #[test]
    fn excluded_category_matching_is_case_insensitive() {
        let policy = RetentionPolicy::new(0, 10, 2, 1, &["Кино".to_string()], &[]);
        assert!(policy.is_excluded("x", Some("кино")));
        assert!(policy.is_excluded("x", Some("КИНО")));
        assert!(!policy.is_excluded("x", Some("News")));
        assert!(!policy.is_excluded("x", None));
    }

    #[test]
    fn excluded_channel_id_matches_regardless_of_category() {
        let policy = RetentionPolicy::new(0, 10, 2, 1, &[], &["2745".to_string()]);
        assert!(policy.is_excluded("2745", None));
        assert!(!policy.is_excluded("2746", Some("Кино")));
    }

    #[test]
    fn recording_priority_defaults_to_zero() {
        let entry = PlaylistEntry {
            extinf: "#EXTINF:-1,Test".to_string(),
            attributes: HashMap::new(),
            display_name: "Test".to_string(),
            stream_url: "http://example.com/1".to_string(),
        };
        assert_eq!(entry.recording_priority(), 0);
    }
}
