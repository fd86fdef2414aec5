//! M3U playlist filtering
//!
//! Consumes raw playlist text plus rule configuration and produces the
//! filtered playlist text together with the set of retained channel
//! identifiers (and their categories) used to scope the guide reducer.
//!
//! An entry is a `#EXTINF:` metadata line followed by its stream URL line.
//! Entries run through a gate pipeline (category keep-list, name-pattern
//! exclusion, regional-variant and numeric-suffix suppression), then through
//! duplicate resolution. Playlists without any metadata lines are a degraded
//! bare-URL format with no category concept and pass through when no
//! keep-list is configured.

pub mod dedup;

use std::collections::HashMap;

use regex::{NoExpand, Regex};
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};
use crate::models::{ChannelRetentionSet, PlaylistEntry};

use dedup::DuplicateResolver;

/// Lines longer than this are judged malformed or hostile and skipped
const MAX_LINE_LENGTH: usize = 10_000;

/// Result of a filter run
#[derive(Debug)]
pub struct FilterOutcome {
    /// The reassembled playlist: header, then surviving metadata+URL pairs
    pub playlist: String,
    /// Channel identifiers retained for guide scoping
    pub retained: ChannelRetentionSet,
}

/// Rule-driven playlist filter
pub struct PlaylistFilter {
    categories_to_keep: Vec<String>,
    name_patterns_to_exclude: Vec<String>,
    custom_epg_ref: Option<String>,
    regional_suffix: Regex,
    numeric_suffix: Regex,
    url_tvg_attr: Regex,
    resolver: DuplicateResolver,
}

impl PlaylistFilter {
    /// Build a filter from the configured rule lists.
    ///
    /// An empty `categories_to_keep` means "keep everything". When
    /// `custom_epg_ref` is given, the header's `url-tvg` attribute is
    /// replaced with it (or appended if absent).
    pub fn new(
        categories_to_keep: &[String],
        name_patterns_to_exclude: &[String],
        custom_epg_ref: Option<String>,
    ) -> AppResult<Self> {
        Ok(Self {
            categories_to_keep: categories_to_keep.iter().map(|c| c.to_lowercase()).collect(),
            name_patterns_to_exclude: name_patterns_to_exclude
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            custom_epg_ref,
            // Timezone-shifted re-broadcasts: "+1 (Приволжье)", "+4 HD", "+2"
            regional_suffix: compile(r"(?i)\s\+\d+(?:\s+HD)?(?:\s*\([^)]+\))?\s*$")?,
            // Enumerated regional variants without the "+N" marker: "HD 50", "25"
            numeric_suffix: compile(r"\s\d{2,}$")?,
            url_tvg_attr: compile(r#"(?i)url-tvg="[^"]*""#)?,
            resolver: DuplicateResolver::new()?,
        })
    }

    /// Filter playlist text, returning the reassembled document and the
    /// retained channel identifiers
    pub fn filter(&self, content: &str) -> FilterOutcome {
        info!("Starting playlist filtering");

        let lines: Vec<&str> = content
            .lines()
            .filter(|line| {
                if line.len() > MAX_LINE_LENGTH {
                    warn!("Skipping overlong playlist line ({} bytes)", line.len());
                    false
                } else {
                    true
                }
            })
            .collect();

        let has_extinf = lines.iter().any(|l| l.trim().starts_with("#EXTINF:"));

        let mut header: Option<String> = None;
        let mut gated: Vec<PlaylistEntry> = Vec::new();
        let mut bare_urls: Vec<String> = Vec::new();

        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            i += 1;
            let trimmed = line.trim();

            if trimmed.starts_with("#EXTM3U") {
                if header.is_none() {
                    header = Some(self.rewrite_header(line));
                } else {
                    debug!("Ignoring duplicate #EXTM3U directive");
                }
            } else if trimmed.starts_with("#EXTINF:") {
                let mut stream_url: Option<&str> = None;
                while i < lines.len() {
                    let candidate = lines[i];
                    if candidate.trim().is_empty() {
                        i += 1;
                        continue;
                    }
                    if candidate.trim_start().starts_with('#') {
                        break;
                    }
                    stream_url = Some(candidate);
                    i += 1;
                    break;
                }

                match stream_url {
                    Some(url) => {
                        let mut entry = parse_entry(line, url);
                        if self.passes_gates(&entry) {
                            strip_orig_suffix(&mut entry);
                            gated.push(entry);
                        }
                    }
                    None => {
                        warn!("Dropping metadata line without a stream URL");
                    }
                }
            } else if !has_extinf
                && trimmed.starts_with("http")
                && self.categories_to_keep.is_empty()
            {
                // Degraded bare-URL format: no categories to evaluate
                bare_urls.push(line.to_string());
            }
        }

        let survivors = self.resolver.resolve(gated);

        let mut retained = ChannelRetentionSet::default();
        for entry in &survivors {
            retained.record(entry.tvg_id().unwrap_or(""), entry.group_title());
        }

        let playlist = assemble(header, &survivors, &bare_urls);

        info!(
            "Filtering complete: {} -> {} lines ({} -> {} channels, {} identifiers retained)",
            content.lines().count(),
            playlist.lines().count(),
            count_channels(content),
            survivors.len(),
            retained.len(),
        );

        FilterOutcome { playlist, retained }
    }

    /// Preserve the header line, replacing or appending the `url-tvg`
    /// attribute when a custom guide reference is configured
    fn rewrite_header(&self, line: &str) -> String {
        let Some(epg_ref) = &self.custom_epg_ref else {
            return line.to_string();
        };

        let replacement = format!(r#"url-tvg="{epg_ref}""#);
        if self.url_tvg_attr.is_match(line) {
            self.url_tvg_attr
                .replace_all(line, NoExpand(&replacement))
                .into_owned()
        } else if let Some(prefix) = line.strip_suffix('>') {
            format!("{prefix} {replacement}>")
        } else {
            format!("{line} {replacement}")
        }
    }

    /// Run one entry through the gate pipeline
    fn passes_gates(&self, entry: &PlaylistEntry) -> bool {
        if !self.categories_to_keep.is_empty() {
            let matched = entry
                .group_title()
                .map(|group| {
                    let group = group.to_lowercase();
                    self.categories_to_keep.iter().any(|c| *c == group)
                })
                .unwrap_or(false);
            if !matched {
                return false;
            }
        }

        let name = entry.display_name.as_str();
        if name.is_empty() {
            return true;
        }

        let name_lower = name.to_lowercase();
        if let Some(pattern) = self
            .name_patterns_to_exclude
            .iter()
            .find(|p| name_lower.contains(p.as_str()))
        {
            debug!("Excluding channel by name pattern '{pattern}': {name}");
            return false;
        }

        if self.regional_suffix.is_match(name) {
            debug!("Excluding regional variant: {name}");
            return false;
        }

        if self.numeric_suffix.is_match(name) {
            debug!("Excluding numeric-suffix variant: {name}");
            return false;
        }

        true
    }
}

/// Count `#EXTINF:` entries in playlist text
pub fn count_channels(content: &str) -> usize {
    content
        .lines()
        .filter(|l| l.trim().starts_with("#EXTINF:"))
        .count()
}

fn compile(pattern: &str) -> AppResult<Regex> {
    Regex::new(pattern).map_err(|e| AppError::internal(format!("invalid filter pattern: {e}")))
}

/// Parse a metadata line and its stream URL into an entry
fn parse_entry(extinf_line: &str, stream_url: &str) -> PlaylistEntry {
    let trimmed = extinf_line.trim();
    let body = trimmed.strip_prefix("#EXTINF:").unwrap_or(trimmed);

    let (attrs_part, display_name) = match body.rfind(',') {
        Some(pos) => (&body[..pos], body[pos + 1..].trim()),
        None => (body, ""),
    };

    PlaylistEntry {
        extinf: extinf_line.to_string(),
        attributes: parse_extinf_attributes(attrs_part),
        display_name: display_name.to_string(),
        stream_url: stream_url.to_string(),
    }
}

/// Parse `key="value"` attributes from the metadata line, lowercasing keys
fn parse_extinf_attributes(attrs_part: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();

    let mut chars = attrs_part.chars().peekable();
    let mut current_key = String::new();
    let mut current_value = String::new();
    let mut in_quotes = false;
    let mut in_key = false;
    let mut in_value = false;

    while let Some(ch) = chars.next() {
        match ch {
            ' ' | '\t' if !in_quotes => {
                if in_value {
                    if !current_key.is_empty() && !current_value.is_empty() {
                        attributes.insert(current_key.to_lowercase(), current_value.clone());
                    }
                    current_key.clear();
                    current_value.clear();
                    in_value = false;
                }
                in_key = true;
            }
            '=' if !in_quotes => {
                in_key = false;
                in_value = true;
                if chars.peek() == Some(&'"') {
                    chars.next();
                    in_quotes = true;
                }
            }
            '"' if in_value => {
                in_quotes = false;
                if !current_key.is_empty() {
                    attributes.insert(current_key.to_lowercase(), current_value.clone());
                }
                current_key.clear();
                current_value.clear();
                in_value = false;
            }
            _ => {
                if in_key {
                    current_key.push(ch);
                } else if in_value {
                    current_value.push(ch);
                }
            }
        }
    }

    if in_value && !current_key.is_empty() && !current_value.is_empty() {
        attributes.insert(current_key.to_lowercase(), current_value);
    }

    attributes
}

/// Strip a trailing " orig" token from the display name, rebuilding the
/// metadata line when it changes
fn strip_orig_suffix(entry: &mut PlaylistEntry) {
    if !entry.display_name.to_lowercase().ends_with(" orig") {
        return;
    }

    let stripped = entry.display_name[..entry.display_name.len() - 5].to_string();
    if let Some(pos) = entry.extinf.rfind(',') {
        entry.extinf = format!("{},{}", &entry.extinf[..pos], stripped);
    }
    entry.display_name = stripped;
}

/// Reassemble the filtered document: header first, then surviving pairs
fn assemble(header: Option<String>, entries: &[PlaylistEntry], bare_urls: &[String]) -> String {
    let mut lines: Vec<String> =
        Vec::with_capacity(1 + bare_urls.len() + entries.len() * 2);
    if let Some(header) = header {
        lines.push(header);
    }
    lines.extend(bare_urls.iter().cloned());
    for entry in entries {
        lines.push(entry.extinf.clone());
        lines.push(entry.stream_url.clone());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_all() -> PlaylistFilter {
        PlaylistFilter::new(&[], &[], None).unwrap()
    }

    #[test]
    fn parse_entry_extracts_attributes_and_name() {
        let entry = parse_entry(
            r#"#EXTINF:-1 tvg-id="ch1" tvg-rec="3" group-title="Россия | Russia",Первый канал HD"#,
            "http://example.com/1",
        );
        assert_eq!(entry.tvg_id(), Some("ch1"));
        assert_eq!(entry.group_title(), Some("Россия | Russia"));
        assert_eq!(entry.recording_priority(), 3);
        assert_eq!(entry.display_name, "Первый канал HD");
        assert_eq!(entry.stream_url, "http://example.com/1");
    }

    #[test]
    fn parse_entry_attribute_keys_are_case_insensitive() {
        let entry = parse_entry(
            r#"#EXTINF:-1 TVG-ID="ch1" Group-Title="News",Channel"#,
            "http://example.com/1",
        );
        assert_eq!(entry.tvg_id(), Some("ch1"));
        assert_eq!(entry.group_title(), Some("News"));
    }

    #[test]
    fn parse_entry_without_comma_has_empty_name() {
        let entry = parse_entry("#EXTINF:-1 tvg-id=\"x\"", "http://example.com/1");
        assert_eq!(entry.display_name, "");
        assert_eq!(entry.tvg_id(), Some("x"));
    }

    #[test]
    fn strip_orig_rewrites_metadata_line() {
        let mut entry = parse_entry("#EXTINF:-1,Channel One orig", "http://example.com/1");
        strip_orig_suffix(&mut entry);
        assert_eq!(entry.display_name, "Channel One");
        assert_eq!(entry.extinf, "#EXTINF:-1,Channel One");
    }

    #[test]
    fn strip_orig_is_case_insensitive() {
        let mut entry = parse_entry("#EXTINF:-1,Channel One ORIG", "http://example.com/1");
        strip_orig_suffix(&mut entry);
        assert_eq!(entry.display_name, "Channel One");
    }

    #[test]
    fn strip_orig_leaves_other_names_alone() {
        let mut entry = parse_entry("#EXTINF:-1,Original News", "http://example.com/1");
        strip_orig_suffix(&mut entry);
        assert_eq!(entry.display_name, "Original News");
    }

    #[test]
    fn regional_suffix_gate() {
        let f = filter_all();
        let dropped = parse_entry("#EXTINF:-1,Channel +1 (Приволжье)", "http://e/1");
        assert!(!f.passes_gates(&dropped));
        let dropped = parse_entry("#EXTINF:-1,Channel +4 HD", "http://e/2");
        assert!(!f.passes_gates(&dropped));
        let dropped = parse_entry("#EXTINF:-1,Channel +2", "http://e/3");
        assert!(!f.passes_gates(&dropped));
        // no trailing digit-qualifier: kept
        let kept = parse_entry("#EXTINF:-1,Channel +7 not regional", "http://e/4");
        assert!(f.passes_gates(&kept));
    }

    #[test]
    fn numeric_suffix_gate() {
        let f = filter_all();
        assert!(!f.passes_gates(&parse_entry("#EXTINF:-1,Channel 25", "http://e/1")));
        assert!(!f.passes_gates(&parse_entry("#EXTINF:-1,Music HD 50", "http://e/2")));
        // single trailing digits may be part of the channel name
        assert!(f.passes_gates(&parse_entry("#EXTINF:-1,Channel 5", "http://e/3")));
    }

    #[test]
    fn header_epg_ref_replaced() {
        let f = PlaylistFilter::new(&[], &[], Some("https://cdn.example.com/epg.xml.gz".into()))
            .unwrap();
        assert_eq!(
            f.rewrite_header(r#"#EXTM3U url-tvg="http://old/epg.xml""#),
            r#"#EXTM3U url-tvg="https://cdn.example.com/epg.xml.gz""#
        );
        // case-insensitive attribute match
        assert_eq!(
            f.rewrite_header(r#"#EXTM3U URL-TVG="http://old/epg.xml""#),
            r#"#EXTM3U url-tvg="https://cdn.example.com/epg.xml.gz""#
        );
    }

    #[test]
    fn header_epg_ref_appended_when_absent() {
        let f = PlaylistFilter::new(&[], &[], Some("https://cdn.example.com/epg.xml.gz".into()))
            .unwrap();
        assert_eq!(
            f.rewrite_header("#EXTM3U"),
            r#"#EXTM3U url-tvg="https://cdn.example.com/epg.xml.gz""#
        );
    }

    #[test]
    fn header_preserved_without_custom_ref() {
        let f = filter_all();
        assert_eq!(
            f.rewrite_header(r#"#EXTM3U url-tvg="http://old/epg.xml""#),
            r#"#EXTM3U url-tvg="http://old/epg.xml""#
        );
    }
}
