//! XMLTV guide reduction
//!
//! Consumes raw guide text, the channel retention set produced by the
//! playlist filter, and the retention policy, and emits a reduced guide
//! containing only channels and programs that survive filtering.
//!
//! The reducer is pure: the current time is an injected parameter, never an
//! ambient clock read mid-algorithm, so runs over frozen inputs are
//! reproducible.

pub mod xmltv;

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::errors::AppResult;
use crate::models::{ChannelRetentionSet, RetentionPolicy};
use crate::utils::time::parse_xmltv_timestamp;

use xmltv::XmlElement;

/// Emitted verbatim when no channel identifiers were retained; the source
/// guide is not even parsed in that case
pub const EMPTY_GUIDE: &str = r#"<?xml version="1.0" encoding="UTF-8"?><tv></tv>"#;

/// Language marker applied to a first display-name that carries none
const DEFAULT_DISPLAY_NAME_LANG: &str = "ru";

/// Look-ahead window for the degraded-match fallback tier
const FALLBACK_LOOKAHEAD_DAYS: i64 = 7;

/// Programs older than this are dropped even on the permissive branch
const STALE_FEED_TOLERANCE_DAYS: i64 = 365;

/// Time- and channel-scoped guide reducer
pub struct EpgReducer<'a> {
    policy: &'a RetentionPolicy,
}

impl<'a> EpgReducer<'a> {
    pub fn new(policy: &'a RetentionPolicy) -> Self {
        Self { policy }
    }

    /// Reduce guide text to the channels in `retained` and the configured
    /// time window, relative to the injected `now`
    pub fn reduce(
        &self,
        epg_content: &str,
        retained: &ChannelRetentionSet,
        now: DateTime<Utc>,
    ) -> AppResult<String> {
        if retained.is_empty() {
            warn!("No channel identifiers retained, emitting empty guide");
            return Ok(EMPTY_GUIDE.to_string());
        }

        let root = xmltv::parse_document(epg_content)?;

        let initial_channels = root.children.iter().filter(|c| c.name == "channel").count();
        info!(
            "Reducing guide: {} initial channels, {} playlist identifiers",
            initial_channels,
            retained.len()
        );

        // Pass 1: intersect program channel refs with the playlist identifiers
        let matched: HashSet<String> = root
            .children
            .iter()
            .filter(|c| c.name == "programme")
            .filter_map(|p| p.attr("channel"))
            .filter(|channel_ref| retained.contains(channel_ref))
            .map(str::to_string)
            .collect();

        let retained_channels = if matched.is_empty() {
            // Degraded-match tier: the guide uses different identifiers than
            // the playlist. Fall back to a time heuristic; a name-based join
            // is intentionally not attempted.
            warn!(
                "No guide programs matched the playlist identifiers, \
                 falling back to time-heuristic channel selection"
            );
            fallback_channels(&root, now)
        } else {
            matched
        };

        // Pass 2: per-program time/exclusion filter
        let mut kept_programs: Vec<(String, XmlElement)> = Vec::new();
        let mut has_programs: HashSet<String> = HashSet::new();

        for programme in root.children.iter().filter(|c| c.name == "programme") {
            let channel_ref = programme.attr("channel").unwrap_or("");
            if !retained_channels.contains(channel_ref) {
                continue;
            }

            let excluded = self
                .policy
                .is_excluded(channel_ref, retained.category(channel_ref));

            let start = programme.attr("start").and_then(parse_xmltv_timestamp);
            let stop = programme.attr("stop").and_then(parse_xmltv_timestamp);

            let keep = match (start, stop) {
                (Some(start), Some(stop)) => self.retain_program(start, stop, excluded, now),
                // Favor completeness over correctness for malformed records
                _ => {
                    warn!(
                        "Could not parse program time on channel {channel_ref}, including it anyway"
                    );
                    true
                }
            };

            if keep {
                has_programs.insert(channel_ref.to_string());
                kept_programs.push((channel_ref.to_string(), copy_program(programme)));
            }
        }

        // Pass 3: emit channels that are retained and kept at least one program
        let mut output = XmlElement::new("tv");
        let mut emitted_ids: HashSet<String> = HashSet::new();

        for channel in root.children.iter().filter(|c| c.name == "channel") {
            let id = channel.attr("id").unwrap_or("");
            if id.is_empty() || !retained_channels.contains(id) || !has_programs.contains(id) {
                continue;
            }
            if emitted_ids.insert(id.to_string()) {
                output.children.push(reduce_channel(channel, id));
            }
        }

        let emitted_channels = output.children.len();

        // Pass 4: emit programs for emitted channels only, keeping the output
        // free of orphaned references
        let mut emitted_programs = 0usize;
        for (channel_ref, programme) in kept_programs {
            if emitted_ids.contains(&channel_ref) {
                output.children.push(programme);
                emitted_programs += 1;
            } else {
                debug!("Dropping program for channel {channel_ref} with no channel element");
            }
        }

        info!(
            "Guide reduced: {} channels after category and ID exclusions, {} programs",
            emitted_channels, emitted_programs
        );

        Ok(xmltv::serialize_document(&output))
    }

    /// Multi-tier retention decision for one program
    fn retain_program(
        &self,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
        excluded: bool,
        now: DateTime<Utc>,
    ) -> bool {
        let policy = self.policy;
        let future_horizon = now + Duration::days(policy.future_retention_days);

        if policy.past_retention_days > 0 {
            let past_horizon = now - Duration::days(policy.past_retention_days);
            (stop >= past_horizon || start <= future_horizon)
                && (start >= past_horizon || stop >= past_horizon)
        } else if excluded {
            stop >= now - Duration::hours(policy.excluded_channel_past_limit_hours)
                && start <= now + Duration::days(policy.excluded_channel_future_limit_days)
        } else {
            // Permissive union tolerating stale feeds and skewed source clocks
            stop >= now
                || start <= future_horizon
                || now - stop <= Duration::days(STALE_FEED_TOLERANCE_DAYS)
                || (start <= now && now <= stop)
        }
    }
}

/// Select channels carrying a program that overlaps `now` or starts within
/// the fallback look-ahead window
fn fallback_channels(root: &XmlElement, now: DateTime<Utc>) -> HashSet<String> {
    let horizon = now + Duration::days(FALLBACK_LOOKAHEAD_DAYS);
    let mut channels = HashSet::new();

    for programme in root.children.iter().filter(|c| c.name == "programme") {
        let Some(channel_ref) = programme.attr("channel") else {
            continue;
        };
        if channel_ref.is_empty() {
            continue;
        }
        let Some(start) = programme.attr("start").and_then(parse_xmltv_timestamp) else {
            continue;
        };
        let Some(stop) = programme.attr("stop").and_then(parse_xmltv_timestamp) else {
            continue;
        };

        if (start <= now && now <= stop) || (start > now && start <= horizon) {
            channels.insert(channel_ref.to_string());
        }
    }

    channels
}

/// Copy a channel element keeping only the first display-name (language
/// marker defaulted if absent) and non-icon passthrough children
fn reduce_channel(channel: &XmlElement, id: &str) -> XmlElement {
    let mut reduced = XmlElement::new("channel");
    reduced.attributes.push(("id".to_string(), id.to_string()));

    let mut display_name_copied = false;
    for child in &channel.children {
        match child.name.as_str() {
            "display-name" => {
                if !display_name_copied {
                    let mut display_name = child.clone();
                    if display_name.attr("lang").is_none() {
                        display_name
                            .attributes
                            .push(("lang".to_string(), DEFAULT_DISPLAY_NAME_LANG.to_string()));
                    }
                    reduced.children.push(display_name);
                    display_name_copied = true;
                }
            }
            // Icons are dropped to bound output size
            "icon" => {}
            _ => reduced.children.push(child.clone()),
        }
    }

    reduced
}

/// Deep-copy a program element. Any `desc`-tagged node has its text content
/// cleared while attributes and structure are preserved.
fn copy_program(element: &XmlElement) -> XmlElement {
    XmlElement {
        name: element.name.clone(),
        attributes: element.attributes.clone(),
        text: if element.name.eq_ignore_ascii_case("desc") {
            String::new()
        } else {
            element.text.clone()
        },
        children: element.children.iter().map(copy_program).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn policy_with(past_days: i64) -> RetentionPolicy {
        RetentionPolicy::new(past_days, 10, 2, 1, &[], &[])
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn permissive_branch_keeps_recently_ended_programs() {
        let policy = policy_with(0);
        let reducer = EpgReducer::new(&policy);
        let start = now() - Duration::hours(3);
        let stop = now() - Duration::minutes(90);
        assert!(reducer.retain_program(start, stop, false, now()));
    }

    #[test]
    fn excluded_channel_window_drops_old_programs() {
        let policy = policy_with(0);
        let reducer = EpgReducer::new(&policy);
        let start = now() - Duration::hours(3);
        let stop = now() - Duration::minutes(90);
        // same program, but on an excluded channel with a 1 hour past limit
        assert!(!reducer.retain_program(start, stop, true, now()));
    }

    #[test]
    fn excluded_channel_window_keeps_current_programs() {
        let policy = policy_with(0);
        let reducer = EpgReducer::new(&policy);
        let start = now() - Duration::minutes(30);
        let stop = now() + Duration::minutes(30);
        assert!(reducer.retain_program(start, stop, true, now()));
    }

    #[test]
    fn excluded_channel_window_drops_far_future_programs() {
        let policy = policy_with(0);
        let reducer = EpgReducer::new(&policy);
        let start = now() + Duration::days(5);
        let stop = start + Duration::hours(1);
        assert!(!reducer.retain_program(start, stop, true, now()));
    }

    #[test]
    fn past_retention_window_bounds_old_programs() {
        let policy = policy_with(3);
        let reducer = EpgReducer::new(&policy);

        // inside the past window
        let start = now() - Duration::days(2);
        let stop = start + Duration::hours(1);
        assert!(reducer.retain_program(start, stop, false, now()));

        // entirely before the past window
        let start = now() - Duration::days(5);
        let stop = start + Duration::hours(1);
        assert!(!reducer.retain_program(start, stop, false, now()));
    }

    #[test]
    fn permissive_branch_drops_programs_older_than_a_year() {
        let policy = policy_with(0);
        let reducer = EpgReducer::new(&policy);
        let start = now() - Duration::days(400);
        let stop = start + Duration::hours(1);
        // start is still below the future horizon, so the union keeps it
        assert!(reducer.retain_program(start, stop, false, now()));

        // a start past the future horizon with a stop over a year old fails
        // every clause
        let start = now() + Duration::days(20);
        let stop = now() - Duration::days(400);
        assert!(!reducer.retain_program(start, stop, false, now()));
    }

    #[test]
    fn fallback_selects_overlapping_and_upcoming_channels() {
        let epg = r#"<tv>
  <programme start="20240615110000 +0000" stop="20240615130000 +0000" channel="live"/>
  <programme start="20240617120000 +0000" stop="20240617130000 +0000" channel="upcoming"/>
  <programme start="20240715120000 +0000" stop="20240715130000 +0000" channel="distant"/>
  <programme start="20240610110000 +0000" stop="20240610120000 +0000" channel="finished"/>
</tv>"#;
        let root = xmltv::parse_document(epg).unwrap();
        let channels = fallback_channels(&root, now());
        assert!(channels.contains("live"));
        assert!(channels.contains("upcoming"));
        assert!(!channels.contains("distant"));
        assert!(!channels.contains("finished"));
    }

    #[test]
    fn copy_program_clears_desc_text_keeps_attributes() {
        let mut programme = XmlElement::new("programme");
        let mut desc = XmlElement::new("desc");
        desc.attributes.push(("lang".to_string(), "ru".to_string()));
        desc.text = "A very long description".to_string();
        programme.children.push(desc);

        let copied = copy_program(&programme);
        assert_eq!(copied.children[0].text, "");
        assert_eq!(copied.children[0].attr("lang"), Some("ru"));
    }
}
