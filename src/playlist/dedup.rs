//! Duplicate resolution for filtered playlist entries
//!
//! Providers advertise the same channel several times: SD/HD/4K variants,
//! "orig" feeds, and plain re-listings that differ only in recording depth.
//! Entries are grouped by a normalized display name with quality tokens
//! removed, then each group is reduced to a single representative.

use std::collections::HashMap;

use regex::Regex;
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::models::PlaylistEntry;

/// Quality/version tokens removed (as whole words) when grouping variants.
/// Order matters: it mirrors the removal order the grouping key is defined
/// by, so "full hd" drops its "hd" before the multi-word token is tried.
const QUALITY_TOKENS: [&str; 7] = ["hd", "orig", "sd", "full hd", "4k", "uhd", "uhd tv"];

/// Groups entries by normalized name and picks one representative per group
pub struct DuplicateResolver {
    patterns: Vec<Regex>,
}

impl DuplicateResolver {
    pub fn new() -> AppResult<Self> {
        let patterns = QUALITY_TOKENS
            .iter()
            .map(|token| {
                Regex::new(&format!(r"\s*\b{token}\b\s*"))
                    .map_err(|e| AppError::internal(format!("invalid quality token pattern: {e}")))
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    /// Normalize a display name for grouping: case-folded, quality tokens
    /// removed as whole words, whitespace collapsed
    pub fn normalize(&self, name: &str) -> String {
        let mut normalized = name.to_lowercase();
        for pattern in &self.patterns {
            normalized = pattern.replace_all(&normalized, " ").into_owned();
        }
        normalized.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Reduce each duplicate group to one entry.
    ///
    /// Within a group, HD variants shadow non-HD variants when both exist.
    /// Among the remaining variants the highest recording priority wins;
    /// ties keep the first encountered. Group winners are emitted at the
    /// position of the group's first occurrence, keeping survivor order
    /// stable relative to the input.
    pub fn resolve(&self, entries: Vec<PlaylistEntry>) -> Vec<PlaylistEntry> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<PlaylistEntry>> = HashMap::new();

        for entry in entries {
            let key = self.normalize(&entry.display_name);
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().push(entry);
        }

        order
            .into_iter()
            .filter_map(|key| groups.remove(&key).and_then(select_representative))
            .collect()
    }
}

/// Pick the surviving variant of one duplicate group
fn select_representative(variants: Vec<PlaylistEntry>) -> Option<PlaylistEntry> {
    let any_hd = variants.iter().any(is_hd_variant);
    let any_non_hd = variants.iter().any(|e| !is_hd_variant(e));

    let pool: Vec<PlaylistEntry> = if any_hd && any_non_hd {
        let (hd, removed): (Vec<_>, Vec<_>) = variants.into_iter().partition(is_hd_variant);
        for entry in &removed {
            debug!("Removing non-HD variant: {}", entry.display_name);
        }
        hd
    } else {
        variants
    };

    if pool.len() > 1 {
        debug!(
            "Resolving {} duplicate variants of '{}'",
            pool.len(),
            pool[0].display_name
        );
    }

    pool.into_iter().reduce(|best, candidate| {
        if candidate.recording_priority() > best.recording_priority() {
            candidate
        } else {
            best
        }
    })
}

fn is_hd_variant(entry: &PlaylistEntry) -> bool {
    entry.display_name.to_lowercase().contains(" hd")
}
