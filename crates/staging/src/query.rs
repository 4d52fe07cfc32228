//! File search query construction.

use crate::error::StagingError;
use crate::source::{ChangeSince, FileInput, Tag};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use common::config::components::inputs::TagMatch;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

static RELATIVE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^-?\s*(\d+)\s*(minutes?|mins?|m|hours?|h|days?|d|weeks?|w)(?:\s+ago)?$",
    )
    .expect("relative time pattern")
});

/// A "N units ago" expression. The original text is kept verbatim because
/// table exports forward it to the storage API unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativeTime {
    raw: String,
    duration: TimeDelta,
}

impl RelativeTime {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn duration(&self) -> TimeDelta {
        self.duration
    }

    pub fn resolve(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, StagingError> {
        now.checked_sub_signed(self.duration).ok_or_else(|| {
            StagingError::invalid_spec(format!(
                "changed_since '{}' reaches before the earliest representable time",
                self.raw
            ))
        })
    }
}

impl FromStr for RelativeTime {
    type Err = StagingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let caps = RELATIVE_TIME.captures(trimmed).ok_or_else(|| {
            StagingError::invalid_spec(format!(
                "changed_since '{raw}' is neither 'adaptive' nor a relative time such as '-5 days'"
            ))
        })?;
        let out_of_range =
            || StagingError::invalid_spec(format!("changed_since '{raw}' amount is out of range"));
        let amount: i64 = caps[1].parse().map_err(|_| out_of_range())?;
        let duration = match caps[2].to_ascii_lowercase().chars().next() {
            Some('m') => TimeDelta::try_minutes(amount),
            Some('h') => TimeDelta::try_hours(amount),
            Some('d') => TimeDelta::try_days(amount),
            _ => TimeDelta::try_weeks(amount),
        }
        .ok_or_else(out_of_range)?;
        Ok(Self {
            raw: trimmed.to_string(),
            duration,
        })
    }
}

impl Display for RelativeTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn tag_clause(tag: &Tag) -> String {
    match tag.match_mode {
        TagMatch::Include => format!("tags:\"{}\"", tag.name),
        TagMatch::Exclude => format!("NOT tags:\"{}\"", tag.name),
    }
}

/// Conjunction of tag clauses in input order, `None` without tags.
pub fn tag_conjunction(tags: &[Tag]) -> Option<String> {
    if tags.is_empty() {
        return None;
    }
    Some(tags.iter().map(tag_clause).collect::<Vec<_>>().join(" AND "))
}

pub fn created_since_clause(since: DateTime<Utc>) -> String {
    format!(
        "created:[\"{}\" TO *]",
        since.to_rfc3339_opts(SecondsFormat::Secs, false)
    )
}

/// Search query for a file input, evaluated against `now`.
///
/// Only literal change filters end up in the query; adaptive inputs are
/// narrowed by the stored marker instead. An input without tags and query
/// yields an empty string, which callers treat as "no filter".
pub fn build_query(input: &FileInput, now: DateTime<Utc>) -> Result<String, StagingError> {
    let created = match &input.change_since {
        ChangeSince::Literal(relative) => Some(created_since_clause(relative.resolve(now)?)),
        ChangeSince::Empty | ChangeSince::Adaptive => None,
    };
    Ok(compose(input, created))
}

/// Query selecting the files of `input` regardless of its change filter.
pub fn selection_query(input: &FileInput) -> String {
    compose(input, None)
}

fn compose(input: &FileInput, created: Option<String>) -> String {
    let parts = [input.query.clone(), tag_conjunction(&input.tags)];
    if created.is_none() && parts.iter().flatten().count() <= 1 {
        return parts.into_iter().flatten().next().unwrap_or_default();
    }

    parts
        .into_iter()
        .flatten()
        .map(|part| format!("({part})"))
        .chain(created)
        .collect::<Vec<_>>()
        .join(" AND ")
}
