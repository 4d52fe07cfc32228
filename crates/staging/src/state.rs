//! Adaptive input state.
//!
//! A [`StateSnapshot`] remembers, per source, the change marker the storage
//! API reported on the last successful transfer. Markers are opaque: they go
//! back to the API exactly as they came out of it.

use crate::source::{ChangeSince, FileInput, TableId, Tag};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Canonical identity of a source across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKey {
    /// Kept as raw text so a damaged state file surfaces as a resolution
    /// error instead of a deserialisation failure.
    Table(String),
    Files {
        tags: Vec<Tag>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<String>,
    },
}

impl SourceKey {
    pub fn table(id: &TableId) -> Self {
        SourceKey::Table(id.to_string())
    }

    /// Tag order and duplicates do not change the key.
    pub fn files(input: &FileInput) -> Self {
        let mut tags = input.tags.clone();
        tags.sort();
        tags.dedup();
        SourceKey::Files {
            tags,
            query: input.query.clone(),
        }
    }
}

impl Display for SourceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKey::Table(id) => write!(f, "table:{id}"),
            SourceKey::Files { tags, query } => {
                let tags = tags
                    .iter()
                    .map(|tag| {
                        if tag.is_include() {
                            tag.name.clone()
                        } else {
                            format!("!{}", tag.name)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                match query {
                    Some(query) => write!(f, "files:[{tags}]?{query}"),
                    None => write!(f, "files:[{tags}]"),
                }
            }
        }
    }
}

/// Last-seen change marker (timestamp or version token) as issued remotely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Marker(String);

impl Marker {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Marker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Filter actually sent with a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ChangeFilter {
    #[default]
    None,
    /// Relative expression forwarded untouched.
    Literal(String),
    /// Strictly newer than the stored marker.
    After(Marker),
}

impl ChangeFilter {
    pub fn is_none(&self) -> bool {
        matches!(self, ChangeFilter::None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub source: SourceKey,
    pub marker: Marker,
}

/// Ordered, immutable set of state entries. Serialises as a list of
/// [`StateEntry`] values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<StateEntry>", into = "Vec<StateEntry>")]
pub struct StateSnapshot {
    entries: BTreeMap<SourceKey, Marker>,
}

impl StateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SourceKey) -> Option<&Marker> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &SourceKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SourceKey, &Marker)> {
        self.entries.iter()
    }

    /// Copy of `self` with `key` set to `marker`.
    pub fn with_entry(&self, key: SourceKey, marker: Marker) -> Self {
        let mut entries = self.entries.clone();
        entries.insert(key, marker);
        Self { entries }
    }

    /// Union of both snapshots; entries of `newer` win on equal keys.
    pub fn merge(&self, newer: &StateSnapshot) -> Self {
        let mut entries = self.entries.clone();
        entries.extend(
            newer
                .entries
                .iter()
                .map(|(key, marker)| (key.clone(), marker.clone())),
        );
        Self { entries }
    }
}

impl FromIterator<(SourceKey, Marker)> for StateSnapshot {
    fn from_iter<I: IntoIterator<Item = (SourceKey, Marker)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<StateEntry>> for StateSnapshot {
    fn from(entries: Vec<StateEntry>) -> Self {
        entries
            .into_iter()
            .map(|entry| (entry.source, entry.marker))
            .collect()
    }
}

impl From<StateSnapshot> for Vec<StateEntry> {
    fn from(snapshot: StateSnapshot) -> Self {
        snapshot
            .entries
            .into_iter()
            .map(|(source, marker)| StateEntry { source, marker })
            .collect()
    }
}

/// Effective filter for `key` under `change_since`.
///
/// Only adaptive inputs consult `prior`; without an entry they fetch
/// everything.
pub fn resolve_change_filter(
    change_since: &ChangeSince,
    prior: &StateSnapshot,
    key: &SourceKey,
) -> ChangeFilter {
    match change_since {
        ChangeSince::Empty => ChangeFilter::None,
        ChangeSince::Literal(relative) => ChangeFilter::Literal(relative.as_str().to_string()),
        ChangeSince::Adaptive => prior
            .get(key)
            .cloned()
            .map(ChangeFilter::After)
            .unwrap_or_default(),
    }
}

/// Snapshot after a successful transfer of `key`.
///
/// `marker` is `None` when the transfer matched nothing; the previous entry is
/// then carried forward untouched.
pub fn update_state(prior: &StateSnapshot, key: SourceKey, marker: Option<Marker>) -> StateSnapshot {
    match marker {
        Some(marker) => prior.with_entry(key, marker),
        None => prior.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> SourceKey {
        SourceKey::table(&"out.c-main.orders".parse().unwrap())
    }

    #[test]
    fn non_adaptive_inputs_ignore_state() {
        let prior = StateSnapshot::new().with_entry(orders(), Marker::new("2026-10-01T00:00:00+0000"));

        assert_eq!(
            resolve_change_filter(&ChangeSince::Empty, &prior, &orders()),
            ChangeFilter::None
        );
        let literal = ChangeSince::parse(Some("-2 days")).unwrap();
        assert_eq!(
            resolve_change_filter(&literal, &prior, &orders()),
            ChangeFilter::Literal("-2 days".into())
        );
    }

    #[test]
    fn adaptive_without_entry_fetches_everything() {
        assert_eq!(
            resolve_change_filter(&ChangeSince::Adaptive, &StateSnapshot::new(), &orders()),
            ChangeFilter::None
        );
    }

    #[test]
    fn adaptive_round_trip_yields_after_stored_marker() {
        let marker = Marker::new("2026-10-16 12:00:01 +0200");
        let state = update_state(&StateSnapshot::new(), orders(), Some(marker.clone()));

        assert_eq!(
            resolve_change_filter(&ChangeSince::Adaptive, &state, &orders()),
            ChangeFilter::After(marker)
        );
    }

    #[test]
    fn empty_fetch_carries_marker_forward() {
        let first = update_state(&StateSnapshot::new(), orders(), Some(Marker::new("M")));
        let second = update_state(&first, orders(), None);

        assert_eq!(second.get(&orders()), Some(&Marker::new("M")));
        assert_eq!(second, first);
    }

    #[test]
    fn markers_are_stored_verbatim() {
        let odd = Marker::new("  v=17;ts=2026-10-16T00:00:00.000001Z  ");
        let state = update_state(&StateSnapshot::new(), orders(), Some(odd.clone()));
        let json = serde_json::to_string(&state).unwrap();
        let back: StateSnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(back.get(&orders()), Some(&odd));
    }

    #[test]
    fn update_never_drops_untouched_entries() {
        let other = SourceKey::table(&"in.c-raw.events".parse().unwrap());
        let prior = StateSnapshot::new().with_entry(other.clone(), Marker::new("1"));
        let next = update_state(&prior, orders(), Some(Marker::new("2")));

        assert_eq!(next.len(), 2);
        assert_eq!(next.get(&other), Some(&Marker::new("1")));
    }

    #[test]
    fn file_keys_ignore_tag_order() {
        let a = FileInput::tagged(vec![Tag::include("a"), Tag::exclude("b")]);
        let b = FileInput::tagged(vec![Tag::exclude("b"), Tag::include("a"), Tag::include("a")]);
        assert_eq!(SourceKey::files(&a), SourceKey::files(&b));
        assert_eq!(SourceKey::files(&a).to_string(), "files:[a,!b]");
    }

    #[test]
    fn snapshot_serialises_as_entry_list() {
        let state = StateSnapshot::new().with_entry(orders(), Marker::new("M"));
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{ "source": { "table": "out.c-main.orders" }, "marker": "M" }])
        );
    }
}
