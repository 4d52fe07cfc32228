//! Per-table choice between clone, view and copy.

use crate::source::{TableId, TableOptions, WhereFilter};
use crate::state::ChangeFilter;
use common::types::Backend;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadType {
    Clone,
    Copy,
    View,
}

impl Display for LoadType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoadType::Clone => "clone",
            LoadType::Copy => "copy",
            LoadType::View => "view",
        };
        write!(f, "{s}")
    }
}

/// Facts the storage API reports about a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub id: TableId,
    pub backend: Backend,
    #[serde(default)]
    pub is_alias: bool,
    #[serde(default)]
    pub alias_columns_auto_sync: bool,
    #[serde(default)]
    pub alias_row_filter: bool,
}

/// Options of one requested transfer, with the change filter already
/// resolved against state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransferOptions {
    pub overwrite: bool,
    pub columns: Vec<String>,
    pub where_filter: Option<WhereFilter>,
    pub limit: Option<u64>,
    pub change_filter: ChangeFilter,
}

impl TransferOptions {
    pub fn for_table(options: &TableOptions, change_filter: ChangeFilter) -> Self {
        Self {
            overwrite: options.overwrite,
            columns: options.columns.clone(),
            where_filter: options.where_filter.clone(),
            limit: options.limit,
            change_filter,
        }
    }

    /// Anything that makes the transferred data differ from the full table.
    pub fn is_filtered(&self) -> bool {
        !self.change_filter.is_none()
            || self.where_filter.is_some()
            || !self.columns.is_empty()
            || self.limit.is_some()
    }
}

pub fn can_clone(meta: &TableMetadata, workspace: Backend, options: &TransferOptions) -> bool {
    if meta.backend != workspace || !workspace.supports_clone() || options.is_filtered() {
        return false;
    }
    // an alias row filter disables clone even when columns are auto-synced
    !meta.is_alias || (meta.alias_columns_auto_sync && !meta.alias_row_filter)
}

pub fn can_use_view(meta: &TableMetadata, workspace: Backend, options: &TransferOptions) -> bool {
    meta.backend == workspace && workspace.supports_view() && !meta.is_alias && options.overwrite
}

pub fn decide(meta: &TableMetadata, workspace: Backend, options: &TransferOptions) -> LoadType {
    if can_clone(meta, workspace, options) {
        LoadType::Clone
    } else if can_use_view(meta, workspace, options) {
        LoadType::View
    } else {
        LoadType::Copy
    }
}

/// Groups runs of equal load types, keeping input order.
pub fn group_consecutive<T>(decided: Vec<(LoadType, T)>) -> Vec<(LoadType, Vec<T>)> {
    let mut groups: Vec<(LoadType, Vec<T>)> = Vec::new();
    for (load_type, item) in decided {
        match groups.last_mut() {
            Some((current, items)) if *current == load_type => items.push(item),
            _ => groups.push((load_type, vec![item])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::config::components::inputs::WhereOperator;

    const BACKENDS: [Backend; 5] = [
        Backend::Snowflake,
        Backend::Bigquery,
        Backend::Synapse,
        Backend::Exasol,
        Backend::Teradata,
    ];

    fn meta(backend: Backend) -> TableMetadata {
        TableMetadata {
            id: "out.c-main.orders".parse().unwrap(),
            backend,
            is_alias: false,
            alias_columns_auto_sync: false,
            alias_row_filter: false,
        }
    }

    fn overwrite() -> TransferOptions {
        TransferOptions {
            overwrite: true,
            ..Default::default()
        }
    }

    #[test]
    fn snowflake_table_into_snowflake_workspace_clones() {
        let meta = meta(Backend::Snowflake);
        let options = TransferOptions::default();

        assert!(can_clone(&meta, Backend::Snowflake, &options));
        assert!(!can_use_view(&meta, Backend::Snowflake, &options));
        assert_eq!(decide(&meta, Backend::Snowflake, &options), LoadType::Clone);
    }

    #[test]
    fn mismatched_backends_never_clone_or_view() {
        for table in BACKENDS {
            for workspace in BACKENDS.into_iter().filter(|b| *b != table) {
                for options in [TransferOptions::default(), overwrite()] {
                    let meta = meta(table);
                    assert!(!can_clone(&meta, workspace, &options), "{table} -> {workspace}");
                    assert!(!can_use_view(&meta, workspace, &options), "{table} -> {workspace}");
                    assert_eq!(decide(&meta, workspace, &options), LoadType::Copy);
                }
            }
        }
    }

    #[test]
    fn any_filter_prevents_clone() {
        let meta = meta(Backend::Snowflake);
        let filtered = [
            TransferOptions {
                columns: vec!["id".into()],
                ..Default::default()
            },
            TransferOptions {
                where_filter: Some(WhereFilter {
                    column: "status".into(),
                    values: vec!["paid".into()],
                    operator: WhereOperator::Eq,
                }),
                ..Default::default()
            },
            TransferOptions {
                change_filter: ChangeFilter::Literal("-1 day".into()),
                ..Default::default()
            },
            TransferOptions {
                limit: Some(10),
                ..Default::default()
            },
        ];
        for options in filtered {
            assert!(!can_clone(&meta, Backend::Snowflake, &options), "{options:?}");
            assert_eq!(decide(&meta, Backend::Snowflake, &options), LoadType::Copy);
        }
    }

    #[test]
    fn aliases_clone_only_when_auto_synced_without_row_filter() {
        let mut alias = TableMetadata {
            is_alias: true,
            ..meta(Backend::Snowflake)
        };
        let options = TransferOptions::default();
        assert!(!can_clone(&alias, Backend::Snowflake, &options));

        alias.alias_columns_auto_sync = true;
        assert!(can_clone(&alias, Backend::Snowflake, &options));

        alias.alias_row_filter = true;
        assert!(!can_clone(&alias, Backend::Snowflake, &options));
    }

    #[test]
    fn bigquery_uses_views_for_overwriting_loads() {
        let meta = meta(Backend::Bigquery);
        assert!(!can_clone(&meta, Backend::Bigquery, &overwrite()));
        assert!(can_use_view(&meta, Backend::Bigquery, &overwrite()));
        assert_eq!(decide(&meta, Backend::Bigquery, &overwrite()), LoadType::View);

        let appending = TransferOptions::default();
        assert_eq!(decide(&meta, Backend::Bigquery, &appending), LoadType::Copy);

        let alias = TableMetadata {
            is_alias: true,
            ..meta
        };
        assert!(!can_use_view(&alias, Backend::Bigquery, &overwrite()));
    }

    #[test]
    fn grouping_merges_only_adjacent_runs() {
        let decided = vec![
            (LoadType::Clone, "a"),
            (LoadType::Clone, "b"),
            (LoadType::Copy, "c"),
            (LoadType::Clone, "d"),
        ];
        assert_eq!(
            group_consecutive(decided),
            vec![
                (LoadType::Clone, vec!["a", "b"]),
                (LoadType::Copy, vec!["c"]),
                (LoadType::Clone, vec!["d"]),
            ]
        );
        assert!(group_consecutive::<&str>(vec![]).is_empty());
    }
}
