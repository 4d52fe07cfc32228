//! Validated input specifications.
//!
//! The raw YAML shapes from `common::config` are checked exactly once here and
//! turned into a closed [`SourceSpec`]. Everything downstream can rely on a
//! spec naming exactly one table, or a non-empty file selection.

use crate::error::StagingError;
use crate::query::RelativeTime;
use common::config::components::inputs::{
    InputFileConfig, InputMappingConfig, InputTableConfig, TagConfig, TagMatch, WhereOperator,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub const ADAPTIVE_MARKER: &str = "adaptive";
pub const DEFAULT_FILE_LIMIT: u64 = 100;

static TABLE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(in|out)\.([A-Za-z0-9_-]+)\.([A-Za-z0-9_-]+)$").expect("table id pattern")
});

/// `{stage}.{bucket}.{table}`, e.g. `out.c-main.orders`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableId {
    stage: String,
    bucket: String,
    table: String,
}

impl TableId {
    pub fn new(stage: &str, bucket: &str, table: &str) -> Result<Self, StagingError> {
        format!("{stage}.{bucket}.{table}").parse()
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl FromStr for TableId {
    type Err = StagingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let caps = TABLE_ID.captures(raw).ok_or_else(|| {
            StagingError::invalid_spec(format!(
                "'{raw}' is not a table ID of the form {{stage}}.{{bucket}}.{{table}}"
            ))
        })?;
        Ok(Self {
            stage: caps[1].to_string(),
            bucket: caps[2].to_string(),
            table: caps[3].to_string(),
        })
    }
}

impl TryFrom<String> for TableId {
    type Error = StagingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TableId> for String {
    fn from(id: TableId) -> Self {
        id.to_string()
    }
}

impl Display for TableId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.stage, self.bucket, self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(rename = "match", default)]
    pub match_mode: TagMatch,
}

impl Tag {
    pub fn include(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            match_mode: TagMatch::Include,
        }
    }

    pub fn exclude(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            match_mode: TagMatch::Exclude,
        }
    }

    pub fn is_include(&self) -> bool {
        self.match_mode == TagMatch::Include
    }
}

impl From<&TagConfig> for Tag {
    fn from(cfg: &TagConfig) -> Self {
        Self {
            name: cfg.name().to_string(),
            match_mode: cfg.match_mode(),
        }
    }
}

/// How far back a source should be read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChangeSince {
    #[default]
    Empty,
    /// Relative expression, forwarded as written.
    Literal(RelativeTime),
    /// "Since the last successful run", resolved from persisted state.
    Adaptive,
}

impl ChangeSince {
    pub fn parse(raw: Option<&str>) -> Result<Self, StagingError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(ChangeSince::Empty),
            Some(ADAPTIVE_MARKER) => Ok(ChangeSince::Adaptive),
            Some(literal) => Ok(ChangeSince::Literal(literal.parse()?)),
        }
    }

    pub fn is_adaptive(&self) -> bool {
        matches!(self, ChangeSince::Adaptive)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhereFilter {
    pub column: String,
    pub values: Vec<String>,
    pub operator: WhereOperator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOptions {
    pub destination: String,
    pub change_since: ChangeSince,
    pub columns: Vec<String>,
    pub where_filter: Option<WhereFilter>,
    pub limit: Option<u64>,
    pub overwrite: bool,
}

impl TableOptions {
    /// Unfiltered, non-overwriting options for `destination`.
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            change_since: ChangeSince::Empty,
            columns: Vec::new(),
            where_filter: None,
            limit: None,
            overwrite: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInput {
    pub source: TableId,
    pub options: TableOptions,
}

impl TableInput {
    pub fn new(source: TableId) -> Self {
        let destination = source.to_string();
        Self {
            source,
            options: TableOptions::new(destination),
        }
    }
}

/// A table located by a metadata key/value pair instead of its ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSearchInput {
    pub key: String,
    pub value: String,
    pub options: TableOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInput {
    pub tags: Vec<Tag>,
    pub query: Option<String>,
    pub destination: Option<String>,
    pub change_since: ChangeSince,
    pub processed_tags: Vec<String>,
    pub limit: u64,
    pub overwrite: bool,
}

impl FileInput {
    pub fn tagged(tags: Vec<Tag>) -> Self {
        Self {
            tags,
            query: None,
            destination: None,
            change_since: ChangeSince::Empty,
            processed_tags: Vec::new(),
            limit: DEFAULT_FILE_LIMIT,
            overwrite: false,
        }
    }

    pub fn include_tags(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter().filter(|tag| tag.is_include())
    }

    pub fn describe(&self) -> String {
        let tags = self
            .tags
            .iter()
            .map(|tag| match tag.match_mode {
                TagMatch::Include => tag.name.clone(),
                TagMatch::Exclude => format!("!{}", tag.name),
            })
            .collect::<Vec<_>>()
            .join(", ");
        match &self.query {
            Some(query) if tags.is_empty() => format!("files matching '{query}'"),
            Some(query) => format!("files tagged [{tags}] matching '{query}'"),
            None => format!("files tagged [{tags}]"),
        }
    }
}

/// One entry of an input mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    TableById(TableInput),
    TableBySearch(TableSearchInput),
    FileByTags(FileInput),
    FileByQuery(FileInput),
}

impl SourceSpec {
    pub fn from_mapping(mapping: &InputMappingConfig) -> Result<Vec<Self>, StagingError> {
        let tables = mapping.tables.iter().map(Self::from_table_config);
        let files = mapping.files.iter().map(Self::from_file_config);
        tables.chain(files).collect()
    }

    pub fn from_table_config(cfg: &InputTableConfig) -> Result<Self, StagingError> {
        if !cfg.tags.is_empty() {
            return Err(StagingError::invalid_spec(format!(
                "table input '{}' declares tags; tags only select files",
                cfg.source.as_deref().unwrap_or("<search>")
            )));
        }
        if cfg.limit == Some(0) {
            return Err(StagingError::invalid_spec("table input limit must be positive"));
        }

        let where_filter = match (&cfg.where_column, cfg.where_values.is_empty()) {
            (Some(column), false) => Some(WhereFilter {
                column: column.clone(),
                values: cfg.where_values.clone(),
                operator: cfg.where_operator,
            }),
            (Some(column), true) => {
                return Err(StagingError::invalid_spec(format!(
                    "where_column '{column}' given without where_values"
                )))
            }
            (None, false) => {
                return Err(StagingError::invalid_spec(
                    "where_values given without where_column",
                ))
            }
            (None, true) => None,
        };
        let change_since = ChangeSince::parse(cfg.changed_since.as_deref())?;

        match (&cfg.source, &cfg.source_search) {
            (Some(source), None) => {
                let source: TableId = source.parse()?;
                let destination = cfg
                    .destination
                    .clone()
                    .unwrap_or_else(|| source.to_string());
                Ok(SourceSpec::TableById(TableInput {
                    source,
                    options: TableOptions {
                        destination,
                        change_since,
                        columns: cfg.columns.clone(),
                        where_filter,
                        limit: cfg.limit,
                        overwrite: cfg.overwrite,
                    },
                }))
            }
            (None, Some(search)) => {
                if search.key.trim().is_empty() || search.value.trim().is_empty() {
                    return Err(StagingError::invalid_spec(
                        "source_search requires both key and value",
                    ));
                }
                let destination = cfg.destination.clone().ok_or_else(|| {
                    StagingError::invalid_spec(format!(
                        "table searched by '{}={}' needs an explicit destination",
                        search.key, search.value
                    ))
                })?;
                Ok(SourceSpec::TableBySearch(TableSearchInput {
                    key: search.key.clone(),
                    value: search.value.clone(),
                    options: TableOptions {
                        destination,
                        change_since,
                        columns: cfg.columns.clone(),
                        where_filter,
                        limit: cfg.limit,
                        overwrite: cfg.overwrite,
                    },
                }))
            }
            (Some(source), Some(_)) => Err(StagingError::invalid_spec(format!(
                "table input '{source}' sets both source and source_search"
            ))),
            (None, None) => Err(StagingError::invalid_spec(
                "table input sets neither source nor source_search",
            )),
        }
    }

    pub fn from_file_config(cfg: &InputFileConfig) -> Result<Self, StagingError> {
        let tags: Vec<Tag> = cfg.tags.iter().map(Tag::from).collect();
        if tags.iter().any(|tag| tag.name.trim().is_empty()) {
            return Err(StagingError::invalid_spec("file input contains an empty tag"));
        }
        if cfg.processed_tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(StagingError::invalid_spec(
                "file input contains an empty processed tag",
            ));
        }
        if cfg.limit == Some(0) {
            return Err(StagingError::invalid_spec("file input limit must be positive"));
        }

        let query = cfg
            .query
            .as_ref()
            .map(|query| query.trim().to_string())
            .filter(|query| !query.is_empty());
        let has_include = tags.iter().any(Tag::is_include);

        let input = FileInput {
            tags,
            query,
            destination: cfg.destination.clone(),
            change_since: ChangeSince::parse(cfg.changed_since.as_deref())?,
            processed_tags: cfg.processed_tags.clone(),
            limit: cfg.limit.unwrap_or(DEFAULT_FILE_LIMIT),
            overwrite: cfg.overwrite,
        };

        match (has_include, input.query.is_some()) {
            (true, _) => Ok(SourceSpec::FileByTags(input)),
            (false, true) => Ok(SourceSpec::FileByQuery(input)),
            (false, false) if input.tags.is_empty() => Err(StagingError::invalid_spec(
                "file input needs tags or a query",
            )),
            (false, false) => Err(StagingError::invalid_spec(format!(
                "{} only excludes; add an include tag or a query",
                input.describe()
            ))),
        }
    }

    pub fn change_since(&self) -> &ChangeSince {
        match self {
            SourceSpec::TableById(input) => &input.options.change_since,
            SourceSpec::TableBySearch(input) => &input.options.change_since,
            SourceSpec::FileByTags(input) | SourceSpec::FileByQuery(input) => &input.change_since,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            SourceSpec::TableById(input) => format!("table '{}'", input.source),
            SourceSpec::TableBySearch(input) => {
                format!("table searched by '{}={}'", input.key, input.value)
            }
            SourceSpec::FileByTags(input) | SourceSpec::FileByQuery(input) => input.describe(),
        }
    }
}
