use serde::{Deserialize, Serialize};

///  ---------------- Input mapping config ----------------
///
/// Raw shapes as written in `stager.yml`. They are loosely typed on purpose;
/// the staging crate validates them into its closed source specification.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct InputMappingConfig {
    #[serde(default)]
    pub tables: Vec<InputTableConfig>,
    #[serde(default)]
    pub files: Vec<InputFileConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct InputTableConfig {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub source_search: Option<SourceSearchConfig>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub changed_since: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub where_column: Option<String>,
    #[serde(default)]
    pub where_values: Vec<String>,
    #[serde(default)]
    pub where_operator: WhereOperator,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub overwrite: bool,
    /// Tags are meaningless on tables; kept so validation can reject them.
    #[serde(default)]
    pub tags: Vec<TagConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SourceSearchConfig {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WhereOperator {
    #[default]
    Eq,
    Ne,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct InputFileConfig {
    #[serde(default)]
    pub tags: Vec<TagConfig>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub changed_since: Option<String>,
    #[serde(default)]
    pub processed_tags: Vec<String>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum TagMatch {
    #[default]
    Include,
    Exclude,
}

/// A tag is either a bare name (include) or `{name, match}`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TagConfig {
    Name(String),
    Detailed {
        name: String,
        #[serde(default, rename = "match")]
        match_mode: TagMatch,
    },
}

impl TagConfig {
    pub fn name(&self) -> &str {
        match self {
            TagConfig::Name(name) => name,
            TagConfig::Detailed { name, .. } => name,
        }
    }

    pub fn match_mode(&self) -> TagMatch {
        match self {
            TagConfig::Name(_) => TagMatch::Include,
            TagConfig::Detailed { match_mode, .. } => *match_mode,
        }
    }
}
