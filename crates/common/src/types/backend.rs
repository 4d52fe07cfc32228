use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Storage backend of a bucket or of a compute workspace.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Snowflake,
    Bigquery,
    Synapse,
    Exasol,
    Teradata,
}

impl Backend {
    /// Backend can duplicate a table into a workspace without moving rows.
    pub fn supports_clone(&self) -> bool {
        matches!(self, Backend::Snowflake)
    }

    /// Backend can expose a storage table to a workspace as a live view.
    pub fn supports_view(&self) -> bool {
        matches!(self, Backend::Bigquery)
    }

    /// Backend accepts a single load job mixing clone and copy tables.
    pub fn supports_mixed_load_jobs(&self) -> bool {
        matches!(self, Backend::Snowflake | Backend::Bigquery)
    }
}

impl Display for Backend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Snowflake => write!(f, "snowflake"),
            Backend::Bigquery => write!(f, "bigquery"),
            Backend::Synapse => write!(f, "synapse"),
            Backend::Exasol => write!(f, "exasol"),
            Backend::Teradata => write!(f, "teradata"),
        }
    }
}

/// File storage provider behind an object store staging target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStoreKind {
    S3,
    Abs,
}

impl Display for ObjectStoreKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectStoreKind::S3 => write!(f, "s3"),
            ObjectStoreKind::Abs => write!(f, "abs"),
        }
    }
}
