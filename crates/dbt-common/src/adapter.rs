use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// The type of the adapter.
///
/// Used to identify the specific database adapter being used. Adapters that
/// are not listed here are still loadable through the adapter registry by
/// their plain type name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, Deserialize, Serialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum AdapterType {
    /// The facade adapter that delegates to a concrete backend
    Pal,
    /// Postgres
    Postgres,
    /// Snowflake
    Snowflake,
    /// Bigquery
    Bigquery,
    /// Databricks
    Databricks,
    /// Redshift
    Redshift,
}

impl AdapterType {
    /// Name of the package that ships the internal macros of this adapter.
    pub fn macro_package_name(&self) -> String {
        format!("dbt_{self}")
    }
}
