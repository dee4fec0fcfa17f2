use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The subset of a parsed model node that python model execution needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ParsedModel {
    pub name: String,
    #[serde(default)]
    pub package_name: String,
    pub database: String,
    pub schema: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
}

impl ParsedModel {
    /// The relation name the model materializes to: its alias, or its name
    /// when no alias is configured.
    pub fn relation_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}
