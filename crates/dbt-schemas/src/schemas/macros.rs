use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub struct DbtMacro {
    pub name: String,
    pub package_name: String,
    pub path: PathBuf,
    pub unique_id: String,
    pub macro_sql: String,
    pub description: Option<String>,
}

impl DbtMacro {
    /// Builds a macro record with the conventional `macro.<package>.<name>` id.
    pub fn new(
        package_name: impl Into<String>,
        name: impl Into<String>,
        macro_sql: impl Into<String>,
    ) -> Self {
        let package_name = package_name.into();
        let name = name.into();
        DbtMacro {
            unique_id: format!("macro.{package_name}.{name}"),
            path: PathBuf::from(format!("macros/{name}.sql")),
            name,
            package_name,
            macro_sql: macro_sql.into(),
            description: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macro_unique_id() {
        let m = DbtMacro::new("dbt_pal", "materialization_table_pal", "{% macro x() %}{% endmacro %}");
        assert_eq!(m.unique_id, "macro.dbt_pal.materialization_table_pal");
        assert_eq!(m.path, PathBuf::from("macros/materialization_table_pal.sql"));
    }
}
