use std::collections::BTreeMap;
use std::sync::Arc;

use arrow_array::RecordBatch;
use dbt_common::{ErrorCode, FsResult, fs_err};
use serde_json::Value as JsonValue;

use super::namespace::{DbtObjConstructor, DbtObject, RefReader};

/// Relations and config a compiled model resolved at compile time.
///
/// [ModelRelations::into_constructor] turns them into a `dbtObj`
/// constructor for runtimes that don't define their own.
#[derive(Debug, Clone, Default)]
pub struct ModelRelations {
    refs: BTreeMap<String, String>,
    sources: BTreeMap<(String, String), String>,
    config: BTreeMap<String, JsonValue>,
    this: Option<String>,
}

impl ModelRelations {
    pub fn new() -> Self {
        Self::default()
    }

    /// `name` may be package qualified (`package.model`).
    pub fn with_ref(mut self, name: impl Into<String>, relation: impl Into<String>) -> Self {
        self.refs.insert(name.into(), relation.into());
        self
    }

    pub fn with_source(
        mut self,
        source_name: impl Into<String>,
        table_name: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        self.sources
            .insert((source_name.into(), table_name.into()), relation.into());
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    pub fn with_this(mut self, relation: impl Into<String>) -> Self {
        self.this = Some(relation.into());
        self
    }

    pub fn into_constructor(self) -> DbtObjConstructor {
        let relations = Arc::new(self);
        Arc::new(move |ref_reader: RefReader| -> FsResult<Box<dyn DbtObject>> {
            Ok(Box::new(ResolvedDbtObj {
                relations: relations.clone(),
                ref_reader,
            }) as Box<dyn DbtObject>)
        })
    }
}

pub struct ResolvedDbtObj {
    relations: Arc<ModelRelations>,
    ref_reader: RefReader,
}

impl DbtObject for ResolvedDbtObj {
    fn ref_table(&self, name: &str) -> FsResult<RecordBatch> {
        let relation = self.relations.refs.get(name).ok_or_else(|| {
            fs_err!(
                ErrorCode::UndefinedField,
                "dbt.ref('{}') is not a dependency of this model",
                name
            )
        })?;
        (self.ref_reader)(relation)
    }

    fn source(&self, source_name: &str, table_name: &str) -> FsResult<RecordBatch> {
        let key = (source_name.to_string(), table_name.to_string());
        let relation = self.relations.sources.get(&key).ok_or_else(|| {
            fs_err!(
                ErrorCode::UndefinedField,
                "dbt.source('{}', '{}') is not a dependency of this model",
                source_name,
                table_name
            )
        })?;
        (self.ref_reader)(relation)
    }

    fn config_get(&self, key: &str) -> Option<JsonValue> {
        self.relations.config.get(key).cloned()
    }

    fn this(&self) -> Option<String> {
        self.relations.this.clone()
    }
}
