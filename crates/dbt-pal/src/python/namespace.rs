use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use arrow_array::RecordBatch;
use dbt_common::{ErrorCode, FsResult, err};
use serde_json::Value as JsonValue;

/// Reads a fully qualified table into memory.
pub type RefReader = Arc<dyn Fn(&str) -> FsResult<RecordBatch> + Send + Sync>;

/// `model(dbt, session)`: returns the table to materialize, if any.
pub type ModelFunction =
    Arc<dyn Fn(&dyn DbtObject, Option<&dyn Any>) -> FsResult<Option<RecordBatch>> + Send + Sync>;

/// `dbtObj(ref_reader)`
pub type DbtObjConstructor = Arc<dyn Fn(RefReader) -> FsResult<Box<dyn DbtObject>> + Send + Sync>;

/// The `dbt` argument a python model receives.
pub trait DbtObject: Send + Sync {
    /// `dbt.ref(name)`
    fn ref_table(&self, name: &str) -> FsResult<RecordBatch>;

    /// `dbt.source(source_name, table_name)`
    fn source(&self, source_name: &str, table_name: &str) -> FsResult<RecordBatch>;

    /// `dbt.config.get(key)`
    fn config_get(&self, key: &str) -> Option<JsonValue>;

    /// `dbt.this`
    fn this(&self) -> Option<String> {
        None
    }
}

#[derive(Clone)]
pub enum NamespaceEntry {
    Model(ModelFunction),
    DbtObj(DbtObjConstructor),
    Value(JsonValue),
}

impl fmt::Debug for NamespaceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamespaceEntry::Model(_) => write!(f, "Model(<function>)"),
            NamespaceEntry::DbtObj(_) => write!(f, "DbtObj(<constructor>)"),
            NamespaceEntry::Value(v) => write!(f, "Value({v})"),
        }
    }
}

/// Names defined by executing one compiled python model.
#[derive(Debug, Clone, Default)]
pub struct CompiledModelNamespace {
    entries: BTreeMap<String, NamespaceEntry>,
}

impl CompiledModelNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: NamespaceEntry) {
        self.entries.insert(name.into(), entry);
    }

    pub fn define_model<F>(&mut self, f: F)
    where
        F: Fn(&dyn DbtObject, Option<&dyn Any>) -> FsResult<Option<RecordBatch>>
            + Send
            + Sync
            + 'static,
    {
        self.insert("model", NamespaceEntry::Model(Arc::new(f)));
    }

    pub fn define_dbt_obj<F>(&mut self, f: F)
    where
        F: Fn(RefReader) -> FsResult<Box<dyn DbtObject>> + Send + Sync + 'static,
    {
        self.insert("dbtObj", NamespaceEntry::DbtObj(Arc::new(f)));
    }

    pub fn get(&self, name: &str) -> Option<&NamespaceEntry> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// The `model` entry point.
    pub fn model(&self) -> FsResult<ModelFunction> {
        match self.entries.get("model") {
            Some(NamespaceEntry::Model(f)) => Ok(f.clone()),
            Some(other) => err!(
                ErrorCode::MalformedPythonModel,
                "Compiled python model defines `model` as {:?}, expected a function `model(dbt, session)`",
                other
            ),
            None => err!(
                ErrorCode::MalformedPythonModel,
                "Compiled python model does not define `model(dbt, session)`"
            ),
        }
    }

    /// The `dbtObj` constructor.
    pub fn dbt_obj(&self) -> FsResult<DbtObjConstructor> {
        match self.entries.get("dbtObj") {
            Some(NamespaceEntry::DbtObj(f)) => Ok(f.clone()),
            Some(other) => err!(
                ErrorCode::MalformedPythonModel,
                "Compiled python model defines `dbtObj` as {:?}, expected a constructor `dbtObj(load_df_function)`",
                other
            ),
            None => err!(
                ErrorCode::MalformedPythonModel,
                "Compiled python model does not define `dbtObj`"
            ),
        }
    }
}

/// Executes sanitized python model source, populating the namespace with
/// the names it defines.
pub trait ModelRuntime: Send + Sync {
    fn exec(&self, source: &str, namespace: &mut CompiledModelNamespace) -> FsResult<()>;
}
