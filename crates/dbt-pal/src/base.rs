use std::any::Any;
use std::fmt;
use std::sync::Arc;

use arrow_array::{RecordBatch, RecordBatchReader};
use dbt_common::{FsError, FsResult, not_implemented_err};
use dbt_schemas::schemas::nodes::ParsedModel;
use minijinja::value::{Object, ObjectRepr, from_args};
use minijinja::{Error as MinijinjaError, ErrorKind as MinijinjaErrorKind, State, Value};
use strum_macros::{AsRefStr, Display};

use crate::response::AdapterResponse;

/// Connection parameters of one profile target.
///
/// Backends expose their own fields through [Credentials::get_field], which
/// is how callers reach attributes this trait does not name.
pub trait Credentials: fmt::Debug + Send + Sync {
    /// The `type` discriminator the adapter registry keys on
    fn adapter_type(&self) -> String;

    fn database(&self) -> String;

    fn schema(&self) -> String;

    /// Field identifying the warehouse (account, host, project...)
    fn unique_field(&self) -> Option<String>;

    /// Keys shown when the connection is described to the user
    fn connection_keys(&self) -> Vec<String>;

    /// Lookup of any credentials attribute by name. `"type"` is answered by
    /// [Credentials::adapter_type].
    fn get_field(&self, name: &str) -> FsResult<serde_json::Value>;

    fn as_any(&self) -> &dyn Any;
}

/// Fully qualified destination of a load job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub database: String,
    pub schema: String,
    pub identifier: String,
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.schema, self.identifier)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteDisposition {
    /// Delete all existing rows, then load
    WriteTruncate,
    WriteAppend,
    /// Fail unless the destination is empty
    WriteEmpty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadJobConfig {
    pub write_disposition: WriteDisposition,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadJob {
    pub output_rows: u64,
}

/// Query and load client handed out by a backend connection.
pub trait WarehouseClient: Send + Sync {
    fn query(&self, sql: &str) -> FsResult<Box<dyn RecordBatchReader + Send>>;

    /// Runs a load job to completion.
    fn load_table(
        &self,
        batch: &RecordBatch,
        table: &TableRef,
        config: &LoadJobConfig,
    ) -> FsResult<LoadJob>;
}

#[derive(Clone)]
pub struct Connection {
    pub name: String,
    pub handle: Arc<dyn WarehouseClient>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

pub trait ConnectionManager: Send + Sync {
    /// The connection bound to the calling thread, opened on first use.
    fn get_thread_connection(&self) -> FsResult<Connection>;
}

/// Type queries to be implemented for every [BaseAdapter]
pub trait AdapterTyping {
    /// Get name/type of this adapter
    fn adapter_type(&self) -> String;
}

/// Base adapter
pub trait BaseAdapter: fmt::Debug + AdapterTyping + Send + Sync {
    fn connections(&self) -> &dyn ConnectionManager;

    /// Execute a statement on the thread connection.
    fn execute(&self, sql: &str) -> FsResult<AdapterResponse> {
        let conn = self.connections().get_thread_connection()?;
        let mut rows = 0;
        for batch in conn.handle.query(sql)? {
            rows += batch?.num_rows() as i64;
        }
        Ok(AdapterResponse {
            message: "OK".to_string(),
            rows_affected: rows,
            ..Default::default()
        })
    }

    /// Run a python model on the backend.
    fn submit_python_job(
        &self,
        _model: &ParsedModel,
        _compiled_code: &str,
    ) -> FsResult<AdapterResponse> {
        not_implemented_err!(
            "submit_python_job is not implemented for adapter type {}",
            self.adapter_type()
        )
    }

    /// Dispatch of `adapter.<name>(...)` calls from Jinja.
    fn call_method(
        &self,
        state: &State,
        name: &str,
        args: &[Value],
    ) -> Result<Value, MinijinjaError> {
        dispatch_base_calls(self, state, name, args)
    }

    fn as_any(&self) -> &dyn Any;
}

/// Jinja methods every adapter answers.
pub fn dispatch_base_calls<A: BaseAdapter + ?Sized>(
    adapter: &A,
    _state: &State,
    name: &str,
    args: &[Value],
) -> Result<Value, MinijinjaError> {
    match name {
        "type" => Ok(Value::from(adapter.adapter_type())),
        "execute" => {
            let (sql,): (String,) = from_args(args)?;
            let response = adapter.execute(&sql).map_err(to_jinja_err)?;
            Ok(Value::from_object(response))
        }
        "submit_python_job" => {
            let (model, compiled_code): (Value, String) = from_args(args)?;
            let model = parsed_model_from_value(&model)?;
            let response = adapter
                .submit_python_job(&model, &compiled_code)
                .map_err(to_jinja_err)?;
            Ok(Value::from_object(response))
        }
        _ => Err(MinijinjaError::new(
            MinijinjaErrorKind::UnknownMethod,
            format!(
                "adapter '{}' has no method named '{}'",
                adapter.adapter_type(),
                name
            ),
        )),
    }
}

pub fn parsed_model_from_value(value: &Value) -> Result<ParsedModel, MinijinjaError> {
    serde_json::to_value(value)
        .and_then(serde_json::from_value)
        .map_err(|e| {
            MinijinjaError::new(
                MinijinjaErrorKind::CannotDeserialize,
                format!("Failed to read model: {e}"),
            )
        })
}

pub fn to_jinja_err(err: Box<FsError>) -> MinijinjaError {
    MinijinjaError::new(MinijinjaErrorKind::InvalidOperation, err.pretty())
}

/// Exposes an adapter to Jinja as `adapter`.
#[derive(Debug, Clone)]
pub struct AdapterObject(pub Arc<dyn BaseAdapter>);

impl Object for AdapterObject {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn call_method(
        self: &Arc<Self>,
        state: &State<'_, '_>,
        name: &str,
        args: &[Value],
    ) -> Result<Value, MinijinjaError> {
        self.0.call_method(state, name, args)
    }
}
