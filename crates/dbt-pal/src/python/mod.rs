//! In-process execution of python models.
//!
//! The compiled model is sanitized, executed by the host's [ModelRuntime] and
//! its `model`/`dbtObj` entry points are bridged to reads and writes on the
//! backend's thread connection.

mod dbt_obj;
mod namespace;
mod sanitize;

use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow_array::{RecordBatch, RecordBatchReader};
use dbt_common::{ContextableResult, ErrorCode, FsResult, ectx};
use dbt_schemas::schemas::nodes::ParsedModel;
use tracing::{debug, info};

pub use dbt_obj::{ModelRelations, ResolvedDbtObj};
pub use namespace::{
    CompiledModelNamespace, DbtObjConstructor, DbtObject, ModelFunction, ModelRuntime,
    NamespaceEntry, RefReader,
};
pub use sanitize::{sanitize_compiled_code, strip_cluster_bootstrap, strip_engine_glue};

use crate::base::{BaseAdapter, LoadJobConfig, TableRef, WriteDisposition};
use crate::response::AdapterResponse;

/// Runs a compiled python model in-process against `db_adapter`'s tables.
pub fn submit_python_job(
    db_adapter: &Arc<dyn BaseAdapter>,
    runtime: &dyn ModelRuntime,
    model: &ParsedModel,
    compiled_code: &str,
) -> FsResult<AdapterResponse> {
    info!(model = %model.name, "executing python model in-process");

    let source = sanitize_compiled_code(compiled_code);
    let mut namespace = CompiledModelNamespace::new();
    runtime.exec(&source, &mut namespace)?;
    let model_fn = namespace.model()?;
    let dbt_obj = namespace.dbt_obj()?;

    let adapter = db_adapter.clone();
    let ref_reader: RefReader = Arc::new(move |table: &str| read_table(adapter.as_ref(), table));
    let dbt = dbt_obj(ref_reader)?;

    match model_fn(dbt.as_ref(), None)? {
        Some(batch) if batch.num_rows() > 0 => write_table(db_adapter.as_ref(), model, &batch)?,
        _ => debug!(model = %model.name, "python model returned no rows, nothing written"),
    }
    Ok(AdapterResponse::ok())
}

fn read_table(adapter: &dyn BaseAdapter, table_name: &str) -> FsResult<RecordBatch> {
    info!(table = table_name, "reading table");
    let connection = adapter.connections().get_thread_connection()?;
    let reader = connection
        .handle
        .query(&format!("SELECT * FROM `{table_name}`"))?;
    let schema = reader.schema();
    let batches = reader.collect::<Result<Vec<_>, _>>()?;
    let batch = concat_batches(&schema, &batches)?;
    info!(table = table_name, rows = batch.num_rows(), "read table");
    Ok(batch)
}

fn write_table(adapter: &dyn BaseAdapter, model: &ParsedModel, batch: &RecordBatch) -> FsResult<()> {
    let table = TableRef {
        database: model.database.clone(),
        schema: model.schema.clone(),
        identifier: model.relation_name().to_string(),
    };
    info!(table = %table, "writing table");
    let connection = adapter.connections().get_thread_connection()?;
    let config = LoadJobConfig {
        write_disposition: WriteDisposition::WriteTruncate,
    };
    let job = connection
        .handle
        .load_table(batch, &table, &config)
        .with_context(ectx!(
            code => ErrorCode::FailedToWriteTable,
            "Failed to write python model result to {}",
            table
        ))?;
    info!(table = %table, rows = job.output_rows, "wrote table");
    Ok(())
}
