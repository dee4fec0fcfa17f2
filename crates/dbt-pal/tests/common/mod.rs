//! Fakes shared by the integration tests: an in-memory warehouse, a backend
//! adapter plugin, a scripted python runtime and a profile resolver that
//! re-enters the registry.

#![allow(dead_code)]

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arrow_array::{Int64Array, RecordBatch, RecordBatchIterator, RecordBatchReader};
use arrow_schema::{ArrowError, DataType, Field, Schema};
use dbt_common::{ErrorCode, FsResult, err, fs_err};
use dbt_pal::base::{
    AdapterTyping, BaseAdapter, Connection, ConnectionManager, Credentials, LoadJob,
    LoadJobConfig, TableRef, WarehouseClient, WriteDisposition, dispatch_base_calls,
};
use dbt_pal::bootstrap::{BootstrapOptions, pal_macros, pal_plugin};
use dbt_pal::credentials::{GenericCredentials, PalCredentials};
use dbt_pal::factory::{AdapterFactory, AdapterPlugin};
use dbt_pal::materialization::{MacroManifest, StaticManifestProvider};
use dbt_pal::profile::{ProfileResolver, ResolvedProfile};
use dbt_pal::python::{CompiledModelNamespace, ModelRuntime};
use dbt_pal::runtime_config::RuntimeConfig;
use dbt_schemas::schemas::macros::DbtMacro;
use minijinja::{Error as MinijinjaError, State, Value};
use parking_lot::Mutex;
use serde_json::{Value as JsonValue, json};

pub const WAREHOUSE_X: &str = "warehouse-x";

pub fn int_batch(values: Vec<i64>) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![Field::new("value", DataType::Int64, false)]));
    RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values))])
        .expect("valid batch")
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedLoad {
    pub table: String,
    pub write_disposition: WriteDisposition,
    pub rows: usize,
}

/// Serves fixed tables and records every query and load job.
#[derive(Default)]
pub struct RecordingClient {
    pub tables: Mutex<BTreeMap<String, Vec<RecordBatch>>>,
    pub queries: Mutex<Vec<String>>,
    pub loads: Mutex<Vec<RecordedLoad>>,
    pub fail_loads: bool,
}

impl RecordingClient {
    pub fn with_table(self, name: &str, batches: Vec<RecordBatch>) -> Self {
        self.tables.lock().insert(name.to_string(), batches);
        self
    }

    pub fn failing_loads(mut self) -> Self {
        self.fail_loads = true;
        self
    }

    pub fn loads(&self) -> Vec<RecordedLoad> {
        self.loads.lock().clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

impl WarehouseClient for RecordingClient {
    fn query(&self, sql: &str) -> FsResult<Box<dyn RecordBatchReader + Send>> {
        self.queries.lock().push(sql.to_string());
        let table = sql
            .strip_prefix("SELECT * FROM `")
            .and_then(|rest| rest.strip_suffix('`'))
            .unwrap_or_default();
        let batches = self.tables.lock().get(table).cloned().ok_or_else(|| {
            fs_err!(ErrorCode::RemoteError, "Not found: Table {}", table)
        })?;
        let schema = batches[0].schema();
        Ok(Box::new(RecordBatchIterator::new(
            batches.into_iter().map(Ok::<_, ArrowError>),
            schema,
        )))
    }

    fn load_table(
        &self,
        batch: &RecordBatch,
        table: &TableRef,
        config: &LoadJobConfig,
    ) -> FsResult<LoadJob> {
        if self.fail_loads {
            return err!(ErrorCode::RemoteError, "Access Denied: Table {}", table);
        }
        self.loads.lock().push(RecordedLoad {
            table: table.to_string(),
            write_disposition: config.write_disposition,
            rows: batch.num_rows(),
        });
        Ok(LoadJob {
            output_rows: batch.num_rows() as u64,
        })
    }
}

/// Backend adapter of type [WAREHOUSE_X] (or any other type name).
#[derive(Clone)]
pub struct FakeAdapter {
    type_name: String,
    client: Arc<RecordingClient>,
}

impl std::fmt::Debug for FakeAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeAdapter")
            .field("type_name", &self.type_name)
            .finish()
    }
}

impl AdapterTyping for FakeAdapter {
    fn adapter_type(&self) -> String {
        self.type_name.clone()
    }
}

impl ConnectionManager for FakeAdapter {
    fn get_thread_connection(&self) -> FsResult<Connection> {
        Ok(Connection {
            name: "master".to_string(),
            handle: self.client.clone(),
        })
    }
}

impl BaseAdapter for FakeAdapter {
    fn connections(&self) -> &dyn ConnectionManager {
        self
    }

    fn call_method(
        &self,
        state: &State,
        name: &str,
        args: &[Value],
    ) -> Result<Value, MinijinjaError> {
        match name {
            "quote" => {
                let (identifier,): (String,) = minijinja::value::from_args(args)?;
                Ok(Value::from(format!("`{identifier}`")))
            }
            _ => dispatch_base_calls(self, state, name, args),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn parse_generic(target: &JsonValue) -> FsResult<Arc<dyn Credentials>> {
    Ok(Arc::new(GenericCredentials::from_target(target)?))
}

/// Internal table materialization of a backend type.
pub fn backend_table_macro(type_name: &str) -> DbtMacro {
    let name = format!("materialization_table_{}", type_name.replace('-', "_"));
    let sql = format!(
        "{{% macro {name}() %}}create or replace table {{{{ this }}}} as ({{{{ sql }}}}) /* {{{{ adapter.type() }}}} */{{% endmacro %}}"
    );
    DbtMacro::new(format!("dbt_{type_name}"), name, sql)
}

/// Plugin constructing [FakeAdapter]s, counting constructions.
pub fn backend_plugin(
    type_name: &str,
    client: Arc<RecordingClient>,
    constructed: Arc<AtomicUsize>,
) -> AdapterPlugin {
    let adapter_type = type_name.to_string();
    AdapterPlugin::new(
        type_name,
        move |_factory, _guard, _config| {
            constructed.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FakeAdapter {
                type_name: adapter_type.clone(),
                client: client.clone(),
            }) as Arc<dyn BaseAdapter>)
        },
        parse_generic,
    )
    .with_macros(vec![backend_table_macro(type_name)])
}

/// Resolves targets from a fixed map, parsing credentials through the
/// registry. Records whether the registry was locked during each call.
pub struct StaticProfiles {
    targets: BTreeMap<String, JsonValue>,
    pub calls: AtomicUsize,
    pub locked_during_resolve: Mutex<Vec<bool>>,
}

impl StaticProfiles {
    pub fn new(targets: impl IntoIterator<Item = (&'static str, JsonValue)>) -> Self {
        StaticProfiles {
            targets: targets
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            calls: AtomicUsize::new(0),
            locked_during_resolve: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProfileResolver for StaticProfiles {
    fn resolve(
        &self,
        factory: &AdapterFactory,
        profile_name: &str,
        target_name: &str,
    ) -> FsResult<ResolvedProfile> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.locked_during_resolve.lock().push(factory.is_locked());
        let target = self.targets.get(target_name).ok_or_else(|| {
            fs_err!(
                ErrorCode::InvalidConfig,
                "The profile target '{}' was not found",
                target_name
            )
        })?;
        let adapter_type = target["type"].as_str().unwrap_or_default();
        Ok(ResolvedProfile {
            profile_name: profile_name.to_string(),
            target_name: target_name.to_string(),
            threads: None,
            credentials: factory.parse_credentials(adapter_type, target)?,
        })
    }
}

type ModelScript = Box<dyn Fn(&mut CompiledModelNamespace) + Send + Sync>;

/// Stands in for a python interpreter: records the source it is given and
/// defines whatever the script defines.
pub struct ScriptedRuntime {
    script: ModelScript,
    pub sources: Mutex<Vec<String>>,
}

impl ScriptedRuntime {
    pub fn new(script: impl Fn(&mut CompiledModelNamespace) + Send + Sync + 'static) -> Self {
        ScriptedRuntime {
            script: Box::new(script),
            sources: Mutex::new(Vec::new()),
        }
    }
}

impl ModelRuntime for ScriptedRuntime {
    fn exec(&self, source: &str, namespace: &mut CompiledModelNamespace) -> FsResult<()> {
        self.sources.lock().push(source.to_string());
        (self.script)(namespace);
        Ok(())
    }
}

pub fn warehouse_x_target() -> JsonValue {
    json!({
        "type": WAREHOUSE_X,
        "project": "proj",
        "dataset": "analytics",
        "method": "service-account",
        "keyfile": "/secrets/key.json",
    })
}

pub fn pal_config(db_profile: &str) -> RuntimeConfig {
    RuntimeConfig {
        project_name: "jaffle_shop".to_string(),
        profile_name: "jaffle_shop".to_string(),
        target_name: "dev".to_string(),
        threads: 4,
        credentials: Arc::new(PalCredentials {
            db_profile: db_profile.to_string(),
            ..Default::default()
        }),
    }
}

/// Macros of the pal plugin and of the fake backend.
pub fn test_manifest() -> MacroManifest {
    let mut manifest = MacroManifest::new();
    manifest.add_internal_macros(pal_macros());
    manifest.add_internal_macros([backend_table_macro(WAREHOUSE_X)]);
    manifest
}

/// A registry with the pal plugin and a [WAREHOUSE_X] backend discovered,
/// and the pal plugin loaded.
pub struct Harness {
    pub factory: AdapterFactory,
    pub client: Arc<RecordingClient>,
    pub profiles: Arc<StaticProfiles>,
    pub backend_constructed: Arc<AtomicUsize>,
}

impl Harness {
    pub fn new(client: RecordingClient, runtime: Option<Arc<dyn ModelRuntime>>) -> Self {
        Self::with_supported_backend(client, runtime, WAREHOUSE_X)
    }

    pub fn with_supported_backend(
        client: RecordingClient,
        runtime: Option<Arc<dyn ModelRuntime>>,
        supported_backend: &str,
    ) -> Self {
        let client = Arc::new(client);
        let profiles = Arc::new(StaticProfiles::new([("bq", warehouse_x_target())]));
        let mut options = BootstrapOptions::new(
            profiles.clone(),
            Arc::new(StaticManifestProvider::new(test_manifest())),
        )
        .with_supported_backend(supported_backend);
        if let Some(runtime) = runtime {
            options = options.with_model_runtime(runtime);
        }

        let factory = AdapterFactory::new();
        let backend_constructed = Arc::new(AtomicUsize::new(0));
        factory.discover(pal_plugin(Arc::new(options)));
        factory.discover(backend_plugin(
            WAREHOUSE_X,
            client.clone(),
            backend_constructed.clone(),
        ));
        factory.load_plugin("pal").expect("pal plugin is discovered");
        Harness {
            factory,
            client,
            profiles,
            backend_constructed,
        }
    }

    /// Registers a pal target pointing at `db_profile`, returning the
    /// adapter registered under `pal` and the updated config.
    pub fn register(&self, db_profile: &str) -> FsResult<(Arc<dyn BaseAdapter>, RuntimeConfig)> {
        let mut config = pal_config(db_profile);
        self.factory.register_adapter(&mut config)?;
        Ok((self.factory.get_adapter_by_type("pal")?, config))
    }
}
