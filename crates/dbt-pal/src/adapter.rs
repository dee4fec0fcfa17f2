use std::any::Any;
use std::fmt;
use std::sync::Arc;

use dbt_common::adapter::AdapterType;
use dbt_common::{FsResult, not_implemented_err};
use dbt_schemas::schemas::nodes::ParsedModel;
use minijinja::value::from_args;
use minijinja::{Error as MinijinjaError, State, Value};
use tracing::debug;

use crate::base::{
    AdapterTyping, BaseAdapter, ConnectionManager, dispatch_base_calls, to_jinja_err,
};
use crate::factory::RegistryGuard;
use crate::materialization::{MacroGenerator, ManifestProvider, RenderContext};
use crate::python::{self, ModelRuntime};
use crate::response::AdapterResponse;
use crate::role::{self, CallRole};
use crate::runtime_config::RuntimeConfig;

/// Roles that see the concrete backend type through [PalAdapterWrapper].
pub const ADAPTER_TRUSTED_ROLES: &[CallRole] = &[CallRole::RenderMacro, CallRole::MaterializeSql];

/// The adapter the rest of the run talks to once `pal` is bootstrapped.
///
/// Reports `pal` as its type outside [ADAPTER_TRUSTED_ROLES], runs
/// materializations with the backend's own macros and python models
/// in-process, and forwards everything else to the backend adapter.
pub struct PalAdapterWrapper {
    db_adapter: Arc<dyn BaseAdapter>,
    db_type_names: Vec<String>,
    config: RuntimeConfig,
    manifests: Arc<dyn ManifestProvider>,
    model_runtime: Option<Arc<dyn ModelRuntime>>,
}

impl fmt::Debug for PalAdapterWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PalAdapterWrapper")
            .field("db_adapter", &self.db_adapter)
            .field("db_type_names", &self.db_type_names)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PalAdapterWrapper {
    /// Wraps the adapter registered for `db_adapter_type`. Called from a
    /// constructor, so the registry is read through its guard.
    pub fn new(
        registry: &RegistryGuard<'_>,
        db_adapter_type: &str,
        config: RuntimeConfig,
        manifests: Arc<dyn ManifestProvider>,
        model_runtime: Option<Arc<dyn ModelRuntime>>,
    ) -> FsResult<Self> {
        Ok(PalAdapterWrapper {
            db_adapter: registry.get_adapter_by_type(db_adapter_type)?,
            db_type_names: registry.get_adapter_type_names(db_adapter_type)?,
            config,
            manifests,
            model_runtime,
        })
    }

    pub fn db_adapter(&self) -> &Arc<dyn BaseAdapter> {
        &self.db_adapter
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Renders the backend's own `materialization` macro with `context`.
    pub fn materialize_sql(&self, context: &RenderContext, materialization: &str) -> FsResult<Value> {
        role::with_role(CallRole::MaterializeSql, || {
            let manifest = self.manifests.get_full_manifest(&self.config)?;
            let materialization_macro = manifest.find_materialization_macro_by_name(
                &self.config.project_name,
                materialization,
                &self.db_type_names,
            )?;
            debug!(
                materialization,
                macro_id = %materialization_macro.unique_id,
                "dispatching materialization to backend"
            );
            MacroGenerator::new(materialization_macro.clone(), context.clone()).call()
        })
    }
}

impl AdapterTyping for PalAdapterWrapper {
    fn adapter_type(&self) -> String {
        if role::any_active(ADAPTER_TRUSTED_ROLES) {
            self.db_adapter.adapter_type()
        } else {
            AdapterType::Pal.to_string()
        }
    }
}

impl BaseAdapter for PalAdapterWrapper {
    fn connections(&self) -> &dyn ConnectionManager {
        self.db_adapter.connections()
    }

    fn execute(&self, sql: &str) -> FsResult<AdapterResponse> {
        self.db_adapter.execute(sql)
    }

    fn submit_python_job(
        &self,
        model: &ParsedModel,
        compiled_code: &str,
    ) -> FsResult<AdapterResponse> {
        let Some(runtime) = &self.model_runtime else {
            return not_implemented_err!(
                "Python model '{}' cannot run: no python model runtime is configured for dbt-pal",
                model.name
            );
        };
        python::submit_python_job(&self.db_adapter, runtime.as_ref(), model, compiled_code)
    }

    fn call_method(
        &self,
        state: &State,
        name: &str,
        args: &[Value],
    ) -> Result<Value, MinijinjaError> {
        match name {
            "type" | "submit_python_job" => dispatch_base_calls(self, state, name, args),
            "materialize_sql" | "db_materialization" => {
                let (context, materialization): (Value, String) = from_args(args)?;
                let context = RenderContext::from_value(&context).map_err(to_jinja_err)?;
                self.materialize_sql(&context, &materialization)
                    .map_err(to_jinja_err)
            }
            _ => self.db_adapter.call_method(state, name, args),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
