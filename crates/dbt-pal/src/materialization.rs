//! Materialization macro lookup and rendering.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use dbt_common::{ErrorCode, FsError, FsResult, err};
use dbt_schemas::schemas::macros::DbtMacro;
use minijinja::value::{Enumerator, Object};
use minijinja::{Environment, Value};
use parking_lot::Mutex;
use tracing::debug;

use crate::role::{self, CallRole};
use crate::runtime_config::RuntimeConfig;

/// Where a macro comes from. Later variants lose to earlier ones when two
/// packages define the same macro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MacroOrigin {
    Root,
    Imported,
    /// Bundled with an adapter plugin
    Internal,
}

/// All macros visible to a run, keyed by unique id.
#[derive(Debug, Clone, Default)]
pub struct MacroManifest {
    macros: BTreeMap<String, DbtMacro>,
    internal_packages: BTreeSet<String>,
}

impl MacroManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_macro(&mut self, m: DbtMacro) {
        self.macros.insert(m.unique_id.clone(), m);
    }

    /// Adds macros bundled with adapter plugins.
    pub fn add_internal_macros(&mut self, macros: impl IntoIterator<Item = DbtMacro>) {
        for m in macros {
            self.internal_packages.insert(m.package_name.clone());
            self.add_macro(m);
        }
    }

    pub fn get(&self, unique_id: &str) -> Option<&DbtMacro> {
        self.macros.get(unique_id)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    fn origin(&self, m: &DbtMacro, root_project: &str) -> MacroOrigin {
        if m.package_name == root_project {
            MacroOrigin::Root
        } else if self.internal_packages.contains(&m.package_name) {
            MacroOrigin::Internal
        } else {
            MacroOrigin::Imported
        }
    }

    /// The macro named `name` with the best origin, if any package defines it.
    pub fn find_macro_by_name(&self, root_project: &str, name: &str) -> Option<&DbtMacro> {
        self.macros
            .values()
            .filter(|m| m.name == name)
            .min_by_key(|m| self.origin(m, root_project))
    }

    /// Looks up `materialization_<name>_<type>` for each type of the adapter
    /// chain, then `materialization_<name>_default`. A `-` in a type name is
    /// read as `_`.
    pub fn find_materialization_macro_by_name(
        &self,
        root_project: &str,
        materialization: &str,
        adapter_types: &[String],
    ) -> FsResult<&DbtMacro> {
        let candidates = adapter_types
            .iter()
            .map(String::as_str)
            .chain(std::iter::once("default"))
            // adapter types may contain '-', macro names may not
            .map(|adapter_type| {
                format!(
                    "materialization_{materialization}_{}",
                    adapter_type.replace('-', "_")
                )
            });
        for candidate in candidates {
            if let Some(m) = self.find_macro_by_name(root_project, &candidate) {
                return Ok(m);
            }
        }
        err!(
            ErrorCode::MaterializationNotFound,
            "No materialization '{}' was found for adapter {}! (searched types {:?})",
            materialization,
            adapter_types.first().map(String::as_str).unwrap_or("default"),
            adapter_types
        )
    }
}

/// Supplies the manifest a run renders macros from.
pub trait ManifestProvider: Send + Sync {
    fn get_full_manifest(&self, config: &RuntimeConfig) -> FsResult<Arc<MacroManifest>>;
}

#[derive(Debug, Clone)]
pub struct StaticManifestProvider(Arc<MacroManifest>);

impl StaticManifestProvider {
    pub fn new(manifest: MacroManifest) -> Self {
        StaticManifestProvider(Arc::new(manifest))
    }
}

impl ManifestProvider for StaticManifestProvider {
    fn get_full_manifest(&self, _config: &RuntimeConfig) -> FsResult<Arc<MacroManifest>> {
        Ok(self.0.clone())
    }
}

/// Names of the macros currently being rendered, innermost last.
#[derive(Debug, Clone, Default)]
pub struct MacroStack {
    frames: Arc<Mutex<Vec<String>>>,
}

impl MacroStack {
    pub fn push(&self, name: impl Into<String>) -> MacroStackFrame {
        self.frames.lock().push(name.into());
        MacroStackFrame {
            stack: self.clone(),
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn call_stack(&self) -> Vec<String> {
        self.frames.lock().clone()
    }
}

impl Object for MacroStack {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "depth" => Some(Value::from(self.depth())),
            "call_stack" => Some(Value::from(self.call_stack())),
            _ => None,
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Str(&["depth", "call_stack"])
    }
}

/// Pops its macro off the stack when dropped.
#[must_use]
pub struct MacroStackFrame {
    stack: MacroStack,
}

impl Drop for MacroStackFrame {
    fn drop(&mut self) {
        self.stack.frames.lock().pop();
    }
}

/// Variables a materialization macro is rendered with.
///
/// As a Jinja value the context also exposes itself as `context`, and its
/// macro stack as `context_macro_stack`.
#[derive(Clone, Default)]
pub struct RenderContext {
    values: BTreeMap<String, Value>,
    macro_stack: MacroStack,
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .field("macro_stack", &self.macro_stack)
            .finish()
    }
}

const MACRO_STACK_KEY: &str = "context_macro_stack";

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn macro_stack(&self) -> &MacroStack {
        &self.macro_stack
    }

    pub fn to_value(&self) -> Value {
        Value::from_object(self.clone())
    }

    /// Reads a context handed back from Jinja, e.g. the `context` argument of
    /// `adapter.materialize_sql(context, ...)`.
    pub fn from_value(value: &Value) -> FsResult<Self> {
        if let Some(ctx) = value.downcast_object_ref::<RenderContext>() {
            return Ok(ctx.clone());
        }
        let macro_stack = value
            .get_attr(MACRO_STACK_KEY)
            .ok()
            .and_then(|v| v.downcast_object_ref::<MacroStack>().cloned());
        let Some(macro_stack) = macro_stack else {
            return err!(
                ErrorCode::InvalidArgument,
                "Rendering context is missing '{}'",
                MACRO_STACK_KEY
            );
        };
        let mut values = BTreeMap::new();
        let keys = value
            .try_iter()
            .map_err(|e| Box::new(FsError::from_jinja_err(e, "Rendering context is not a mapping")))?;
        for key in keys {
            let Some(name) = key.as_str() else { continue };
            if name == MACRO_STACK_KEY || name == "context" {
                continue;
            }
            if let Ok(v) = value.get_item(&key) {
                values.insert(name.to_string(), v);
            }
        }
        Ok(RenderContext {
            values,
            macro_stack,
        })
    }
}

impl Object for RenderContext {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "context" => Some(self.to_value()),
            MACRO_STACK_KEY => Some(Value::from_object(self.macro_stack.clone())),
            name => self.values.get(name).cloned(),
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        let keys = self
            .values
            .keys()
            .map(|k| Value::from(k.as_str()))
            .chain([Value::from("context"), Value::from(MACRO_STACK_KEY)])
            .collect();
        Enumerator::Values(keys)
    }
}

/// Renders one macro against a context.
pub struct MacroGenerator {
    macro_: DbtMacro,
    context: RenderContext,
}

impl MacroGenerator {
    pub fn new(macro_: DbtMacro, context: RenderContext) -> Self {
        MacroGenerator { macro_, context }
    }

    /// Compiles the macro's file, then calls the macro with no arguments.
    pub fn call(&self) -> FsResult<Value> {
        let _role = role::enter(CallRole::RenderMacro);
        let _frame = self.context.macro_stack().push(self.macro_.unique_id.clone());
        debug!(
            macro_id = %self.macro_.unique_id,
            depth = self.context.macro_stack().depth(),
            "rendering macro"
        );

        let jinja_err = |e| {
            Box::new(FsError::from_jinja_err(
                e,
                format!("Failed to render macro {}", self.macro_.unique_id),
            ))
        };
        let mut env = Environment::new();
        env.add_template_owned(self.macro_.unique_id.clone(), self.macro_.macro_sql.clone())
            .map_err(jinja_err)?;
        let template = env.get_template(&self.macro_.unique_id).map_err(jinja_err)?;
        let state = template
            .eval_to_state(self.context.to_value())
            .map_err(jinja_err)?;
        let rendered = state.call_macro(&self.macro_.name, &[]).map_err(jinja_err)?;
        Ok(Value::from_safe_string(rendered))
    }
}
