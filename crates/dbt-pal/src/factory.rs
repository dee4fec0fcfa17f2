//! Process-wide adapter registry.
//!
//! Plugins are discovered at startup and loaded by type name; adapters are
//! registered under their credentials' type. All state sits behind one
//! non-reentrant lock. Adapter constructors run with that lock held and get a
//! [RegistryGuard] to release it around calls that re-enter the registry.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use dbt_common::{ErrorCode, FsResult, fs_err};
use dbt_schemas::schemas::macros::DbtMacro;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::base::{AdapterTyping, BaseAdapter, Credentials};
use crate::runtime_config::RuntimeConfig;

pub type AdapterConstructor = Arc<
    dyn Fn(&AdapterFactory, &mut RegistryGuard<'_>, &mut RuntimeConfig) -> FsResult<Arc<dyn BaseAdapter>>
        + Send
        + Sync,
>;

pub type CredentialsParser = Arc<dyn Fn(&JsonValue) -> FsResult<Arc<dyn Credentials>> + Send + Sync>;

/// An adapter type together with its constructor, credentials parser and
/// bundled macros.
pub struct AdapterPlugin {
    pub adapter_type: String,
    /// Package holding the plugin's internal macros
    pub project_name: String,
    pub macros: Vec<DbtMacro>,
    constructor: AdapterConstructor,
    credentials: CredentialsParser,
    dependencies: RwLock<Vec<String>>,
}

impl fmt::Debug for AdapterPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterPlugin")
            .field("adapter_type", &self.adapter_type)
            .field("project_name", &self.project_name)
            .field("dependencies", &*self.dependencies.read())
            .finish_non_exhaustive()
    }
}

impl AdapterPlugin {
    pub fn new<C, P>(adapter_type: impl Into<String>, constructor: C, credentials: P) -> Self
    where
        C: Fn(
                &AdapterFactory,
                &mut RegistryGuard<'_>,
                &mut RuntimeConfig,
            ) -> FsResult<Arc<dyn BaseAdapter>>
            + Send
            + Sync
            + 'static,
        P: Fn(&JsonValue) -> FsResult<Arc<dyn Credentials>> + Send + Sync + 'static,
    {
        let adapter_type = adapter_type.into();
        AdapterPlugin {
            project_name: format!("dbt_{adapter_type}"),
            adapter_type,
            macros: Vec::new(),
            constructor: Arc::new(constructor),
            credentials: Arc::new(credentials),
            dependencies: RwLock::new(Vec::new()),
        }
    }

    pub fn with_macros(mut self, macros: Vec<DbtMacro>) -> Self {
        self.macros = macros;
        self
    }

    pub fn with_dependencies(self, dependencies: Vec<String>) -> Self {
        *self.dependencies.write() = dependencies;
        self
    }

    /// Adapter types whose macros this plugin falls back to.
    pub fn dependencies(&self) -> Vec<String> {
        self.dependencies.read().clone()
    }

    pub fn set_dependencies(&self, dependencies: Vec<String>) {
        *self.dependencies.write() = dependencies;
    }

    pub fn parse_credentials(&self, target: &JsonValue) -> FsResult<Arc<dyn Credentials>> {
        (self.credentials)(target)
    }
}

#[derive(Default)]
struct RegistryState {
    available: HashMap<String, Arc<AdapterPlugin>>,
    plugins: BTreeMap<String, Arc<AdapterPlugin>>,
    adapters: BTreeMap<String, Arc<dyn BaseAdapter>>,
}

/// Holds the registry lock for an adapter constructor.
pub struct RegistryGuard<'a>(MutexGuard<'a, RegistryState>);

impl RegistryGuard<'_> {
    /// Runs `f` with the registry lock released. The lock is taken again
    /// when `f` returns or unwinds.
    pub fn released<T>(&mut self, f: impl FnOnce() -> T) -> T {
        MutexGuard::unlocked(&mut self.0, f)
    }

    /// [AdapterFactory::load_plugin] under the held lock.
    pub fn load_plugin(&mut self, name: &str) -> FsResult<Arc<AdapterPlugin>> {
        load_plugin_locked(&mut self.0, name)
    }

    /// [AdapterFactory::get_plugin_by_name] under the held lock.
    pub fn get_plugin_by_name(&self, name: &str) -> FsResult<Arc<AdapterPlugin>> {
        plugin_by_name(&self.0, name)
    }

    pub fn get_adapter_by_type(&self, name: &str) -> FsResult<Arc<dyn BaseAdapter>> {
        adapter_by_type(&self.0, name)
    }

    pub fn get_adapter_type_names(&self, name: &str) -> FsResult<Vec<String>> {
        let mut names = Vec::new();
        collect_type_names(&self.0, name, &mut names)?;
        Ok(names)
    }

    /// [AdapterFactory::register_adapter] under the held lock. The nested
    /// constructor receives this same guard.
    pub fn register_adapter(
        &mut self,
        factory: &AdapterFactory,
        config: &mut RuntimeConfig,
    ) -> FsResult<()> {
        let adapter_type = config.credentials.adapter_type();
        if self.0.adapters.contains_key(&adapter_type) {
            debug!(adapter_type = %adapter_type, "adapter already registered");
            return Ok(());
        }
        let plugin = self.0.plugins.get(&adapter_type).cloned().ok_or_else(|| {
            fs_err!(
                ErrorCode::DependencyNotFound,
                "Could not find adapter type {}!",
                adapter_type
            )
        })?;
        let adapter = (plugin.constructor)(factory, self, config)?;
        info!(adapter_type = %adapter_type, resolved_type = %adapter.adapter_type(), "registered adapter");
        self.0.adapters.entry(adapter_type).or_insert(adapter);
        Ok(())
    }
}

#[derive(Default)]
pub struct AdapterFactory {
    state: Mutex<RegistryState>,
}

impl fmt::Debug for AdapterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterFactory")
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

impl AdapterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a plugin available for [AdapterFactory::load_plugin].
    pub fn discover(&self, plugin: AdapterPlugin) -> Arc<AdapterPlugin> {
        let plugin = Arc::new(plugin);
        self.state
            .lock()
            .available
            .insert(plugin.adapter_type.clone(), plugin.clone());
        plugin
    }

    /// Loads a discovered plugin and, recursively, its dependencies.
    pub fn load_plugin(&self, name: &str) -> FsResult<Arc<AdapterPlugin>> {
        let mut state = self.state.lock();
        load_plugin_locked(&mut state, name)
    }

    /// Constructs and registers the adapter for `config`'s credentials type,
    /// unless one is registered already.
    pub fn register_adapter(&self, config: &mut RuntimeConfig) -> FsResult<()> {
        let mut guard = RegistryGuard(self.state.lock());
        guard.register_adapter(self, config)
    }

    /// Parses a target with the credentials parser of a discovered plugin.
    ///
    /// Does not load the plugin. The lock is held only for the lookup, so
    /// this may be called while a constructor has the registry released.
    pub fn parse_credentials(
        &self,
        adapter_type: &str,
        target: &JsonValue,
    ) -> FsResult<Arc<dyn Credentials>> {
        let plugin = {
            let state = self.state.lock();
            state
                .plugins
                .get(adapter_type)
                .or_else(|| state.available.get(adapter_type))
                .cloned()
        };
        let plugin = plugin.ok_or_else(|| {
            fs_err!(
                ErrorCode::DependencyNotFound,
                "Could not find adapter type {}!",
                adapter_type
            )
        })?;
        plugin.parse_credentials(target)
    }

    pub fn get_plugin_by_name(&self, name: &str) -> FsResult<Arc<AdapterPlugin>> {
        plugin_by_name(&self.state.lock(), name)
    }

    pub fn get_adapter_by_type(&self, name: &str) -> FsResult<Arc<dyn BaseAdapter>> {
        adapter_by_type(&self.state.lock(), name)
    }

    /// Names of the loaded plugins.
    pub fn adapter_types(&self) -> Vec<String> {
        self.state.lock().plugins.keys().cloned().collect()
    }

    /// `name` followed by its plugin dependencies, depth first, without
    /// duplicates. This is the adapter chain searched for macros.
    pub fn get_adapter_type_names(&self, name: &str) -> FsResult<Vec<String>> {
        let mut names = Vec::new();
        collect_type_names(&self.state.lock(), name, &mut names)?;
        Ok(names)
    }

    /// Macros bundled with the loaded plugins.
    pub fn internal_macros(&self) -> Vec<DbtMacro> {
        self.state
            .lock()
            .plugins
            .values()
            .flat_map(|p| p.macros.iter().cloned())
            .collect()
    }

    pub fn is_locked(&self) -> bool {
        self.state.is_locked()
    }
}

fn plugin_by_name(state: &RegistryState, name: &str) -> FsResult<Arc<AdapterPlugin>> {
    state.plugins.get(name).cloned().ok_or_else(|| {
        fs_err!(
            ErrorCode::DependencyNotFound,
            "Could not find plugin named {}",
            name
        )
    })
}

fn adapter_by_type(state: &RegistryState, name: &str) -> FsResult<Arc<dyn BaseAdapter>> {
    state.adapters.get(name).cloned().ok_or_else(|| {
        fs_err!(
            ErrorCode::DependencyNotFound,
            "Could not find an adapter registered for type '{}'",
            name
        )
    })
}

fn load_plugin_locked(state: &mut RegistryState, name: &str) -> FsResult<Arc<AdapterPlugin>> {
    if let Some(plugin) = state.plugins.get(name) {
        return Ok(plugin.clone());
    }
    let plugin = state.available.get(name).cloned().ok_or_else(|| {
        fs_err!(
            ErrorCode::DependencyNotFound,
            "Could not find adapter type {}!",
            name
        )
    })?;
    state.plugins.insert(name.to_string(), plugin.clone());
    for dependency in plugin.dependencies() {
        load_plugin_locked(state, &dependency)?;
    }
    info!(adapter_type = name, "loaded adapter plugin");
    Ok(plugin)
}

fn collect_type_names(
    state: &RegistryState,
    name: &str,
    names: &mut Vec<String>,
) -> FsResult<()> {
    if names.iter().any(|n| n == name) {
        return Ok(());
    }
    let plugin = state.plugins.get(name).ok_or_else(|| {
        fs_err!(
            ErrorCode::DependencyNotFound,
            "Could not find adapter type {}!",
            name
        )
    })?;
    names.push(name.to_string());
    for dependency in plugin.dependencies() {
        collect_type_names(state, &dependency, names)?;
    }
    Ok(())
}
