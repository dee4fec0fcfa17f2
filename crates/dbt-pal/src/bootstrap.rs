//! Construction of the `pal` adapter.
//!
//! `pal` never becomes a working adapter of its own. Registering a `pal`
//! target resolves the target named by `db_profile`, registers the concrete
//! backend under its own type, and hands back a [PalAdapterWrapper] around
//! it.

use std::sync::Arc;

use dbt_common::adapter::AdapterType;
use dbt_common::{ErrorCode, FsResult, err};
use dbt_schemas::schemas::macros::DbtMacro;
use serde_json::Value as JsonValue;
use tracing::info;

use crate::adapter::PalAdapterWrapper;
use crate::base::{BaseAdapter, Credentials};
use crate::credentials::{CredentialsIdentityProxy, PalCredentials};
use crate::factory::{AdapterFactory, AdapterPlugin, RegistryGuard};
use crate::materialization::ManifestProvider;
use crate::profile::ProfileResolver;
use crate::python::ModelRuntime;
use crate::runtime_config::RuntimeConfig;

/// Environment the `pal` plugin is built with.
pub struct BootstrapOptions {
    /// The one backend type `pal` may delegate to
    pub supported_backend: String,
    pub profiles: Arc<dyn ProfileResolver>,
    pub manifests: Arc<dyn ManifestProvider>,
    pub model_runtime: Option<Arc<dyn ModelRuntime>>,
}

impl BootstrapOptions {
    pub fn new(profiles: Arc<dyn ProfileResolver>, manifests: Arc<dyn ManifestProvider>) -> Self {
        BootstrapOptions {
            supported_backend: AdapterType::Bigquery.to_string(),
            profiles,
            manifests,
            model_runtime: None,
        }
    }

    pub fn with_supported_backend(mut self, backend: impl Into<String>) -> Self {
        self.supported_backend = backend.into();
        self
    }

    pub fn with_model_runtime(mut self, runtime: Arc<dyn ModelRuntime>) -> Self {
        self.model_runtime = Some(runtime);
        self
    }
}

pub struct PalAdapter;

impl PalAdapter {
    /// Constructor of the `pal` plugin, called by the registry with its lock
    /// held.
    ///
    /// On return `config.credentials` is a [CredentialsIdentityProxy] around
    /// the backend's credentials, and the backend adapter is registered
    /// under the backend's type.
    pub fn bootstrap(
        options: &BootstrapOptions,
        factory: &AdapterFactory,
        guard: &mut RegistryGuard<'_>,
        config: &mut RuntimeConfig,
    ) -> FsResult<Arc<dyn BaseAdapter>> {
        let db_profile = match config.credentials.get_field("db_profile") {
            Ok(JsonValue::String(name)) if !name.is_empty() => name,
            _ => {
                return err!(
                    ErrorCode::InvalidConfig,
                    "pal credentials must have a `db_profile` property set"
                );
            }
        };

        // Resolution looks up credentials parsers in the registry.
        let resolved = guard.released(|| {
            options
                .profiles
                .resolve(factory, &config.profile_name, &db_profile)
        })?;
        let db_credentials = resolved.credentials;
        let db_type = db_credentials.adapter_type();
        if db_type != options.supported_backend {
            return err!(
                ErrorCode::UnsupportedAdapterType,
                "dbt-pal currently only supports {}, but db_profile '{}' has type '{}'",
                options.supported_backend,
                db_profile,
                db_type
            );
        }
        info!(
            target = %config.target_name,
            db_profile = %db_profile,
            backend = %db_type,
            "delegating pal adapter to backend"
        );

        guard
            .get_plugin_by_name(AdapterType::Pal.as_ref())?
            .set_dependencies(vec![db_type.clone()]);
        guard.load_plugin(&db_type)?;

        // The registry keys adapters by credentials type, so the backend is
        // registered with its own credentials in place.
        let pal_credentials = std::mem::replace(&mut config.credentials, db_credentials.clone());
        if let Err(e) = guard.register_adapter(factory, config) {
            config.credentials = pal_credentials;
            return Err(e);
        }
        config.credentials = Arc::new(CredentialsIdentityProxy::new(db_credentials));

        let wrapper = PalAdapterWrapper::new(
            guard,
            &db_type,
            config.clone(),
            options.manifests.clone(),
            options.model_runtime.clone(),
        )?;
        Ok(Arc::new(wrapper))
    }
}

fn parse_pal_credentials(target: &JsonValue) -> FsResult<Arc<dyn Credentials>> {
    Ok(Arc::new(PalCredentials::from_target(target)?))
}

/// Internal macros of the `pal` package.
pub fn pal_macros() -> Vec<DbtMacro> {
    let package = AdapterType::Pal.macro_package_name();
    [
        (
            "materialization_table_pal",
            include_str!("../include/pal/macros/materializations/table.sql"),
        ),
        (
            "materialization_view_pal",
            include_str!("../include/pal/macros/materializations/view.sql"),
        ),
        (
            "materialization_incremental_pal",
            include_str!("../include/pal/macros/materializations/incremental.sql"),
        ),
    ]
    .into_iter()
    .map(|(name, sql)| DbtMacro::new(&package, name, sql))
    .collect()
}

/// The plugin to discover for `type: pal` targets.
pub fn pal_plugin(options: Arc<BootstrapOptions>) -> AdapterPlugin {
    AdapterPlugin::new(
        AdapterType::Pal.to_string(),
        move |factory, guard, config| PalAdapter::bootstrap(&options, factory, guard, config),
        parse_pal_credentials,
    )
    .with_macros(pal_macros())
}
