//! This crate provides the `pal` dbt adapter.
//!
//! `pal` is a facade: a `type: pal` target names another target through
//! `db_profile`, and every connection, SQL materialization and python model
//! runs on that concrete backend. Generic callers see the adapter type `pal`;
//! trusted call sites see the backend's type (see [role]).

/// Jinja-facing adapter proxy
pub mod adapter;
pub mod base;
/// Construction of the `pal` adapter
pub mod bootstrap;
pub mod credentials;
pub mod factory;
pub mod materialization;
pub mod profile;
/// In-process python models
pub mod python;
pub mod response;
pub mod role;
pub mod runtime_config;

pub use adapter::PalAdapterWrapper;
pub use bootstrap::{BootstrapOptions, PalAdapter, pal_plugin};
pub use credentials::{CredentialsIdentityProxy, GenericCredentials, PalCredentials};
pub use factory::{AdapterFactory, AdapterPlugin, RegistryGuard};
