mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{Harness, RecordingClient, WAREHOUSE_X};
use dbt_common::ErrorCode;
use dbt_pal::PalAdapter;
use dbt_pal::base::{AdapterObject, AdapterTyping, BaseAdapter, Credentials};
use dbt_pal::bootstrap::BootstrapOptions;
use dbt_pal::factory::AdapterPlugin;
use dbt_pal::materialization::{MacroManifest, StaticManifestProvider};
use dbt_pal::profile::ProfilesYmlResolver;
use dbt_pal::role::{self, CallRole};
use dbt_pal::{CredentialsIdentityProxy, PalAdapterWrapper, PalCredentials};
use minijinja::{Environment, ErrorKind, Value, context};
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn test_pal_target_delegates_to_backend() {
    let harness = Harness::new(RecordingClient::default(), None);
    let (adapter, _config) = harness.register("bq").unwrap();

    // the backend is registered under its own type
    assert_eq!(harness.backend_constructed.load(Ordering::SeqCst), 1);
    let backend = harness.factory.get_adapter_by_type(WAREHOUSE_X).unwrap();
    assert_eq!(backend.adapter_type(), WAREHOUSE_X);
    assert_eq!(harness.factory.adapter_types(), vec!["pal", WAREHOUSE_X]);

    // the pal plugin now falls back to the backend's macros
    let pal = harness.factory.get_plugin_by_name("pal").unwrap();
    assert_eq!(pal.dependencies(), vec![WAREHOUSE_X.to_string()]);
    assert_eq!(
        harness.factory.get_adapter_type_names("pal").unwrap(),
        vec!["pal", WAREHOUSE_X]
    );

    // what the rest of the run holds is the wrapper, never a bare pal adapter
    let wrapper = adapter.as_any().downcast_ref::<PalAdapterWrapper>().unwrap();
    assert_eq!(wrapper.db_adapter().adapter_type(), WAREHOUSE_X);
    assert!(!harness.factory.is_locked());
}

#[test]
fn test_adapter_type_depends_on_role() {
    let harness = Harness::new(RecordingClient::default(), None);
    let (adapter, _config) = harness.register("bq").unwrap();

    assert_eq!(adapter.adapter_type(), "pal");
    role::with_role(CallRole::RenderMacro, || {
        assert_eq!(adapter.adapter_type(), WAREHOUSE_X);
    });
    role::with_role(CallRole::MaterializeSql, || {
        assert_eq!(adapter.adapter_type(), WAREHOUSE_X);
    });
    // serializing the target is trusted for credentials only
    role::with_role(CallRole::SerializeTargetDict, || {
        assert_eq!(adapter.adapter_type(), "pal");
    });
    assert_eq!(adapter.adapter_type(), "pal");
}

#[test]
fn test_credentials_become_identity_proxy() {
    let harness = Harness::new(RecordingClient::default(), None);
    let (_adapter, config) = harness.register("bq").unwrap();

    let proxy = config
        .credentials
        .as_any()
        .downcast_ref::<CredentialsIdentityProxy>()
        .unwrap();
    assert_eq!(proxy.db_credentials().adapter_type(), WAREHOUSE_X);

    assert_eq!(config.credentials.adapter_type(), "pal");
    assert_eq!(config.credentials.database(), "proj");
    assert_eq!(config.credentials.get_field("keyfile").unwrap(), json!("/secrets/key.json"));

    let target = config.to_target_dict().unwrap();
    assert_eq!(target["type"], json!(WAREHOUSE_X));
    assert_eq!(target["schema"], json!("analytics"));
    assert_eq!(target["method"], json!("service-account"));

    role::with_role(CallRole::MaterializeSql, || {
        assert_eq!(config.credentials.adapter_type(), WAREHOUSE_X);
    });
}

#[test]
fn test_empty_db_profile_fails_before_resolution() {
    let harness = Harness::new(RecordingClient::default(), None);

    let e = harness.register("").err().unwrap();
    assert_eq!(e.code, ErrorCode::InvalidConfig);
    assert_eq!(
        e.context,
        "pal credentials must have a `db_profile` property set"
    );
    assert_eq!(harness.profiles.calls(), 0);
    assert!(harness.factory.get_adapter_by_type("pal").is_err());
    assert!(!harness.factory.is_locked());
}

#[test]
fn test_unsupported_backend_leaves_registry_untouched() {
    let harness =
        Harness::with_supported_backend(RecordingClient::default(), None, "bigquery");
    let mut config = common::pal_config("bq");

    let e = harness.factory.register_adapter(&mut config).unwrap_err();
    assert_eq!(e.code, ErrorCode::UnsupportedAdapterType);
    assert_eq!(
        e.context,
        "dbt-pal currently only supports bigquery, but db_profile 'bq' has type 'warehouse-x'"
    );

    assert_eq!(harness.factory.adapter_types(), vec!["pal"]);
    assert!(harness.factory.get_plugin_by_name("pal").unwrap().dependencies().is_empty());
    assert!(harness.factory.get_adapter_by_type(WAREHOUSE_X).is_err());
    assert!(harness.factory.get_adapter_by_type("pal").is_err());
    assert_eq!(harness.backend_constructed.load(Ordering::SeqCst), 0);

    // the config still carries the pal credentials
    assert!(config.credentials.as_any().downcast_ref::<PalCredentials>().is_some());
}

#[test]
fn test_resolution_runs_with_registry_released() {
    let harness = Harness::new(RecordingClient::default(), None);
    harness.register("bq").unwrap();
    assert_eq!(*harness.profiles.locked_during_resolve.lock(), vec![false]);

    // a second registration is a no-op and resolves nothing
    harness.register("bq").unwrap();
    assert_eq!(harness.profiles.calls(), 1);
    assert_eq!(harness.backend_constructed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_lock_is_held_again_after_bootstrap() {
    let client = Arc::new(RecordingClient::default());
    let profiles = Arc::new(common::StaticProfiles::new([
        ("bq", common::warehouse_x_target()),
    ]));
    let options = Arc::new(
        BootstrapOptions::new(
            profiles.clone(),
            Arc::new(StaticManifestProvider::new(MacroManifest::new())),
        )
        .with_supported_backend(WAREHOUSE_X),
    );

    let factory = dbt_pal::AdapterFactory::new();
    factory.discover(AdapterPlugin::new(
        "pal",
        move |factory, guard, config| {
            assert!(factory.is_locked());
            let res = PalAdapter::bootstrap(&options, factory, guard, config);
            assert!(factory.is_locked());
            res
        },
        |target| Ok(Arc::new(PalCredentials::from_target(target)?) as Arc<dyn Credentials>),
    ));
    factory.discover(common::backend_plugin(
        WAREHOUSE_X,
        client,
        Arc::new(Default::default()),
    ));
    factory.load_plugin("pal").unwrap();

    // failing inside the released block
    let e = factory
        .register_adapter(&mut common::pal_config("missing"))
        .unwrap_err();
    assert_eq!(e.code, ErrorCode::InvalidConfig);
    assert!(!factory.is_locked());

    // succeeding
    factory.register_adapter(&mut common::pal_config("bq")).unwrap();
    assert!(!factory.is_locked());
    assert_eq!(*profiles.locked_during_resolve.lock(), vec![false, false]);
}

#[test]
fn test_unknown_jinja_methods_reach_backend() {
    let harness = Harness::new(RecordingClient::default(), None);
    let (adapter, _config) = harness.register("bq").unwrap();

    let env = Environment::new();
    let ctx = context! { adapter => Value::from_object(AdapterObject(adapter)) };
    let rendered = env
        .render_str("{{ adapter.type() }} {{ adapter.quote('orders') }}", ctx.clone())
        .unwrap();
    assert_eq!(rendered, "pal `orders`");

    let e = env
        .render_str("{{ adapter.no_such_method() }}", ctx)
        .unwrap_err();
    assert_eq!(e.kind(), ErrorKind::UnknownMethod);
}

#[test]
fn test_bootstrap_from_profiles_yml() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("profiles.yml"),
        indoc::indoc! {"
            jaffle_shop:
              target: dev
              outputs:
                dev:
                  type: pal
                  db_profile: bq
                bq:
                  type: warehouse-x
                  project: \"{{ env_var('PAL_TEST_SURELY_UNSET_PROJECT', 'proj') }}\"
                  dataset: analytics
                  threads: 8
        "},
    )
    .unwrap();

    let resolver = Arc::new(ProfilesYmlResolver::new(Some(dir.path().to_path_buf())));
    let options = BootstrapOptions::new(
        resolver,
        Arc::new(StaticManifestProvider::new(common::test_manifest())),
    )
    .with_supported_backend(WAREHOUSE_X);

    let factory = dbt_pal::AdapterFactory::new();
    factory.discover(dbt_pal::pal_plugin(Arc::new(options)));
    factory.discover(common::backend_plugin(
        WAREHOUSE_X,
        Arc::new(RecordingClient::default()),
        Arc::new(Default::default()),
    ));
    factory.load_plugin("pal").unwrap();

    let mut config = common::pal_config("bq");
    factory.register_adapter(&mut config).unwrap();
    assert_eq!(factory.get_adapter_by_type("pal").unwrap().adapter_type(), "pal");
    assert_eq!(config.credentials.database(), "proj");
    assert_eq!(config.to_target_dict().unwrap()["type"], json!(WAREHOUSE_X));
}
