//! Resolution of a profile target into credentials.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dbt_common::constants::DBT_PROFILES_YML;
use dbt_common::{ErrorCode, FsError, FsResult, err, fs_err, stdfs};
use dbt_schemas::schemas::profiles::DbtProfilesIntermediate;
use dbt_schemas::schemas::serde::StringOrInteger;
use minijinja::{Environment, Error as MinijinjaError, ErrorKind as MinijinjaErrorKind, Value};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::base::Credentials;
use crate::factory::AdapterFactory;

pub struct ResolvedProfile {
    pub profile_name: String,
    pub target_name: String,
    pub threads: Option<usize>,
    pub credentials: Arc<dyn Credentials>,
}

/// Resolves a named target of a profile.
///
/// Resolution may call back into the adapter registry to find the
/// credentials parser for the target's type.
pub trait ProfileResolver: Send + Sync {
    fn resolve(
        &self,
        factory: &AdapterFactory,
        profile_name: &str,
        target_name: &str,
    ) -> FsResult<ResolvedProfile>;
}

/// Reads targets from `profiles.yml`.
#[derive(Debug, Clone, Default)]
pub struct ProfilesYmlResolver {
    profiles_dir: Option<PathBuf>,
    vars: BTreeMap<String, JsonValue>,
}

impl ProfilesYmlResolver {
    pub fn new(profiles_dir: Option<PathBuf>) -> Self {
        ProfilesYmlResolver {
            profiles_dir,
            vars: BTreeMap::new(),
        }
    }

    /// Values for `var(...)` in profile templates.
    pub fn with_vars(mut self, vars: BTreeMap<String, JsonValue>) -> Self {
        self.vars = vars;
        self
    }

    pub fn profiles_path(&self) -> FsResult<PathBuf> {
        let candidates = stdfs::profiles_dir_candidates(self.profiles_dir.as_deref());
        for dir in &candidates {
            let path = dir.join(DBT_PROFILES_YML);
            if stdfs::exists(&path)? {
                return Ok(path);
            }
        }
        err!(
            ErrorCode::InvalidConfig,
            "Could not find {} in any of: {}",
            DBT_PROFILES_YML,
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }

    fn jinja_env(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.add_function("env_var", env_var);
        let vars = Arc::new(self.vars.clone());
        env.add_function(
            "var",
            move |name: String, default: Option<Value>| -> Result<Value, MinijinjaError> {
                match vars.get(&name) {
                    Some(v) => Ok(Value::from_serialize(v)),
                    None => default.ok_or_else(|| {
                        MinijinjaError::new(
                            MinijinjaErrorKind::InvalidOperation,
                            format!("Required var '{name}' not found in config"),
                        )
                    }),
                }
            },
        );
        env
    }

    /// Renders every templated string of a target.
    pub fn render_target(&self, target: JsonValue) -> FsResult<JsonValue> {
        let env = self.jinja_env();
        render_json(&env, target)
    }

    fn load(&self, path: &Path) -> FsResult<DbtProfilesIntermediate> {
        let text = stdfs::read_to_string(path)?;
        DbtProfilesIntermediate::from_yml_str(&text)
    }
}

fn env_var(name: String, default: Option<String>) -> Result<String, MinijinjaError> {
    match std::env::var(&name) {
        Ok(value) => Ok(value),
        Err(_) => default.ok_or_else(|| {
            MinijinjaError::new(
                MinijinjaErrorKind::InvalidOperation,
                format!("Env var required but not provided: '{name}'"),
            )
        }),
    }
}

fn render_json(env: &Environment<'_>, value: JsonValue) -> FsResult<JsonValue> {
    Ok(match value {
        JsonValue::String(s) if s.contains("{{") || s.contains("{%") => {
            let rendered = env
                .render_str(&s, minijinja::context! {})
                .map_err(|e| Box::new(FsError::from_jinja_err(e, "Failed to render profiles.yml")))?;
            JsonValue::String(rendered)
        }
        JsonValue::Array(items) => JsonValue::Array(
            items
                .into_iter()
                .map(|v| render_json(env, v))
                .collect::<FsResult<_>>()?,
        ),
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .map(|(k, v)| Ok::<_, Box<FsError>>((k, render_json(env, v)?)))
                .collect::<FsResult<_>>()?,
        ),
        other => other,
    })
}

impl ProfileResolver for ProfilesYmlResolver {
    fn resolve(
        &self,
        factory: &AdapterFactory,
        profile_name: &str,
        target_name: &str,
    ) -> FsResult<ResolvedProfile> {
        let path = self.profiles_path()?;
        let profiles = self.load(&path)?;
        let targets = profiles.db_targets(profile_name)?;
        let raw_target = serde_json::to_value(targets.target(target_name)?)?;
        let target = self.render_target(raw_target)?;

        let adapter_type = target.get("type").and_then(|v| v.as_str()).ok_or_else(|| {
            fs_err!(
                ErrorCode::InvalidConfig,
                "Target '{}' of profile '{}' is missing required field 'type'",
                target_name,
                profile_name
            )
        })?;
        let credentials = factory.parse_credentials(adapter_type, &target)?;
        let threads = target
            .get("threads")
            .cloned()
            .and_then(|v| serde_json::from_value::<StringOrInteger>(v).ok())
            .and_then(|t| t.as_i64())
            .and_then(|t| usize::try_from(t).ok());
        debug!(
            profile = profile_name,
            target = target_name,
            adapter_type,
            path = %path.display(),
            "resolved profile target"
        );
        Ok(ResolvedProfile {
            profile_name: profile_name.to_string(),
            target_name: target_name.to_string(),
            threads,
            credentials,
        })
    }
}
