use std::any::Any;
use std::sync::Arc;

use dbt_common::adapter::AdapterType;
use dbt_common::{ErrorCode, FsResult, err, fs_err};
use dbt_schemas::schemas::profiles::PalDbConfig;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::base::Credentials;
use crate::role::{self, CallRole};

/// Roles that see the concrete backend type through [CredentialsIdentityProxy].
pub const CREDENTIALS_TRUSTED_ROLES: &[CallRole] =
    &[CallRole::SerializeTargetDict, CallRole::MaterializeSql];

// keys never echoed back when describing a connection
const SECRET_KEYS: &[&str] = &[
    "password",
    "token",
    "refresh_token",
    "client_secret",
    "keyfile_json",
    "private_key",
];

/// Credentials of a `type: pal` target.
///
/// Carries only the name of the target holding the real connection
/// parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PalCredentials {
    pub db_profile: String,
    pub database: String,
    pub schema: String,
}

impl From<PalDbConfig> for PalCredentials {
    fn from(config: PalDbConfig) -> Self {
        PalCredentials {
            db_profile: config.db_profile,
            database: config.database,
            schema: config.schema,
        }
    }
}

impl PalCredentials {
    pub fn from_target(target: &JsonValue) -> FsResult<Self> {
        let config: PalDbConfig = serde_json::from_value(target.clone()).map_err(|e| {
            fs_err!(
                ErrorCode::InvalidConfig,
                "Failed to parse pal target: {}",
                e
            )
        })?;
        Ok(config.into())
    }
}

impl Credentials for PalCredentials {
    fn adapter_type(&self) -> String {
        AdapterType::Pal.to_string()
    }

    fn database(&self) -> String {
        self.database.clone()
    }

    fn schema(&self) -> String {
        self.schema.clone()
    }

    fn unique_field(&self) -> Option<String> {
        Some(self.db_profile.clone())
    }

    fn connection_keys(&self) -> Vec<String> {
        vec!["db_profile".to_string()]
    }

    fn get_field(&self, name: &str) -> FsResult<JsonValue> {
        match name {
            "type" => Ok(JsonValue::from(self.adapter_type())),
            "db_profile" => Ok(JsonValue::from(self.db_profile.clone())),
            "database" => Ok(JsonValue::from(self.database.clone())),
            "schema" => Ok(JsonValue::from(self.schema.clone())),
            _ => err!(
                ErrorCode::UndefinedField,
                "'PalCredentials' object has no attribute '{}'",
                name
            ),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Credentials of any backend, kept as the rendered target mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericCredentials {
    adapter_type: String,
    fields: Map<String, JsonValue>,
}

impl GenericCredentials {
    pub fn from_target(target: &JsonValue) -> FsResult<Self> {
        let fields = target.as_object().cloned().ok_or_else(|| {
            fs_err!(
                ErrorCode::InvalidConfig,
                "Profile target must be a mapping, got: {}",
                target
            )
        })?;
        let adapter_type = fields
            .get("type")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                fs_err!(
                    ErrorCode::InvalidConfig,
                    "Profile target is missing required field 'type'"
                )
            })?;
        Ok(GenericCredentials {
            adapter_type,
            fields,
        })
    }

    fn str_field(&self, names: &[&str]) -> Option<String> {
        names
            .iter()
            .find_map(|name| self.fields.get(*name).and_then(|v| v.as_str()))
            .map(|s| s.to_string())
    }
}

impl Credentials for GenericCredentials {
    fn adapter_type(&self) -> String {
        self.adapter_type.clone()
    }

    fn database(&self) -> String {
        self.str_field(&["database", "project"]).unwrap_or_default()
    }

    fn schema(&self) -> String {
        self.str_field(&["schema", "dataset"]).unwrap_or_default()
    }

    fn unique_field(&self) -> Option<String> {
        self.str_field(&["database", "project", "host", "account"])
    }

    fn connection_keys(&self) -> Vec<String> {
        self.fields
            .keys()
            .filter(|k| k.as_str() != "type" && !SECRET_KEYS.contains(&k.as_str()))
            .cloned()
            .sorted()
            .collect()
    }

    fn get_field(&self, name: &str) -> FsResult<JsonValue> {
        match name {
            "type" => Ok(JsonValue::from(self.adapter_type())),
            "database" => Ok(JsonValue::from(self.database())),
            "schema" => Ok(JsonValue::from(self.schema())),
            _ => self.fields.get(name).cloned().ok_or_else(|| {
                fs_err!(
                    ErrorCode::UndefinedField,
                    "'{}' credentials object has no attribute '{}'",
                    self.adapter_type,
                    name
                )
            }),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Wraps the concrete backend's credentials and reports the facade type to
/// every caller outside [CREDENTIALS_TRUSTED_ROLES].
#[derive(Debug, Clone)]
pub struct CredentialsIdentityProxy {
    db_credentials: Arc<dyn Credentials>,
}

impl CredentialsIdentityProxy {
    pub fn new(db_credentials: Arc<dyn Credentials>) -> Self {
        CredentialsIdentityProxy { db_credentials }
    }

    pub fn db_credentials(&self) -> &Arc<dyn Credentials> {
        &self.db_credentials
    }
}

impl Credentials for CredentialsIdentityProxy {
    fn adapter_type(&self) -> String {
        if role::any_active(CREDENTIALS_TRUSTED_ROLES) {
            self.db_credentials.adapter_type()
        } else {
            AdapterType::Pal.to_string()
        }
    }

    fn database(&self) -> String {
        self.db_credentials.database()
    }

    fn schema(&self) -> String {
        self.db_credentials.schema()
    }

    fn unique_field(&self) -> Option<String> {
        self.db_credentials.unique_field()
    }

    fn connection_keys(&self) -> Vec<String> {
        self.db_credentials.connection_keys()
    }

    fn get_field(&self, name: &str) -> FsResult<JsonValue> {
        if name == "type" {
            return Ok(JsonValue::from(self.adapter_type()));
        }
        self.db_credentials.get_field(name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
