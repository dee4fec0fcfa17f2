use std::collections::BTreeMap;
use std::sync::Arc;

use dbt_common::FsResult;
use serde_json::Value as JsonValue;

use crate::base::Credentials;
use crate::role::{self, CallRole};

/// The resolved project, profile and target of a run.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub project_name: String,
    pub profile_name: String,
    pub target_name: String,
    pub threads: usize,
    pub credentials: Arc<dyn Credentials>,
}

impl RuntimeConfig {
    /// Serializes the active target the way it is exposed to Jinja as
    /// `target`.
    pub fn to_target_dict(&self) -> FsResult<BTreeMap<String, JsonValue>> {
        role::with_role(CallRole::SerializeTargetDict, || {
            let creds = &self.credentials;
            let mut dict = BTreeMap::new();
            for key in creds.connection_keys() {
                let value = creds.get_field(&key)?;
                dict.insert(key, value);
            }
            dict.insert("type".to_string(), JsonValue::from(creds.adapter_type()));
            dict.insert("name".to_string(), JsonValue::from(self.target_name.clone()));
            dict.insert(
                "target_name".to_string(),
                JsonValue::from(self.target_name.clone()),
            );
            dict.insert(
                "profile_name".to_string(),
                JsonValue::from(self.profile_name.clone()),
            );
            dict.insert("threads".to_string(), JsonValue::from(self.threads));
            dict.insert("database".to_string(), JsonValue::from(creds.database()));
            dict.insert("schema".to_string(), JsonValue::from(creds.schema()));
            Ok(dict)
        })
    }
}
