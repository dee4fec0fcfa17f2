use std::collections::{BTreeMap, HashMap};

use dbt_common::{ErrorCode, FsError, FsResult, err, fs_err};
use serde::{Deserialize, Serialize};

use crate::schemas::serde::StringOrInteger;

type YmlValue = dbt_serde_yaml::Value;

pub type ProfileName = String;
pub type TargetName = String;
pub type DefaultTargetName = String;

/// `profiles.yml` as read from disk: profile name to unparsed profile body.
#[derive(Debug, Deserialize)]
pub struct DbtProfilesIntermediate {
    pub config: Option<YmlValue>,
    pub __profiles__: HashMap<ProfileName, YmlValue>,
}

impl DbtProfilesIntermediate {
    pub fn from_yml_str(text: &str) -> FsResult<Self> {
        let value: YmlValue = dbt_serde_yaml::from_str(text)
            .map_err(|e| Box::new(FsError::from_yaml_err(e, "Failed to parse profiles.yml")))?;
        let profiles = dbt_serde_yaml::from_value::<DbtProfilesIntermediate>(value)
            .map_err(|e| Box::new(FsError::from_yaml_err(e, "Failed to parse profiles.yml")))?;
        if profiles.config.is_some() {
            return err!(
                ErrorCode::InvalidConfig,
                "Unexpected 'config' key in profiles.yml"
            );
        }
        Ok(profiles)
    }

    pub fn db_targets(&self, profile_name: &str) -> FsResult<DbTargets> {
        let profile_val = self.__profiles__.get(profile_name).ok_or_else(|| {
            fs_err!(
                ErrorCode::InvalidConfig,
                "Profile '{}' not found in profiles.yml",
                profile_name
            )
        })?;
        dbt_serde_yaml::from_value::<DbTargets>(profile_val.clone()).map_err(|e| {
            Box::new(FsError::from_yaml_err(
                e,
                format!("Failed to parse profile '{profile_name}' in profiles.yml"),
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DbTargets {
    #[serde(rename = "target", default = "default_target")]
    pub default_target: DefaultTargetName,
    pub outputs: BTreeMap<TargetName, YmlValue>,
}

fn default_target() -> String {
    "default".to_string()
}

impl DbTargets {
    pub fn target(&self, target_name: &str) -> FsResult<&YmlValue> {
        self.outputs.get(target_name).ok_or_else(|| {
            fs_err!(
                ErrorCode::InvalidConfig,
                "The profile target '{}' was not found. Valid target names for this profile are: {}",
                target_name,
                self.outputs.keys().cloned().collect::<Vec<_>>().join(", ")
            )
        })
    }
}

/// Target config of a `type: pal` output.
///
/// The real connection parameters live in the sibling target named by
/// `db_profile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PalDbConfig {
    pub db_profile: String,
    pub database: String,
    pub schema: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<StringOrInteger>,
}
