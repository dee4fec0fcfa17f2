// ----------------------------------------------------------------------------------------------
// dbt inputs
pub const DBT_PROFILES_YML: &str = "profiles.yml";
pub const DBT_DEFAULT_PROFILES_DIR_NAME: &str = ".dbt";

// ----------------------------------------------------------------------------------------------
// environment
pub const DBT_PROFILES_DIR_ENV: &str = "DBT_PROFILES_DIR";

// ----------------------------------------------------------------------------------------------
// python models

// Separator the compiled python model uses between the user's code and the
// engine-specific glue appended after it.
pub const PYTHON_COMMAND_SEPARATOR: &str = "# COMMAND ----------";
