use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrInteger {
    String(String),
    Integer(i64),
}

impl Default for StringOrInteger {
    fn default() -> Self {
        StringOrInteger::String("".to_string())
    }
}

impl FromStr for StringOrInteger {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<i64>() {
            Ok(i) => StringOrInteger::Integer(i),
            Err(_) => StringOrInteger::String(s.to_string()),
        })
    }
}

impl std::fmt::Display for StringOrInteger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StringOrInteger::String(s) => write!(f, "{s}"),
            StringOrInteger::Integer(i) => write!(f, "{i}"),
        }
    }
}

impl StringOrInteger {
    /// Integer value, parsing the string variant if needed. Rendered profiles
    /// carry numbers as strings (e.g. `threads: "{{ env_var('THREADS') }}"`).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StringOrInteger::Integer(i) => Some(*i),
            StringOrInteger::String(s) => s.trim().parse().ok(),
        }
    }
}
