//! Cleanup of compiled python model source before in-process execution.
//!
//! Compiled models carry bootstrap for a cluster runtime (spark session
//! setup) and engine glue after the user's code. Both are stripped by literal
//! pattern; the source is not parsed.

use std::sync::LazyLock;

use dbt_common::constants::PYTHON_COMMAND_SEPARATOR;
use regex::Regex;

static CLUSTER_BOOTSTRAP_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(from pyspark|import pyspark|spark\s*[=.])").expect("valid regex")
});

/// Drops spark bootstrap lines. Other lines keep their order and line
/// terminators.
pub fn strip_cluster_bootstrap(code: &str) -> String {
    code.split_inclusive('\n')
        .filter(|line| !CLUSTER_BOOTSTRAP_LINE.is_match(line))
        .collect()
}

/// Keeps the text before the first command separator and the segment right
/// after it. Text without a separator is returned unchanged.
pub fn strip_engine_glue(code: &str) -> String {
    let mut segments = code.split(PYTHON_COMMAND_SEPARATOR);
    match (segments.next(), segments.next()) {
        (Some(head), Some(first)) => format!("{head}{first}"),
        _ => code.to_string(),
    }
}

pub fn sanitize_compiled_code(code: &str) -> String {
    strip_engine_glue(&strip_cluster_bootstrap(code))
}
