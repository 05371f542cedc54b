//! Typed extraction of `tools/call` arguments
//!
//! Scalars are accepted either as native JSON values or as their string form
//! (`5` and `"5"` are both the integer 5). Anything else counts as absent.

use serde_json::{Map, Value};

use super::tools::ToolError;
use crate::device::UiSelector;

pub type Args = Map<String, Value>;

fn missing(key: &str) -> ToolError {
    ToolError::InvalidParams(format!("Missing arguments.{}", key))
}

pub fn opt_str(args: &Args, key: &str) -> Option<String> {
    match args.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn req_str(args: &Args, key: &str) -> Result<String, ToolError> {
    opt_str(args, key).ok_or_else(|| missing(key))
}

pub fn opt_i64(args: &Args, key: &str) -> Option<i64> {
    match args.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn req_i64(args: &Args, key: &str) -> Result<i64, ToolError> {
    opt_i64(args, key).ok_or_else(|| missing(key))
}

/// Strict boolean: `true`/`false` or the exact strings "true"/"false"
pub fn opt_bool(args: &Args, key: &str) -> Option<bool> {
    match args.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s == "true" => Some(true),
        Value::String(s) if s == "false" => Some(false),
        _ => None,
    }
}

pub fn selector(args: &Args) -> UiSelector {
    UiSelector {
        text: opt_str(args, "text"),
        content_description: opt_str(args, "contentDescription"),
        view_id: opt_str(args, "viewId"),
        class_name: opt_str(args, "className"),
        package_name: opt_str(args, "packageName"),
        clickable: opt_bool(args, "clickable"),
        editable: opt_bool(args, "editable"),
        enabled: opt_bool(args, "enabled"),
    }
}
