//! `{{name}}` substitution over step arguments.
//!
//! Runs over the parsed argument map, never over serialized text, so substituted values
//! need no escaping. Only string values are rewritten; keys are left alone.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.-]*)\s*\}\}")
        .expect("placeholder regex should compile")
});

/// Returns `args` with every known `{{name}}` inside string values replaced.
///
/// Unknown placeholders are left as written.
pub fn substitute_args(
    args: &Map<String, Value>,
    vars: &BTreeMap<String, String>,
) -> Map<String, Value> {
    args.iter()
        .map(|(k, v)| (k.clone(), substitute_value(v, vars)))
        .collect()
}

fn substitute_value(value: &Value, vars: &BTreeMap<String, String>) -> Value {
    match value {
        Value::String(s) => Value::String(substitute_str(s, vars)),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute_value(v, vars)).collect()),
        Value::Object(map) => Value::Object(substitute_args(map, vars)),
        other => other.clone(),
    }
}

/// Replaces known placeholders in one string.
pub fn substitute_str(text: &str, vars: &BTreeMap<String, String>) -> String {
    if vars.is_empty() || !text.contains("{{") {
        return text.to_string();
    }
    PLACEHOLDER_RE
        .replace_all(text, |caps: &Captures| match vars.get(&caps[1]) {
            Some(v) => v.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// True when any string value still holds a placeholder.
pub fn has_placeholders(args: &Map<String, Value>) -> bool {
    fn walk(v: &Value) -> bool {
        match v {
            Value::String(s) => PLACEHOLDER_RE.is_match(s),
            Value::Array(items) => items.iter().any(walk),
            Value::Object(map) => map.values().any(walk),
            _ => false,
        }
    }
    args.values().any(walk)
}
