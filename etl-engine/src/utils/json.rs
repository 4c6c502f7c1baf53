//! JSON lookup and rewriting helpers.

use serde_json::Value;

/// Look up a dot-separated path (`metadata.pages`) inside a JSON value.
///
/// Returns `None` when any segment is missing or an intermediate value is not an object.
pub fn value_at_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.')
        .try_fold(value, |current, key| current.as_object()?.get(key))
}

/// Replace `${VAR}` placeholders in every string of a JSON tree.
///
/// Unset variables expand to the empty string.
pub fn expand_env_placeholders(value: &mut Value) {
    expand_with(value, &|name| std::env::var(name).ok());
}

pub(crate) fn expand_with(value: &mut Value, lookup: &dyn Fn(&str) -> Option<String>) {
    match value {
        Value::String(s) => {
            if s.contains("${") {
                *s = expand_str(s, lookup);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| expand_with(v, lookup)),
        Value::Object(map) => map.values_mut().for_each(|v| expand_with(v, lookup)),
        _ => {}
    }
}

fn expand_str(input: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                out.push_str(&lookup(&after[..end]).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated placeholder, keep verbatim.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
