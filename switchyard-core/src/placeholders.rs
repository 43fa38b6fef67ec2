//! `{{key}}` placeholder substitution for prompts

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::LazyLock;

static PLACEHOLDER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.-]*)\s*\}\}").unwrap());

/// Which operate fields receive placeholder substitution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderTargets {
    pub input: bool,
    pub instructions: bool,
    pub system: bool,
}

impl Default for PlaceholderTargets {
    fn default() -> Self {
        Self {
            input: true,
            instructions: true,
            system: true,
        }
    }
}

/// Replace `{{key}}` and `{{ a.b }}` with values from `data`.
///
/// Strings are inserted verbatim, other values as JSON. Unknown keys are left as written.
pub fn placeholders(template: &str, data: &Map<String, Value>) -> String {
    PLACEHOLDER_PATTERN
        .replace_all(template, |caps: &Captures| match lookup(data, &caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn lookup<'a>(data: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(value) = data.get(path) {
        return Some(value);
    }
    let mut segments = path.split('.');
    let mut current = data.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
