use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rules::matcher::qualify;

/// A named tool invocation with its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// String argument under `key`, if present.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }

    /// The same call with `key` replaced by `value`.
    pub fn with_str_arg(&self, key: &str, value: &str) -> Self {
        let mut args = match &self.args {
            Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        args.insert(key.to_string(), Value::String(value.to_string()));
        Self {
            name: self.name.clone(),
            args: Value::Object(args),
        }
    }
}

/// Legacy tool names mapped to their canonical names.
#[derive(Debug, Clone, Default)]
pub struct ToolAliases {
    legacy_to_canonical: HashMap<String, String>,
}

impl ToolAliases {
    pub fn new(legacy_to_canonical: HashMap<String, String>) -> Self {
        Self {
            legacy_to_canonical,
        }
    }

    /// `name`, its canonical name, and every other legacy name of that canonical.
    pub fn names_for(&self, name: &str) -> Vec<String> {
        let canonical = self
            .legacy_to_canonical
            .get(name)
            .map(String::as_str)
            .unwrap_or(name);

        let mut names = vec![name.to_string()];
        push_unique(&mut names, canonical);
        let mut legacy: Vec<&str> = self
            .legacy_to_canonical
            .iter()
            .filter(|(_, c)| c.as_str() == canonical)
            .map(|(l, _)| l.as_str())
            .collect();
        legacy.sort_unstable();
        for l in legacy {
            push_unique(&mut names, l);
        }
        names
    }
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

/// Names to try when matching `name`, including `server__alias` forms when
/// the call came through a server.
pub fn candidate_names(aliases: &ToolAliases, name: &str, server_name: Option<&str>) -> Vec<String> {
    let mut names = aliases.names_for(name);
    if let Some(server) = server_name {
        let qualified: Vec<String> = names.iter().filter_map(|n| qualify(n, server)).collect();
        for q in qualified {
            push_unique(&mut names, &q);
        }
    }
    names
}

/// JSON with object keys sorted at every level, so argument patterns see the
/// same text regardless of insertion order.
///
/// Objects are rebuilt in key order before serializing, which keeps the output
/// sorted even when serde_json's `preserve_order` feature is enabled.
pub fn stable_stringify(value: &Value) -> String {
    sorted(value).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sorted(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        scalar => scalar.clone(),
    }
}
