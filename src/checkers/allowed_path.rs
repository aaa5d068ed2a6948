use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use super::{CheckerResponse, SafetyChecker};
use crate::error::Result;
use crate::eval::ToolCall;

/// Argument keys treated as paths unless the rule's config names its own.
const DEFAULT_PATH_ARGS: &[&str] = &["file_path", "path", "dir_path", "directory", "absolute_path"];

/// Denies a call when any path-like argument resolves outside every root.
///
/// Resolution is lexical: `~` is expanded, relative paths are joined onto the
/// call's `dir_path` (or the first root), and `.`/`..` are folded. Symlinks
/// are not followed.
pub struct AllowedPathChecker {
    roots: Vec<PathBuf>,
}

impl AllowedPathChecker {
    pub const NAME: &'static str = "allowed-path";

    pub fn new(roots: Vec<PathBuf>) -> Self {
        let roots = roots.iter().map(|r| normalize(&expand(r))).collect();
        Self { roots }
    }

    fn inside_roots(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| path.starts_with(root))
    }

    fn resolve(&self, raw: &str, base: Option<&str>) -> PathBuf {
        let expanded = expand(Path::new(raw));
        if expanded.is_absolute() {
            return normalize(&expanded);
        }
        let base = match base {
            Some(b) => normalize(&expand(Path::new(b))),
            None => self.roots.first().cloned().unwrap_or_default(),
        };
        normalize(&base.join(expanded))
    }
}

#[async_trait]
impl SafetyChecker for AllowedPathChecker {
    async fn check(&self, call: &ToolCall, config: &Value) -> Result<CheckerResponse> {
        let keys = path_args(config);
        let base = call.str_arg("dir_path");

        for key in &keys {
            let Some(value) = call.args.get(key.as_str()) else {
                continue;
            };
            for raw in string_values(value) {
                // `dir_path` is itself the base for relative paths.
                let base = if key == "dir_path" { None } else { base };
                let resolved = self.resolve(raw, base);
                if !self.inside_roots(&resolved) {
                    return Ok(CheckerResponse::deny(format!(
                        "`{key}` resolves to {} which is outside the allowed roots",
                        resolved.display()
                    )));
                }
            }
        }
        Ok(CheckerResponse::allow())
    }
}

fn path_args(config: &Value) -> Vec<String> {
    match config.get("path_args").and_then(Value::as_array) {
        Some(keys) => keys
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        None => DEFAULT_PATH_ARGS.iter().map(|s| s.to_string()).collect(),
    }
}

fn string_values(value: &Value) -> Vec<&str> {
    match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).into_owned())
}

/// Fold `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
