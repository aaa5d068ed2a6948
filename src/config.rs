use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::eval::PolicyDecision;
use crate::rules::ApprovalMode;

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

// ── Final (merged) config types ──

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub shell: ShellSettings,
    #[serde(default)]
    pub aliases: AliasSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct EngineSettings {
    #[serde(default)]
    pub default_decision: PolicyDecision,
    #[serde(default)]
    pub approval_mode: ApprovalMode,
    #[serde(default)]
    pub non_interactive: bool,
    #[serde(default)]
    pub disable_hooks: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ShellSettings {
    /// Tool names whose command argument is decomposed.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Argument key carrying the command string.
    #[serde(default)]
    pub command_arg: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AliasSettings {
    /// Legacy tool name → canonical tool name.
    #[serde(default)]
    pub legacy: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LoggingSettings {
    /// `off`, `error`, `warn`, `info`, `debug` or `trace`.
    #[serde(default)]
    pub level: String,
    /// Decision log path; `~` is expanded.
    #[serde(default)]
    pub file: String,
}

// ── Overlay types (user config that merges with defaults) ──

#[derive(Debug, Deserialize, Default)]
struct ConfigOverlay {
    #[serde(default)]
    engine: EngineOverlay,
    #[serde(default)]
    shell: ShellOverlay,
    #[serde(default)]
    aliases: AliasOverlay,
    #[serde(default)]
    logging: LoggingOverlay,
}

#[derive(Debug, Deserialize, Default)]
struct EngineOverlay {
    default_decision: Option<PolicyDecision>,
    approval_mode: Option<ApprovalMode>,
    non_interactive: Option<bool>,
    disable_hooks: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ShellOverlay {
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default)]
    remove_tools: Vec<String>,
    command_arg: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct AliasOverlay {
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    legacy: BTreeMap<String, String>,
    #[serde(default)]
    remove: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LoggingOverlay {
    level: Option<String>,
    file: Option<String>,
}

// ── Merge logic ──

/// Merge a user list into a default list.
/// In replace mode: user list replaces default entirely.
/// In merge mode: remove items first, then extend with additions (deduped).
fn merge_list(base: &mut Vec<String>, add: Vec<String>, remove: &[String], replace: bool) {
    if replace {
        *base = add;
    } else {
        base.retain(|item| !remove.contains(item));
        for item in add {
            if !base.contains(&item) {
                base.push(item);
            }
        }
    }
}

fn merge_map(
    base: &mut BTreeMap<String, String>,
    add: BTreeMap<String, String>,
    remove: &[String],
    replace: bool,
) {
    if replace {
        *base = add;
    } else {
        base.retain(|k, _| !remove.contains(k));
        base.extend(add);
    }
}

impl Config {
    /// Load the default embedded configuration.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
    }

    /// Embedded defaults merged with `~/.config/toolgate-policy/config.toml`
    /// when it exists. A malformed user file is logged and ignored.
    pub fn load() -> Self {
        let mut config = Self::default_config();
        match Self::load_overlay() {
            Some(Ok(overlay)) => config.apply_overlay(overlay),
            Some(Err(e)) => log::warn!("ignoring user config: {e}"),
            None => {}
        }
        config
    }

    /// Defaults merged with an overlay given as TOML text.
    pub fn from_overlay_str(toml_str: &str) -> Result<Self> {
        let overlay: ConfigOverlay = toml::from_str(toml_str)?;
        let mut config = Self::default_config();
        config.apply_overlay(overlay);
        Ok(config)
    }

    fn load_overlay() -> Option<Result<ConfigOverlay>> {
        let home = std::env::var_os("HOME")?;
        let path = std::path::Path::new(&home).join(".config/toolgate-policy/config.toml");
        let content = std::fs::read_to_string(path).ok()?;
        Some(toml::from_str(&content).map_err(Into::into))
    }

    /// Apply an overlay on top of this config (merge semantics).
    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        let e = overlay.engine;
        if let Some(v) = e.default_decision {
            self.engine.default_decision = v;
        }
        if let Some(v) = e.approval_mode {
            self.engine.approval_mode = v;
        }
        if let Some(v) = e.non_interactive {
            self.engine.non_interactive = v;
        }
        if let Some(v) = e.disable_hooks {
            self.engine.disable_hooks = v;
        }

        let s = overlay.shell;
        merge_list(&mut self.shell.tools, s.tools, &s.remove_tools, s.replace);
        if let Some(v) = s.command_arg {
            self.shell.command_arg = v;
        }

        let a = overlay.aliases;
        merge_map(&mut self.aliases.legacy, a.legacy, &a.remove, a.replace);

        let l = overlay.logging;
        if let Some(v) = l.level {
            self.logging.level = v;
        }
        if let Some(v) = l.file {
            self.logging.file = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_parses() {
        let config = Config::default_config();
        assert_eq!(config.engine.default_decision, PolicyDecision::AskUser);
        assert_eq!(config.engine.approval_mode, ApprovalMode::Default);
        assert!(!config.engine.non_interactive);
        assert!(config.shell.tools.contains(&"run_shell_command".to_string()));
        assert_eq!(config.shell.command_arg, "command");
        assert_eq!(
            config.aliases.legacy.get("search_file_content").map(String::as_str),
            Some("grep_search")
        );
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn overlay_overrides_engine_scalars() {
        let config = Config::from_overlay_str(
            r#"
            [engine]
            default_decision = "deny"
            approval_mode = "auto_edit"
            non_interactive = true
        "#,
        )
        .unwrap();
        assert_eq!(config.engine.default_decision, PolicyDecision::Deny);
        assert_eq!(config.engine.approval_mode, ApprovalMode::AutoEdit);
        assert!(config.engine.non_interactive);
        assert!(!config.engine.disable_hooks);
    }

    #[test]
    fn overlay_extends_shell_tools() {
        let config = Config::from_overlay_str(
            r#"
            [shell]
            tools = ["bash", "shell_exec"]
        "#,
        )
        .unwrap();
        assert!(config.shell.tools.contains(&"run_shell_command".to_string()));
        assert!(config.shell.tools.contains(&"bash".to_string()));
        let count = config.shell.tools.iter().filter(|t| *t == "shell_exec").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn overlay_removes_and_replaces_shell_tools() {
        let removed = Config::from_overlay_str(
            r#"
            [shell]
            remove_tools = ["shell_exec"]
        "#,
        )
        .unwrap();
        assert!(!removed.shell.tools.contains(&"shell_exec".to_string()));

        let replaced = Config::from_overlay_str(
            r#"
            [shell]
            replace = true
            tools = ["bash"]
        "#,
        )
        .unwrap();
        assert_eq!(replaced.shell.tools, vec!["bash"]);
    }

    #[test]
    fn overlay_merges_aliases() {
        let config = Config::from_overlay_str(
            r#"
            [aliases]
            remove = ["replace"]
            legacy = { glob_search = "glob" }
        "#,
        )
        .unwrap();
        assert!(!config.aliases.legacy.contains_key("replace"));
        assert!(config.aliases.legacy.contains_key("search_file_content"));
        assert_eq!(
            config.aliases.legacy.get("glob_search").map(String::as_str),
            Some("glob")
        );
    }

    #[test]
    fn malformed_overlay_is_error() {
        assert!(Config::from_overlay_str("[engine]\ndefault_decision = \"maybe\"").is_err());
    }

    #[test]
    fn empty_overlay_changes_nothing() {
        let original = Config::default_config();
        let config = Config::from_overlay_str("").unwrap();
        assert_eq!(config.shell.tools, original.shell.tools);
        assert_eq!(config.aliases.legacy, original.aliases.legacy);
        assert_eq!(config.logging.file, original.logging.file);
    }
}
