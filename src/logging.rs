use std::fs::OpenOptions;
use std::path::PathBuf;

use log::LevelFilter;

use crate::config::LoggingSettings;
use crate::eval::{CheckResult, ToolCall, stable_stringify};

/// Log target for final verdicts, so they can be filtered from trace output.
pub const DECISION_TARGET: &str = "toolgate_policy::decision";

/// Install a file logger at the configured path and level.
///
/// Best effort: returns `false` when no path is configured, the file cannot
/// be opened, or a logger is already installed. Evaluation never depends on it.
pub fn init(settings: &LoggingSettings) -> bool {
    if settings.file.is_empty() {
        return false;
    }
    let level = settings.level.parse().unwrap_or(LevelFilter::Info);
    let path = PathBuf::from(shellexpand::tilde(&settings.file).into_owned());
    if let Some(dir) = path.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) else {
        return false;
    };
    let config = simplelog::ConfigBuilder::new()
        .set_time_format_rfc3339()
        .build();
    simplelog::WriteLogger::init(level, config, file).is_ok()
}

/// Emit one line per final verdict: decision, tool, what ran, and what decided.
pub fn log_decision(call: &ToolCall, command_arg: &str, result: &CheckResult) {
    log::info!(
        target: DECISION_TARGET,
        "{}\t{}\t{}\t{}",
        result.decision.label(),
        call.name,
        call_detail(call, command_arg),
        describe_origin(result),
    );
}

/// The command string for shell calls, otherwise the serialized arguments.
fn call_detail(call: &ToolCall, command_arg: &str) -> String {
    let detail = match call.str_arg(command_arg) {
        Some(command) => command.to_string(),
        None => stable_stringify(&call.args),
    };
    let oneline = detail.replace('\n', "; ");
    oneline.chars().take(200).collect()
}

/// Where a verdict came from, for audit output.
pub fn describe_origin(result: &CheckResult) -> String {
    let mut origin = match &result.rule {
        Some(rule) => format!(
            "rule(priority={}, source={})",
            rule.priority,
            rule.source.as_deref().unwrap_or("-")
        ),
        None => "default".to_string(),
    };
    if let Some(reason) = &result.reason {
        origin.push_str(": ");
        origin.push_str(&reason.replace('\n', "; "));
    }
    origin
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::PolicyDecision;
    use crate::rules::PolicyRule;
    use serde_json::json;

    #[test]
    fn origin_names_rule() {
        let rule = PolicyRule {
            decision: PolicyDecision::Deny,
            priority: 4010,
            source: Some("user.toml".into()),
            ..Default::default()
        };
        let result = CheckResult::new(PolicyDecision::Deny, Some(rule));
        assert_eq!(describe_origin(&result), "rule(priority=4010, source=user.toml)");
    }

    #[test]
    fn origin_without_rule_is_default() {
        let result = CheckResult::new(PolicyDecision::AskUser, None)
            .with_reason("output redirection (>)");
        assert_eq!(describe_origin(&result), "default: output redirection (>)");
    }

    #[test]
    fn detail_prefers_command() {
        let call = ToolCall::new("shell_exec", json!({"command": "ls\npwd", "dir_path": "/"}));
        assert_eq!(call_detail(&call, "command"), "ls; pwd");
        let call = ToolCall::new("read_file", json!({"path": "a", "limit": 3}));
        assert_eq!(call_detail(&call, "command"), r#"{"limit":3,"path":"a"}"#);
    }

    #[test]
    fn init_without_file_is_noop() {
        assert!(!init(&LoggingSettings::default()));
    }
}
