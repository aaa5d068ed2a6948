use super::{ApprovalMode, RuleSpec, ToolAnnotations};

/// Separator between the server and tool halves of a qualified tool name.
pub const QUALIFIED_SEPARATOR: &str = "__";

/// Everything about a call the matcher looks at.
#[derive(Debug, Clone, Copy)]
pub struct MatchInput<'a> {
    /// The name being tried (the call's name or one of its aliases).
    pub tool_name: &'a str,
    /// Key-sorted JSON of the call's arguments, when any rule needs it.
    pub stringified_args: Option<&'a str>,
    /// Server the call originates from, if it came through one.
    pub server_name: Option<&'a str>,
    pub approval_mode: ApprovalMode,
    pub annotations: Option<&'a ToolAnnotations>,
}

/// A rule matches when every constraint it specifies holds.
pub fn rule_matches(rule: &impl RuleSpec, input: &MatchInput<'_>) -> bool {
    let modes = rule.modes();
    if !modes.is_empty() && !modes.contains(&input.approval_mode) {
        return false;
    }

    if let Some(pattern) = rule.tool_name()
        && !name_matches(pattern, input.tool_name, input.server_name)
    {
        return false;
    }

    let required = rule.tool_annotations();
    if !required.is_empty() {
        let Some(actual) = input.annotations else {
            return false;
        };
        if !required.iter().all(|(k, v)| actual.get(k) == Some(v)) {
            return false;
        }
    }

    if let Some(args_pattern) = rule.args_pattern() {
        let Some(args) = input.stringified_args else {
            return false;
        };
        if !args_pattern.is_match(args) {
            return false;
        }
    }

    true
}

/// Name constraint: exact match, or wildcard match when the pattern has `*`.
pub fn name_matches(pattern: &str, tool_name: &str, server_name: Option<&str>) -> bool {
    if is_wildcard_pattern(pattern) {
        return matches_wildcard(pattern, tool_name, server_name);
    }
    if pattern != tool_name {
        return false;
    }
    // A qualified rule name only applies to tools carrying the caller's own prefix.
    match server_name {
        Some(server) if pattern.contains(QUALIFIED_SEPARATOR) => {
            has_server_prefix(tool_name, server)
        }
        _ => true,
    }
}

pub fn is_wildcard_pattern(pattern: &str) -> bool {
    pattern.contains('*')
}

/// Match `*` or a `server__tool` composite where either half may be `*`.
///
/// With an explicit `server_name`, the tool name must already carry that
/// server's prefix; otherwise the qualified pair is split off the tool name.
pub fn matches_wildcard(pattern: &str, tool_name: &str, server_name: Option<&str>) -> bool {
    if pattern == "*" {
        return true;
    }
    let Some((pattern_server, pattern_tool)) = pattern.split_once(QUALIFIED_SEPARATOR) else {
        return false;
    };

    let (actual_server, actual_tool) = match server_name {
        Some(server) => {
            if !has_server_prefix(tool_name, server) {
                return false;
            }
            (server, &tool_name[server.len() + QUALIFIED_SEPARATOR.len()..])
        }
        None => match tool_name.split_once(QUALIFIED_SEPARATOR) {
            Some(pair) => pair,
            None => return false,
        },
    };

    half_matches(pattern_server, actual_server) && half_matches(pattern_tool, actual_tool)
}

fn half_matches(pattern: &str, actual: &str) -> bool {
    pattern == "*" || pattern == actual
}

fn has_server_prefix(tool_name: &str, server: &str) -> bool {
    tool_name
        .strip_prefix(server)
        .is_some_and(|rest| rest.starts_with(QUALIFIED_SEPARATOR))
}

/// `server__tool`, unless `tool_name` already carries that prefix.
pub fn qualify(tool_name: &str, server_name: &str) -> Option<String> {
    if has_server_prefix(tool_name, server_name) {
        None
    } else {
        Some(format!("{server_name}{QUALIFIED_SEPARATOR}{tool_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::PolicyDecision;
    use crate::rules::{ArgsPattern, PolicyRule};
    use serde_json::json;

    fn input(tool_name: &str) -> MatchInput<'_> {
        MatchInput {
            tool_name,
            stringified_args: None,
            server_name: None,
            approval_mode: ApprovalMode::Default,
            annotations: None,
        }
    }

    fn named(name: &str) -> PolicyRule {
        PolicyRule {
            tool_name: Some(name.into()),
            decision: PolicyDecision::Allow,
            ..Default::default()
        }
    }

    #[test]
    fn unconstrained_rule_matches_anything() {
        assert!(rule_matches(&PolicyRule::default(), &input("whatever")));
    }

    #[test]
    fn exact_name() {
        assert!(rule_matches(&named("read_file"), &input("read_file")));
        assert!(!rule_matches(&named("read_file"), &input("write_file")));
    }

    #[test]
    fn bare_star_matches_all() {
        assert!(rule_matches(&named("*"), &input("anything")));
    }

    #[test]
    fn composite_without_server_splits_name() {
        assert!(matches_wildcard("github__*", "github__create_issue", None));
        assert!(matches_wildcard("*__create_issue", "github__create_issue", None));
        assert!(!matches_wildcard("github__*", "gitlab__create_issue", None));
        assert!(!matches_wildcard("github__*", "create_issue", None));
    }

    #[test]
    fn composite_with_server_requires_prefix() {
        assert!(matches_wildcard("trusted__*", "trusted__read", Some("trusted")));
        assert!(!matches_wildcard("trusted__*", "read", Some("trusted")));
    }

    #[test]
    fn server_cannot_spoof_another_namespace() {
        assert!(!matches_wildcard(
            "trusted__*",
            "trusted__evil",
            Some("malicious")
        ));
        assert!(!matches_wildcard(
            "trusted__*",
            "malicious__trusted__evil",
            Some("malicious")
        ));
    }

    #[test]
    fn exact_qualified_name_respects_server() {
        assert!(name_matches("trusted__read", "trusted__read", Some("trusted")));
        assert!(!name_matches(
            "trusted__read",
            "trusted__read",
            Some("malicious")
        ));
        assert!(name_matches("trusted__read", "trusted__read", None));
    }

    #[test]
    fn server_prefix_needs_separator() {
        assert!(!matches_wildcard("trust__*", "trusted__x", Some("trust")));
    }

    #[test]
    fn mode_constraint() {
        let rule = PolicyRule {
            modes: vec![ApprovalMode::Yolo],
            ..Default::default()
        };
        assert!(!rule_matches(&rule, &input("x")));
        let yolo = MatchInput {
            approval_mode: ApprovalMode::Yolo,
            ..input("x")
        };
        assert!(rule_matches(&rule, &yolo));
    }

    #[test]
    fn annotation_subset() {
        let mut required = ToolAnnotations::new();
        required.insert("readOnlyHint".into(), json!(true));
        let rule = PolicyRule {
            tool_annotations: required,
            ..Default::default()
        };

        assert!(!rule_matches(&rule, &input("x")));

        let mut actual = ToolAnnotations::new();
        actual.insert("readOnlyHint".into(), json!(true));
        actual.insert("title".into(), json!("Reader"));
        let with = MatchInput {
            annotations: Some(&actual),
            ..input("x")
        };
        assert!(rule_matches(&rule, &with));

        actual.insert("readOnlyHint".into(), json!(false));
        let mismatched = MatchInput {
            annotations: Some(&actual),
            ..input("x")
        };
        assert!(!rule_matches(&rule, &mismatched));
    }

    #[test]
    fn args_pattern_needs_args() {
        let rule = PolicyRule {
            args_pattern: Some(ArgsPattern::new(r#""command":"git status"#).unwrap()),
            ..Default::default()
        };
        assert!(!rule_matches(&rule, &input("shell")));
        let args = r#"{"command":"git status --short"}"#;
        let with = MatchInput {
            stringified_args: Some(args),
            ..input("shell")
        };
        assert!(rule_matches(&rule, &with));
    }

    #[test]
    fn qualify_skips_already_prefixed() {
        assert_eq!(qualify("read", "srv").as_deref(), Some("srv__read"));
        assert_eq!(qualify("srv__read", "srv"), None);
    }
}
