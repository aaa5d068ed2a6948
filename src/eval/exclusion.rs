//! Static pass over the rule store computing which tools are unavailable.

use std::collections::{BTreeMap, BTreeSet};

use super::{PolicyDecision, PolicyEngine};
use crate::rules::matcher::{is_wildcard_pattern, matches_wildcard, name_matches};
use crate::rules::ToolAnnotations;

/// Tool names (or name patterns) already settled by a higher-priority rule.
#[derive(Default)]
struct Resolved {
    names: BTreeSet<String>,
}

impl Resolved {
    fn covers(&self, tool_name: &str) -> bool {
        self.names.contains(tool_name)
            || self
                .names
                .iter()
                .any(|p| is_wildcard_pattern(p) && matches_wildcard(p, tool_name, None))
    }

    fn insert(&mut self, name: &str) {
        self.names.insert(name.to_string());
    }
}

impl PolicyEngine {
    /// Tools that every call would be denied for under the current mode, so
    /// they can be dropped from a model's tool list up front.
    ///
    /// `tool_metadata` enables annotation-based rules; without it those rules
    /// are skipped. `all_tool_names` lets a global deny expand into concrete
    /// names; without it a global deny only excludes what rules name.
    pub fn excluded_tools(
        &self,
        tool_metadata: Option<&BTreeMap<String, ToolAnnotations>>,
        all_tool_names: Option<&BTreeSet<String>>,
    ) -> BTreeSet<String> {
        let mode = self.config.approval_mode;
        let mut excluded = BTreeSet::new();
        let mut resolved = Resolved::default();
        let mut global: Option<PolicyDecision> = None;

        for rule in self.rules.iter() {
            if !rule.modes.is_empty() && !rule.modes.contains(&mode) {
                continue;
            }
            let decision = self.downgrade(rule.decision);

            // An argument-conditioned rule never excludes a tool outright, but
            // one that can allow keeps lower rules from excluding it.
            if rule.args_pattern.is_some() {
                if let Some(name) = &rule.tool_name
                    && decision != PolicyDecision::Deny
                {
                    resolved.insert(name);
                }
                continue;
            }

            let targets: Vec<String> = if !rule.tool_annotations.is_empty() {
                let Some(metadata) = tool_metadata else {
                    continue;
                };
                metadata
                    .iter()
                    .filter(|(name, annotations)| {
                        rule.tool_name
                            .as_deref()
                            .is_none_or(|p| name_matches(p, name, None))
                            && rule
                                .tool_annotations
                                .iter()
                                .all(|(k, v)| annotations.get(k) == Some(v))
                    })
                    .map(|(name, _)| name.clone())
                    .collect()
            } else {
                match rule.tool_name.as_deref() {
                    None | Some("*") => {
                        if global.is_none() {
                            global = Some(decision);
                            if decision != PolicyDecision::Deny {
                                break;
                            }
                        }
                        continue;
                    }
                    Some(name) => vec![name.to_string()],
                }
            };

            // Below a global deny, every rule is shadowed by it.
            let effective = global.unwrap_or(decision);
            for target in targets {
                if resolved.covers(&target) {
                    continue;
                }
                if is_wildcard_pattern(&target) {
                    let expanded: Vec<&String> = all_tool_names
                        .into_iter()
                        .flatten()
                        .filter(|n| matches_wildcard(&target, n, None) && !resolved.covers(n))
                        .collect();
                    if effective == PolicyDecision::Deny {
                        match all_tool_names {
                            Some(_) => excluded.extend(expanded.into_iter().cloned()),
                            None => {
                                excluded.insert(target.clone());
                            }
                        }
                    }
                } else if effective == PolicyDecision::Deny {
                    excluded.insert(target.clone());
                }
                resolved.insert(&target);
            }
        }

        if global == Some(PolicyDecision::Deny)
            && let Some(all) = all_tool_names
        {
            for name in all {
                if !resolved.covers(name) {
                    excluded.insert(name.clone());
                }
            }
        }

        excluded
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::eval::PolicyEngineConfig;
    use crate::rules::{ApprovalMode, ArgsPattern, PolicyRule};

    fn rule(tool: Option<&str>, decision: PolicyDecision, priority: i32) -> PolicyRule {
        PolicyRule {
            tool_name: tool.map(String::from),
            decision,
            priority,
            ..Default::default()
        }
    }

    fn engine(rules: Vec<PolicyRule>) -> PolicyEngine {
        let mut engine = PolicyEngine::new(PolicyEngineConfig::default());
        for r in rules {
            engine.add_rule(r);
        }
        engine
    }

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn global_deny_with_specific_allow() {
        let e = engine(vec![
            rule(None, PolicyDecision::Deny, 0),
            rule(Some("read_file"), PolicyDecision::Allow, 10),
        ]);
        let all = names(&["read_file", "write_file", "exec"]);
        assert_eq!(e.excluded_tools(None, Some(&all)), names(&["exec", "write_file"]));
    }

    #[test]
    fn specific_deny_excluded() {
        let e = engine(vec![rule(Some("rm"), PolicyDecision::Deny, 1)]);
        assert_eq!(e.excluded_tools(None, None), names(&["rm"]));
    }

    #[test]
    fn higher_allow_shadows_lower_deny() {
        let e = engine(vec![
            rule(Some("rm"), PolicyDecision::Allow, 5),
            rule(Some("rm"), PolicyDecision::Deny, 1),
        ]);
        assert!(e.excluded_tools(None, None).is_empty());
    }

    #[test]
    fn global_allow_stops_scan() {
        let e = engine(vec![
            rule(None, PolicyDecision::Allow, 5),
            rule(Some("rm"), PolicyDecision::Deny, 1),
        ]);
        assert!(e.excluded_tools(None, None).is_empty());
    }

    #[test]
    fn rule_below_global_deny_is_shadowed() {
        let e = engine(vec![
            rule(None, PolicyDecision::Deny, 5),
            rule(Some("read_file"), PolicyDecision::Allow, 1),
        ]);
        let all = names(&["read_file"]);
        assert_eq!(e.excluded_tools(None, Some(&all)), names(&["read_file"]));
    }

    #[test]
    fn args_pattern_allow_protects_tool() {
        let e = engine(vec![
            PolicyRule {
                args_pattern: Some(ArgsPattern::new("git status").unwrap()),
                ..rule(Some("shell_exec"), PolicyDecision::Allow, 10)
            },
            rule(Some("shell_exec"), PolicyDecision::Deny, 1),
        ]);
        assert!(e.excluded_tools(None, None).is_empty());
    }

    #[test]
    fn args_pattern_deny_never_excludes() {
        let e = engine(vec![PolicyRule {
            args_pattern: Some(ArgsPattern::new("rm").unwrap()),
            ..rule(Some("shell_exec"), PolicyDecision::Deny, 10)
        }]);
        assert!(e.excluded_tools(None, None).is_empty());
    }

    #[test]
    fn inactive_mode_rules_ignored() {
        let e = engine(vec![PolicyRule {
            modes: vec![ApprovalMode::Plan],
            ..rule(Some("write_file"), PolicyDecision::Deny, 10)
        }]);
        assert!(e.excluded_tools(None, None).is_empty());

        let mut plan = engine(e.rules().to_vec());
        plan.set_approval_mode(ApprovalMode::Plan);
        assert_eq!(plan.excluded_tools(None, None), names(&["write_file"]));
    }

    #[test]
    fn wildcard_deny_expands_against_known_tools() {
        let e = engine(vec![
            rule(Some("github__list_issues"), PolicyDecision::Allow, 10),
            rule(Some("github__*"), PolicyDecision::Deny, 5),
        ]);
        let all = names(&["github__list_issues", "github__delete_repo", "read_file"]);
        assert_eq!(
            e.excluded_tools(None, Some(&all)),
            names(&["github__delete_repo"])
        );
        assert_eq!(e.excluded_tools(None, None), names(&["github__*"]));
    }

    #[test]
    fn wildcard_allow_covers_lower_specific_deny() {
        let e = engine(vec![
            rule(Some("github__*"), PolicyDecision::Allow, 10),
            rule(Some("github__delete_repo"), PolicyDecision::Deny, 5),
        ]);
        assert!(e.excluded_tools(None, None).is_empty());
    }

    #[test]
    fn annotation_rules_need_metadata() {
        let mut required = ToolAnnotations::new();
        required.insert("destructiveHint".into(), json!(true));
        let e = engine(vec![PolicyRule {
            tool_annotations: required,
            ..rule(None, PolicyDecision::Deny, 10)
        }]);
        assert!(e.excluded_tools(None, None).is_empty());

        let mut metadata = BTreeMap::new();
        let mut destructive = ToolAnnotations::new();
        destructive.insert("destructiveHint".into(), json!(true));
        metadata.insert("delete_file".to_string(), destructive);
        metadata.insert("read_file".to_string(), ToolAnnotations::new());
        assert_eq!(
            e.excluded_tools(Some(&metadata), None),
            names(&["delete_file"])
        );
    }

    #[test]
    fn ask_user_excluded_when_headless() {
        let mut e = engine(vec![rule(Some("write_file"), PolicyDecision::AskUser, 1)]);
        assert!(e.excluded_tools(None, None).is_empty());
        e.set_non_interactive(true);
        assert_eq!(e.excluded_tools(None, None), names(&["write_file"]));
    }
}
