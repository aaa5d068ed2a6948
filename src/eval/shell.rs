//! Per-part evaluation of shell commands.
//!
//! A rule matched against a whole command string says nothing about the
//! individual commands it chains together, so every part is evaluated again
//! on its own. A denied part denies the whole command; a part needing
//! confirmation makes the whole command need confirmation.
//!
//! The split lists nested commands (substitutions, subshells) as parts of
//! their own, so each part is evaluated once, as a leaf.

use super::{CheckResult, Decompose, PolicyDecision, PolicyEngine, ToolCall};
use crate::rules::{ApprovalMode, PolicyRule, ToolAnnotations};

const UNPARSEABLE: &str = "shell command could not be parsed";

impl PolicyEngine {
    /// Evaluate a shell command that matched with `rule_decision`.
    ///
    /// `rule` is `None` when the engine default supplied the decision.
    pub(crate) async fn check_shell_command(
        &self,
        call: &ToolCall,
        command: &str,
        rule_decision: PolicyDecision,
        rule: Option<&PolicyRule>,
        server_name: Option<&str>,
        annotations: Option<&ToolAnnotations>,
    ) -> CheckResult {
        if let Err(e) = self.decomposer.initialize().await {
            log::warn!("{e}");
        }
        let parts = self.decomposer.split_commands(command);
        let mode = self.config.approval_mode;

        if parts.is_empty() {
            return match rule_decision {
                PolicyDecision::Deny => CheckResult::new(PolicyDecision::Deny, rule.cloned()),
                _ if mode == ApprovalMode::Yolo => {
                    CheckResult::new(PolicyDecision::Allow, rule.cloned())
                }
                _ => CheckResult::new(self.downgrade(PolicyDecision::AskUser), None)
                    .with_reason(UNPARSEABLE),
            };
        }

        if rule_decision == PolicyDecision::Deny {
            return CheckResult::new(PolicyDecision::Deny, rule.cloned());
        }

        let full = command.trim();
        let rule_allows_redirection = rule.is_some_and(|r| r.allow_redirection);
        let redirection_gated = |sub_rule: Option<&PolicyRule>| {
            !mode.permits_redirection()
                && !rule_allows_redirection
                && !sub_rule.is_some_and(|r| r.allow_redirection)
        };

        let mut aggregate = PolicyDecision::Allow;
        let mut responsible: Option<PolicyRule> = None;
        let mut reason = None;

        if redirection_gated(None)
            && let Some(redirect) = self.decomposer.redirection(full)
        {
            aggregate = PolicyDecision::AskUser;
            reason = Some(redirect.description());
        }

        for part in &parts {
            let part = part.trim();

            // The command is its own only part; the matched rule already covers it.
            if part == full {
                if rule_decision == PolicyDecision::AskUser && aggregate == PolicyDecision::Allow {
                    aggregate = PolicyDecision::AskUser;
                    responsible = rule.cloned();
                }
                continue;
            }

            let sub_call = call.with_str_arg(&self.config.command_arg, part);
            let sub = self
                .evaluate(&sub_call, server_name, annotations, Decompose::No)
                .await;
            log::debug!("  [{part}] -> {}", sub.decision.label());

            match sub.decision {
                PolicyDecision::Deny => {
                    let why = sub.reason.unwrap_or_else(|| format!("`{part}` is denied"));
                    return CheckResult::new(PolicyDecision::Deny, sub.rule).with_reason(why);
                }
                PolicyDecision::AskUser => {
                    if aggregate == PolicyDecision::Allow {
                        aggregate = PolicyDecision::AskUser;
                        responsible = sub.rule;
                        reason = sub.reason;
                    }
                }
                PolicyDecision::Allow => {
                    if aggregate == PolicyDecision::Allow
                        && redirection_gated(sub.rule.as_ref())
                        && let Some(redirect) = self.decomposer.redirection(part)
                    {
                        aggregate = PolicyDecision::AskUser;
                        responsible = None;
                        reason = Some(redirect.description());
                    }
                }
            }
        }

        let attributed = if aggregate == rule_decision {
            rule.cloned()
        } else {
            responsible
        };
        CheckResult {
            decision: self.downgrade(aggregate),
            rule: attributed,
            reason,
        }
    }
}
