use serde::{Deserialize, Serialize};

use crate::rules::PolicyRule;

/// Verdict for a single tool call.
///
/// There is no ordering between variants: which verdict wins is decided by
/// rule priority and evaluation order, never by comparing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecision {
    Allow,
    Deny,
    #[default]
    AskUser,
}

impl PolicyDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyDecision::Allow => "allow",
            PolicyDecision::Deny => "deny",
            PolicyDecision::AskUser => "ask_user",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PolicyDecision::Allow => "ALLOW",
            PolicyDecision::Deny => "DENY",
            PolicyDecision::AskUser => "ASK_USER",
        }
    }

    /// Headless downgrade: with nobody to ask, `AskUser` becomes `Deny`.
    /// `Allow` and `Deny` are fixed points.
    pub fn non_interactive(self, non_interactive: bool) -> Self {
        match self {
            PolicyDecision::AskUser if non_interactive => PolicyDecision::Deny,
            other => other,
        }
    }
}

/// Outcome of an evaluation: the decision plus the rule that produced it.
///
/// `rule` is `None` when the engine default or an inherent policy (output
/// redirection, unparseable shell command) decided.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub decision: PolicyDecision,
    pub rule: Option<PolicyRule>,
    /// Checker verdict or inherent policy that shaped the decision, if any.
    pub reason: Option<String>,
}

impl CheckResult {
    pub fn new(decision: PolicyDecision, rule: Option<PolicyRule>) -> Self {
        Self {
            decision,
            rule,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_interactive_only_touches_ask_user() {
        assert_eq!(
            PolicyDecision::AskUser.non_interactive(true),
            PolicyDecision::Deny
        );
        assert_eq!(
            PolicyDecision::Allow.non_interactive(true),
            PolicyDecision::Allow
        );
        assert_eq!(
            PolicyDecision::Deny.non_interactive(true),
            PolicyDecision::Deny
        );
        assert_eq!(
            PolicyDecision::AskUser.non_interactive(false),
            PolicyDecision::AskUser
        );
    }

    #[test]
    fn non_interactive_is_idempotent() {
        for d in [
            PolicyDecision::Allow,
            PolicyDecision::Deny,
            PolicyDecision::AskUser,
        ] {
            for headless in [true, false] {
                let once = d.non_interactive(headless);
                assert_eq!(once.non_interactive(headless), once);
            }
        }
    }

    #[test]
    fn decision_serializes_snake_case() {
        let json = serde_json::to_string(&PolicyDecision::AskUser).unwrap();
        assert_eq!(json, "\"ask_user\"");
        let d: PolicyDecision = serde_json::from_str("\"deny\"").unwrap();
        assert_eq!(d, PolicyDecision::Deny);
    }
}
