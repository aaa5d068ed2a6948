//! Rule model: authorization rules, checker bindings, approval modes, and tiers.

/// Predicate logic deciding whether one rule applies to one call.
pub mod matcher;
/// Priority-ordered storage shared by rules and checker bindings.
pub mod store;

pub use matcher::{MatchInput, rule_matches};
pub use store::RuleStore;

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, Result};
use crate::eval::PolicyDecision;

/// Tool metadata a rule can require, e.g. `{"readOnlyHint": true}`.
pub type ToolAnnotations = BTreeMap<String, serde_json::Value>;

/// Sources starting with this prefix are runtime grants rather than loaded policy.
pub const DYNAMIC_SOURCE_PREFIX: &str = "Dynamic";

/// Width of one priority tier band.
pub const TIER_WIDTH: i32 = 1000;

/// Session-wide approval stance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    #[default]
    Default,
    AutoEdit,
    Yolo,
    Plan,
}

impl ApprovalMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalMode::Default => "default",
            ApprovalMode::AutoEdit => "auto_edit",
            ApprovalMode::Yolo => "yolo",
            ApprovalMode::Plan => "plan",
        }
    }

    /// Modes in which output redirection does not force confirmation.
    pub fn permits_redirection(self) -> bool {
        matches!(self, ApprovalMode::AutoEdit | ApprovalMode::Yolo)
    }
}

/// Layer a policy source belongs to. Higher tiers outrank lower ones because
/// every priority in a tier's band is larger than any priority below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PolicyTier {
    Default = 1,
    Extension = 2,
    Workspace = 3,
    User = 4,
    Admin = 5,
}

impl PolicyTier {
    pub fn value(self) -> i32 {
        self as i32
    }

    /// Absolute priority for a rule ranked `local` within this tier.
    /// `local` is clamped into the band so it cannot leak into a neighbour.
    pub fn priority(self, local: i32) -> i32 {
        self.value() * TIER_WIDTH + local.clamp(0, TIER_WIDTH - 1)
    }

    /// Tier band an absolute priority falls into.
    pub fn band_of(priority: i32) -> i32 {
        priority.div_euclid(TIER_WIDTH)
    }
}

/// Compiled argument regex, compared by source text.
#[derive(Debug, Clone)]
pub struct ArgsPattern(Regex);

impl ArgsPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|source| PolicyError::InvalidArgsPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn is_match(&self, stringified_args: &str) -> bool {
        self.0.is_match(stringified_args)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for ArgsPattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl fmt::Display for ArgsPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One authorization rule.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolicyRule {
    pub decision: PolicyDecision,
    /// `None` matches every tool. May be `*` or a `server__tool` composite.
    pub tool_name: Option<String>,
    /// Tested against the key-sorted JSON serialization of the call's arguments.
    pub args_pattern: Option<ArgsPattern>,
    /// Must be a subset of the tool's declared annotations.
    pub tool_annotations: ToolAnnotations,
    pub priority: i32,
    pub source: Option<String>,
    /// Empty means every mode.
    pub modes: Vec<ApprovalMode>,
    /// Lets a shell rule allow output redirection without confirmation.
    pub allow_redirection: bool,
}

/// Reference to an external checker implementation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CheckerRef {
    pub name: String,
    /// Checker-specific settings, passed through untouched.
    pub config: serde_json::Value,
}

impl CheckerRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: serde_json::Value::Null,
        }
    }
}

/// Binds a safety checker to the calls its predicate matches.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SafetyCheckerRule {
    pub tool_name: Option<String>,
    pub args_pattern: Option<ArgsPattern>,
    pub tool_annotations: ToolAnnotations,
    pub priority: i32,
    pub source: Option<String>,
    pub modes: Vec<ApprovalMode>,
    pub checker: CheckerRef,
}

/// Binds a checker to hook invocations, optionally restricted to one event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HookCheckerRule {
    pub event_name: Option<String>,
    pub tool_name: Option<String>,
    pub args_pattern: Option<ArgsPattern>,
    pub tool_annotations: ToolAnnotations,
    pub priority: i32,
    pub source: Option<String>,
    pub modes: Vec<ApprovalMode>,
    pub checker: CheckerRef,
}

/// The matching surface shared by every rule kind.
pub trait RuleSpec {
    fn tool_name(&self) -> Option<&str>;
    fn args_pattern(&self) -> Option<&ArgsPattern>;
    fn tool_annotations(&self) -> &ToolAnnotations;
    fn modes(&self) -> &[ApprovalMode];
    fn priority(&self) -> i32;
    fn source(&self) -> Option<&str>;

    fn is_dynamic(&self) -> bool {
        self.source()
            .is_some_and(|s| s.starts_with(DYNAMIC_SOURCE_PREFIX))
    }
}

macro_rules! impl_rule_spec {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl RuleSpec for $ty {
                fn tool_name(&self) -> Option<&str> {
                    self.tool_name.as_deref()
                }
                fn args_pattern(&self) -> Option<&ArgsPattern> {
                    self.args_pattern.as_ref()
                }
                fn tool_annotations(&self) -> &ToolAnnotations {
                    &self.tool_annotations
                }
                fn modes(&self) -> &[ApprovalMode] {
                    &self.modes
                }
                fn priority(&self) -> i32 {
                    self.priority
                }
                fn source(&self) -> Option<&str> {
                    self.source.as_deref()
                }
            }
        )+
    };
}

impl_rule_spec!(PolicyRule, SafetyCheckerRule, HookCheckerRule);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_priorities_are_banded() {
        assert_eq!(PolicyTier::User.priority(5), 4005);
        assert_eq!(PolicyTier::band_of(4005), 4);
        assert!(PolicyTier::Admin.priority(0) > PolicyTier::User.priority(999));
    }

    #[test]
    fn tier_local_priority_is_clamped() {
        assert_eq!(PolicyTier::Default.priority(5000), 1999);
        assert_eq!(PolicyTier::Default.priority(-3), 1000);
    }

    #[test]
    fn band_of_negative_priority() {
        assert_eq!(PolicyTier::band_of(-1), -1);
        assert_eq!(PolicyTier::band_of(10), 0);
    }

    #[test]
    fn invalid_args_pattern_is_error() {
        let err = ArgsPattern::new("(unclosed").unwrap_err();
        assert!(matches!(err, PolicyError::InvalidArgsPattern { .. }));
    }

    #[test]
    fn args_patterns_compare_by_source() {
        assert_eq!(
            ArgsPattern::new("a+").unwrap(),
            ArgsPattern::new("a+").unwrap()
        );
    }

    #[test]
    fn dynamic_source_detection() {
        let rule = PolicyRule {
            source: Some("Dynamic (session)".into()),
            ..Default::default()
        };
        assert!(rule.is_dynamic());
        assert!(!PolicyRule::default().is_dynamic());
    }

    #[test]
    fn redirection_modes() {
        assert!(ApprovalMode::Yolo.permits_redirection());
        assert!(ApprovalMode::AutoEdit.permits_redirection());
        assert!(!ApprovalMode::Default.permits_redirection());
        assert!(!ApprovalMode::Plan.permits_redirection());
    }
}
