//! toolgate-policy: a policy decision engine for an agent's tool calls.
//!
//! Every proposed call is checked against a priority-ordered set of rules and
//! gets one of three verdicts: [`PolicyDecision::Allow`],
//! [`PolicyDecision::Deny`], or [`PolicyDecision::AskUser`]. Shell commands
//! are parsed with tree-sitter-bash and each sub-command is checked on its
//! own; safety checkers can tighten a verdict but never relax it.
//!
//! # Architecture
//!
//! - **[`rules`]**: rule model, matcher, and priority-sorted rule store.
//! - **[`eval`]**: the [`PolicyEngine`], shell evaluation, and the exclusion calculator.
//! - **[`parse`]**: shell decomposition and output-redirection detection.
//! - **[`checkers`]**: checker runner trait, registry, and built-in checkers.
//! - **[`service`]**: a single-owner task serializing checks and rule changes.
//! - **[`config`]**: embedded defaults plus user overlay.
//! - **[`logging`]**: decision logging to `~/.local/share/toolgate-policy/decisions.log`.

/// Safety checker traits, registry, and built-ins.
pub mod checkers;
/// Configuration types, loading, and overlay merge logic.
pub mod config;
pub mod error;
/// Evaluation engine: decisions, rule scan, shell parts, exclusions.
pub mod eval;
/// File-based decision logging.
pub mod logging;
/// Shell command decomposition.
pub mod parse;
pub mod rules;
pub mod service;

pub use error::{PolicyError, Result};
pub use eval::{CheckResult, PolicyDecision, PolicyEngine, PolicyEngineConfig, ToolCall};
pub use rules::{ApprovalMode, PolicyRule, PolicyTier};

/// Engine built from the embedded defaults merged with the user's config file.
pub fn engine_from_config() -> PolicyEngine {
    let config = config::Config::load();
    PolicyEngine::new(PolicyEngineConfig::from_config(&config))
}
