//! Safety checkers: semantic evaluators consulted after rule matching.
//!
//! The engine only depends on [`CheckerRunner`]. [`CheckerRegistry`] is the
//! stock runner, dispatching by checker name to in-process [`SafetyChecker`]s.

/// Denies calls whose path arguments escape the allowed roots.
pub mod allowed_path;

pub use allowed_path::AllowedPathChecker;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{PolicyError, Result};
use crate::eval::{PolicyDecision, ToolCall};
use crate::rules::CheckerRef;

/// A checker's verdict on one call.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckerResponse {
    pub decision: PolicyDecision,
    pub reason: Option<String>,
}

impl CheckerResponse {
    pub fn allow() -> Self {
        Self {
            decision: PolicyDecision::Allow,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            decision: PolicyDecision::Deny,
            reason: Some(reason.into()),
        }
    }

    pub fn ask_user(reason: impl Into<String>) -> Self {
        Self {
            decision: PolicyDecision::AskUser,
            reason: Some(reason.into()),
        }
    }
}

/// Runs the checker a rule refers to. An `Err` is treated as a denial.
#[async_trait]
pub trait CheckerRunner: Send + Sync {
    async fn run_checker(&self, call: &ToolCall, checker: &CheckerRef) -> Result<CheckerResponse>;
}

/// An in-process checker. `config` is the rule's [`CheckerRef::config`].
#[async_trait]
pub trait SafetyChecker: Send + Sync {
    async fn check(&self, call: &ToolCall, config: &Value) -> Result<CheckerResponse>;
}

/// Checkers keyed by name.
#[derive(Default)]
pub struct CheckerRegistry {
    checkers: HashMap<String, Box<dyn SafetyChecker>>,
}

impl CheckerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in checkers, confined to `roots`.
    pub fn with_builtins(roots: Vec<std::path::PathBuf>) -> Self {
        let mut registry = Self::new();
        registry.register(AllowedPathChecker::NAME, AllowedPathChecker::new(roots));
        registry
    }

    /// Register a checker, replacing any previous one with the same name.
    pub fn register(&mut self, name: impl Into<String>, checker: impl SafetyChecker + 'static) {
        self.checkers.insert(name.into(), Box::new(checker));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.checkers.contains_key(name)
    }
}

#[async_trait]
impl CheckerRunner for CheckerRegistry {
    async fn run_checker(&self, call: &ToolCall, checker: &CheckerRef) -> Result<CheckerResponse> {
        let Some(imp) = self.checkers.get(&checker.name) else {
            return Err(PolicyError::UnknownChecker(checker.name.clone()));
        };
        imp.check(call, &checker.config).await
    }
}
