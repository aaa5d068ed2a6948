pub mod context;
pub mod decision;
pub mod exclusion;
pub mod shell;

pub use context::{ToolAliases, ToolCall, candidate_names, stable_stringify};
pub use decision::{CheckResult, PolicyDecision};

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::checkers::CheckerRunner;
use crate::config::Config;
use crate::parse::{ShellDecomposer, TreeSitterDecomposer};
use crate::rules::{
    ApprovalMode, HookCheckerRule, MatchInput, PolicyRule, PolicyTier, RuleSpec, RuleStore,
    SafetyCheckerRule, ToolAnnotations, rule_matches,
};

/// Engine settings that are not rules.
#[derive(Debug, Clone)]
pub struct PolicyEngineConfig {
    /// Verdict when no rule matches.
    pub default_decision: PolicyDecision,
    pub approval_mode: ApprovalMode,
    /// Headless: `AskUser` verdicts become `Deny`.
    pub non_interactive: bool,
    pub disable_hooks: bool,
    /// Tools whose command argument is decomposed and evaluated per part.
    pub shell_tools: Vec<String>,
    /// Argument key carrying a shell tool's command string.
    pub command_arg: String,
    pub aliases: ToolAliases,
}

impl PolicyEngineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_decision: config.engine.default_decision,
            approval_mode: config.engine.approval_mode,
            non_interactive: config.engine.non_interactive,
            disable_hooks: config.engine.disable_hooks,
            shell_tools: config.shell.tools.clone(),
            command_arg: config.shell.command_arg.clone(),
            aliases: ToolAliases::new(
                config
                    .aliases
                    .legacy
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
        }
    }
}

impl Default for PolicyEngineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default_config())
    }
}

/// Whether a shell tool's command is split into parts during evaluation.
///
/// Parts come from one split of the full command, which already lists every
/// nested command, so a part is never split again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decompose {
    Yes,
    No,
}

/// Decides whether tool calls are allowed, denied, or need confirmation.
///
/// Evaluation takes `&self` and every mutation takes `&mut self`, so a rule
/// store cannot change under an evaluation that is suspended at an await
/// point. Callers sharing one engine across tasks should go through
/// [`crate::service`].
pub struct PolicyEngine {
    rules: RuleStore<PolicyRule>,
    checkers: RuleStore<SafetyCheckerRule>,
    hook_checkers: RuleStore<HookCheckerRule>,
    config: PolicyEngineConfig,
    decomposer: Arc<dyn ShellDecomposer>,
    checker_runner: Option<Arc<dyn CheckerRunner>>,
}

impl PolicyEngine {
    /// Engine with no rules, using the tree-sitter shell decomposer.
    pub fn new(config: PolicyEngineConfig) -> Self {
        Self {
            rules: RuleStore::new(),
            checkers: RuleStore::new(),
            hook_checkers: RuleStore::new(),
            config,
            decomposer: Arc::new(TreeSitterDecomposer::new()),
            checker_runner: None,
        }
    }

    pub fn with_decomposer(mut self, decomposer: Arc<dyn ShellDecomposer>) -> Self {
        self.decomposer = decomposer;
        self
    }

    pub fn with_checker_runner(mut self, runner: Arc<dyn CheckerRunner>) -> Self {
        self.checker_runner = Some(runner);
        self
    }

    pub fn config(&self) -> &PolicyEngineConfig {
        &self.config
    }

    // ── Mutation ──

    pub fn add_rule(&mut self, rule: PolicyRule) {
        self.rules.insert(rule);
    }

    pub fn add_checker(&mut self, checker: SafetyCheckerRule) {
        self.checkers.insert(checker);
    }

    pub fn add_hook_checker(&mut self, checker: HookCheckerRule) {
        self.hook_checkers.insert(checker);
    }

    pub fn remove_rules_by_tier(&mut self, tier: PolicyTier) -> usize {
        self.rules.remove_by_tier(tier)
    }

    pub fn remove_rules_by_source(&mut self, source: &str) -> usize {
        self.rules.remove_by_source(source)
    }

    pub fn remove_rules_for_tool(&mut self, tool_name: &str, source: Option<&str>) -> usize {
        self.rules.remove_for_tool(tool_name, source)
    }

    /// Removes safety and hook checkers in the tier band.
    pub fn remove_checkers_by_tier(&mut self, tier: PolicyTier) -> usize {
        self.checkers.remove_by_tier(tier) + self.hook_checkers.remove_by_tier(tier)
    }

    /// Removes safety and hook checkers from the source.
    pub fn remove_checkers_by_source(&mut self, source: &str) -> usize {
        self.checkers.remove_by_source(source) + self.hook_checkers.remove_by_source(source)
    }

    pub fn set_approval_mode(&mut self, mode: ApprovalMode) {
        log::debug!("approval mode: {} -> {}", self.config.approval_mode.as_str(), mode.as_str());
        self.config.approval_mode = mode;
    }

    pub fn approval_mode(&self) -> ApprovalMode {
        self.config.approval_mode
    }

    pub fn set_non_interactive(&mut self, non_interactive: bool) {
        self.config.non_interactive = non_interactive;
    }

    // ── Inspection ──

    /// Whether any rule names exactly `tool_name`; optionally ignoring runtime grants.
    pub fn has_rule_for_tool(&self, tool_name: &str, ignore_dynamic: bool) -> bool {
        self.rules
            .iter()
            .any(|r| r.tool_name.as_deref() == Some(tool_name) && !(ignore_dynamic && r.is_dynamic()))
    }

    pub fn rules(&self) -> &[PolicyRule] {
        self.rules.as_slice()
    }

    pub fn checkers(&self) -> &[SafetyCheckerRule] {
        self.checkers.as_slice()
    }

    pub fn hook_checkers(&self) -> &[HookCheckerRule] {
        self.hook_checkers.as_slice()
    }

    // ── Evaluation ──

    /// Decide a tool call. Logs the final verdict.
    pub fn check<'a>(
        &'a self,
        call: &'a ToolCall,
        server_name: Option<&'a str>,
        annotations: Option<&'a ToolAnnotations>,
    ) -> BoxFuture<'a, CheckResult> {
        Box::pin(async move {
            let result = self.evaluate(call, server_name, annotations, Decompose::Yes).await;
            crate::logging::log_decision(call, &self.config.command_arg, &result);
            result
        })
    }

    /// Rule scan, shell decomposition, and checker escalation for one call.
    /// Shell sub-commands come back through here with [`Decompose::No`].
    pub(crate) fn evaluate<'a>(
        &'a self,
        call: &'a ToolCall,
        server_name: Option<&'a str>,
        annotations: Option<&'a ToolAnnotations>,
        decompose: Decompose,
    ) -> BoxFuture<'a, CheckResult> {
        Box::pin(async move {
            let stringified = self.needs_stringified_args().then(|| stable_stringify(&call.args));
            let names = candidate_names(&self.config.aliases, &call.name, server_name);
            let shell_command = match decompose {
                Decompose::Yes => self.shell_command(call, &names),
                Decompose::No => None,
            };

            let mut decision = None;
            let mut matched: Option<PolicyRule> = None;
            let mut reason = None;

            for rule in self.rules.iter() {
                if !self.matches_any(rule, &names, stringified.as_deref(), server_name, annotations) {
                    continue;
                }
                log::debug!(
                    "{} matched rule priority={} decision={}",
                    call.name,
                    rule.priority,
                    rule.decision.label()
                );
                match shell_command {
                    Some(command) => {
                        let outcome = self
                            .check_shell_command(call, command, rule.decision, Some(rule), server_name, annotations)
                            .await;
                        decision = Some(outcome.decision);
                        reason = outcome.reason;
                        if outcome.rule.is_some() {
                            matched = outcome.rule;
                            break;
                        }
                    }
                    None => {
                        decision = Some(self.downgrade(rule.decision));
                        matched = Some(rule.clone());
                        break;
                    }
                }
            }

            let mut decision = match (decision, shell_command) {
                (Some(d), _) => d,
                (None, Some(command)) => {
                    let outcome = self
                        .check_shell_command(call, command, self.config.default_decision, None, server_name, annotations)
                        .await;
                    matched = outcome.rule;
                    reason = outcome.reason;
                    outcome.decision
                }
                (None, None) => self.downgrade(self.config.default_decision),
            };

            if decision != PolicyDecision::Deny
                && let Some(runner) = &self.checker_runner
            {
                for checker in self.checkers.iter() {
                    if !self.matches_any(checker, &names, stringified.as_deref(), server_name, annotations) {
                        continue;
                    }
                    match runner.run_checker(call, &checker.checker).await {
                        Ok(response) => match response.decision {
                            PolicyDecision::Deny => {
                                let why = response
                                    .reason
                                    .unwrap_or_else(|| format!("denied by checker `{}`", checker.checker.name));
                                return CheckResult::new(PolicyDecision::Deny, matched).with_reason(why);
                            }
                            PolicyDecision::AskUser => {
                                decision = PolicyDecision::AskUser;
                                reason = response.reason.or(reason);
                            }
                            PolicyDecision::Allow => {}
                        },
                        Err(e) => {
                            log::warn!("checker `{}` failed, denying: {e}", checker.checker.name);
                            return CheckResult::new(PolicyDecision::Deny, matched).with_reason(e.to_string());
                        }
                    }
                }
            }

            CheckResult {
                decision: self.downgrade(decision),
                rule: matched,
                reason,
            }
        })
    }

    /// Run hook checkers bound to `event_name` against a call.
    ///
    /// Starts from `Allow`; a checker `Deny` or failure is terminal, `AskUser`
    /// escalates. Returns `Allow` when hooks are disabled or no runner is set.
    pub async fn check_hook(
        &self,
        event_name: &str,
        call: &ToolCall,
        server_name: Option<&str>,
        annotations: Option<&ToolAnnotations>,
    ) -> CheckResult {
        let Some(runner) = self.checker_runner.as_ref().filter(|_| !self.config.disable_hooks) else {
            return CheckResult::new(PolicyDecision::Allow, None);
        };
        let stringified = self
            .hook_checkers
            .any_args_pattern()
            .then(|| stable_stringify(&call.args));
        let names = candidate_names(&self.config.aliases, &call.name, server_name);

        let mut decision = PolicyDecision::Allow;
        let mut reason = None;
        for hook in self.hook_checkers.iter() {
            if hook.event_name.as_deref().is_some_and(|e| e != event_name) {
                continue;
            }
            if !self.matches_any(hook, &names, stringified.as_deref(), server_name, annotations) {
                continue;
            }
            match runner.run_checker(call, &hook.checker).await {
                Ok(response) => match response.decision {
                    PolicyDecision::Deny => {
                        let why = response
                            .reason
                            .unwrap_or_else(|| format!("denied by hook checker `{}`", hook.checker.name));
                        return CheckResult::new(PolicyDecision::Deny, None).with_reason(why);
                    }
                    PolicyDecision::AskUser => {
                        decision = PolicyDecision::AskUser;
                        reason = response.reason.or(reason);
                    }
                    PolicyDecision::Allow => {}
                },
                Err(e) => {
                    log::warn!("hook checker `{}` failed, denying: {e}", hook.checker.name);
                    return CheckResult::new(PolicyDecision::Deny, None).with_reason(e.to_string());
                }
            }
        }

        CheckResult {
            decision: self.downgrade(decision),
            rule: None,
            reason,
        }
    }

    /// The non-interactive downgrade, applied last on every path.
    fn downgrade(&self, decision: PolicyDecision) -> PolicyDecision {
        decision.non_interactive(self.config.non_interactive)
    }

    /// Whether `rule` matches the call under any of its candidate names.
    fn matches_any(
        &self,
        rule: &impl RuleSpec,
        names: &[String],
        stringified_args: Option<&str>,
        server_name: Option<&str>,
        annotations: Option<&ToolAnnotations>,
    ) -> bool {
        names.iter().any(|name| {
            rule_matches(
                rule,
                &MatchInput {
                    tool_name: name,
                    stringified_args,
                    server_name,
                    approval_mode: self.config.approval_mode,
                    annotations,
                },
            )
        })
    }

    fn needs_stringified_args(&self) -> bool {
        self.rules.any_args_pattern() || self.checkers.any_args_pattern()
    }

    /// The command string, when `call` is a shell tool carrying one.
    fn shell_command<'c>(&self, call: &'c ToolCall, names: &[String]) -> Option<&'c str> {
        if !names.iter().any(|n| self.config.shell_tools.contains(n)) {
            return None;
        }
        call.str_arg(&self.config.command_arg)
            .filter(|c| !c.trim().is_empty())
    }
}
