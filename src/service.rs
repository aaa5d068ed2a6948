//! A policy engine owned by a background task.
//!
//! Requests are handled one at a time in arrival order, so a rule change
//! submitted while a check is pending takes effect only after that check has
//! produced its verdict.

use std::collections::{BTreeMap, BTreeSet};

use tokio::sync::{mpsc, oneshot};

use crate::error::{PolicyError, Result};
use crate::eval::{CheckResult, PolicyEngine, ToolCall};
use crate::rules::{ApprovalMode, PolicyRule, PolicyTier, ToolAnnotations};

const QUEUE_DEPTH: usize = 64;

type EngineFn = Box<dyn FnOnce(&mut PolicyEngine) + Send>;

enum Command {
    Check {
        call: ToolCall,
        server_name: Option<String>,
        annotations: Option<ToolAnnotations>,
        reply: oneshot::Sender<CheckResult>,
    },
    CheckHook {
        event_name: String,
        call: ToolCall,
        server_name: Option<String>,
        annotations: Option<ToolAnnotations>,
        reply: oneshot::Sender<CheckResult>,
    },
    ExcludedTools {
        tool_metadata: Option<BTreeMap<String, ToolAnnotations>>,
        all_tool_names: Option<BTreeSet<String>>,
        reply: oneshot::Sender<BTreeSet<String>>,
    },
    Update(EngineFn),
    Shutdown,
}

/// Cheap, cloneable handle to a spawned engine.
#[derive(Clone)]
pub struct PolicyHandle {
    commands: mpsc::Sender<Command>,
}

/// Move `engine` onto a new task on the current tokio runtime.
pub fn spawn(engine: PolicyEngine) -> PolicyHandle {
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    tokio::spawn(run(engine, rx));
    PolicyHandle { commands: tx }
}

async fn run(mut engine: PolicyEngine, mut commands: mpsc::Receiver<Command>) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Check {
                call,
                server_name,
                annotations,
                reply,
            } => {
                let result = engine
                    .check(&call, server_name.as_deref(), annotations.as_ref())
                    .await;
                let _ = reply.send(result);
            }
            Command::CheckHook {
                event_name,
                call,
                server_name,
                annotations,
                reply,
            } => {
                let result = engine
                    .check_hook(&event_name, &call, server_name.as_deref(), annotations.as_ref())
                    .await;
                let _ = reply.send(result);
            }
            Command::ExcludedTools {
                tool_metadata,
                all_tool_names,
                reply,
            } => {
                let _ = reply.send(engine.excluded_tools(tool_metadata.as_ref(), all_tool_names.as_ref()));
            }
            Command::Update(f) => f(&mut engine),
            Command::Shutdown => {
                log::debug!("policy service shutting down");
                break;
            }
        }
    }
}

impl PolicyHandle {
    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| PolicyError::ServiceClosed)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await.map_err(|_| PolicyError::ServiceClosed)
    }

    pub async fn check(
        &self,
        call: ToolCall,
        server_name: Option<String>,
        annotations: Option<ToolAnnotations>,
    ) -> Result<CheckResult> {
        self.request(|reply| Command::Check {
            call,
            server_name,
            annotations,
            reply,
        })
        .await
    }

    pub async fn check_hook(
        &self,
        event_name: impl Into<String>,
        call: ToolCall,
        server_name: Option<String>,
        annotations: Option<ToolAnnotations>,
    ) -> Result<CheckResult> {
        let event_name = event_name.into();
        self.request(|reply| Command::CheckHook {
            event_name,
            call,
            server_name,
            annotations,
            reply,
        })
        .await
    }

    pub async fn excluded_tools(
        &self,
        tool_metadata: Option<BTreeMap<String, ToolAnnotations>>,
        all_tool_names: Option<BTreeSet<String>>,
    ) -> Result<BTreeSet<String>> {
        self.request(|reply| Command::ExcludedTools {
            tool_metadata,
            all_tool_names,
            reply,
        })
        .await
    }

    /// Run `f` against the engine between requests and return its result.
    pub async fn with_engine<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut PolicyEngine) -> R + Send + 'static,
    {
        self.request(|reply| {
            Command::Update(Box::new(move |engine: &mut PolicyEngine| {
                let _ = reply.send(f(engine));
            }))
        })
        .await
    }

    pub async fn add_rule(&self, rule: PolicyRule) -> Result<()> {
        self.with_engine(move |e| e.add_rule(rule)).await
    }

    pub async fn remove_rules_by_tier(&self, tier: PolicyTier) -> Result<usize> {
        self.with_engine(move |e| e.remove_rules_by_tier(tier)).await
    }

    pub async fn remove_rules_by_source(&self, source: impl Into<String>) -> Result<usize> {
        let source = source.into();
        self.with_engine(move |e| e.remove_rules_by_source(&source)).await
    }

    pub async fn set_approval_mode(&self, mode: ApprovalMode) -> Result<()> {
        self.with_engine(move |e| e.set_approval_mode(mode)).await
    }

    pub async fn rules(&self) -> Result<Vec<PolicyRule>> {
        self.with_engine(|e| e.rules().to_vec()).await
    }

    /// Stop the task once queued requests ahead of this one are served.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }
}
