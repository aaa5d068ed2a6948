//! Shell decomposition: splitting command strings into sub-commands and
//! spotting output redirection.
//!
//! The engine only talks to the [`ShellDecomposer`] trait. [`TreeSitterDecomposer`]
//! is the stock implementation, backed by tree-sitter-bash.

pub mod redirect;
pub mod shell;

pub use redirect::{Redirection, output_redirection};
pub use shell::TreeSitterDecomposer;

use async_trait::async_trait;

use crate::error::Result;

/// Splits shell command strings for per-part evaluation.
///
/// An empty split means "could not parse", never "nothing to run".
#[async_trait]
pub trait ShellDecomposer: Send + Sync {
    /// One-time grammar setup. Safe to call repeatedly.
    async fn initialize(&self) -> Result<()>;

    /// Constituent sub-commands of `command`, in source order.
    fn split_commands(&self, command: &str) -> Vec<String>;

    /// Output redirection in `command`, if any.
    fn redirection(&self, command: &str) -> Option<Redirection> {
        output_redirection(command)
    }

    fn has_redirection(&self, command: &str) -> bool {
        self.redirection(command).is_some()
    }
}
