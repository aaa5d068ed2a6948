use async_trait::async_trait;
use parking_lot::Mutex;
use tree_sitter::{Node, Parser};

use super::ShellDecomposer;
use crate::error::{PolicyError, Result};

/// Node kinds that are a single runnable command.
const COMMAND_KINDS: &[&str] = &[
    "command",
    "declaration_command",
    "test_command",
    "unset_command",
];

/// Shell decomposer backed by tree-sitter-bash.
///
/// The grammar is loaded lazily, on [`initialize`](ShellDecomposer::initialize)
/// or the first split, whichever comes first.
#[derive(Default)]
pub struct TreeSitterDecomposer {
    parser: Mutex<Option<Parser>>,
}

impl TreeSitterDecomposer {
    pub fn new() -> Self {
        Self::default()
    }

    fn load_parser() -> Result<Parser> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_bash::LANGUAGE.into())
            .map_err(|e| PolicyError::ShellParser(e.to_string()))?;
        Ok(parser)
    }
}

#[async_trait]
impl ShellDecomposer for TreeSitterDecomposer {
    async fn initialize(&self) -> Result<()> {
        let mut slot = self.parser.lock();
        if slot.is_none() {
            *slot = Some(Self::load_parser()?);
        }
        Ok(())
    }

    fn split_commands(&self, command: &str) -> Vec<String> {
        let mut slot = self.parser.lock();
        if slot.is_none() {
            match Self::load_parser() {
                Ok(parser) => *slot = Some(parser),
                Err(e) => {
                    log::warn!("{e}");
                    return Vec::new();
                }
            }
        }
        let Some(parser) = slot.as_mut() else {
            return Vec::new();
        };

        let Some(tree) = parser.parse(command, None) else {
            return Vec::new();
        };
        let root = tree.root_node();
        if root.has_error() {
            log::debug!("unparseable shell command: {command}");
            return Vec::new();
        }

        let mut out = Vec::new();
        collect_commands(root, command.as_bytes(), &mut out);
        out
    }
}

/// Walk the tree and emit the text of every runnable command, including
/// those nested in subshells, substitutions, and control-flow bodies.
///
/// A plain command wrapped in a redirect is emitted together with its
/// redirect so the redirection stays visible to per-part evaluation.
///
/// Pre-order over an explicit stack: nesting depth is bounded by the input,
/// not by the thread stack.
fn collect_commands(root: Node<'_>, source: &[u8], out: &mut Vec<String>) {
    // Each entry carries whether its parent is a `redirected_statement`.
    let mut stack = vec![(root, false)];
    let mut cursor = root.walk();
    while let Some((node, in_redirect)) = stack.pop() {
        let kind = node.kind();
        let is_redirect = kind == "redirected_statement";
        let emitted = if is_redirect {
            node.child_by_field_name("body")
                .is_some_and(|body| COMMAND_KINDS.contains(&body.kind()))
        } else {
            COMMAND_KINDS.contains(&kind) && !in_redirect
        };

        if emitted
            && let Ok(text) = node.utf8_text(source)
        {
            let text = text.trim();
            if !text.is_empty() {
                out.push(text.to_string());
            }
        }

        let first_child = stack.len();
        stack.extend(node.children(&mut cursor).map(|child| (child, is_redirect)));
        stack[first_child..].reverse();
    }
}
