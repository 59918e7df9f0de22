//! Tool visibility policy.
//!
//! Remote sessions never see or invoke local-only tools; local sessions get
//! everything. The same rule backs listing ([`filter_tools`]) and
//! invocation ([`ensure_invocable`]), so a client cannot reach a hidden tool
//! by calling it by name.

use crate::tools::{ToolDescriptor, ToolVisibility};
use hive_common::{ConnectionContext, ConnectionType, HiveError, Result};
use serde::Serialize;

/// Outcome of filtering one listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub total_tools: usize,
    pub visible_tools: usize,
    pub filtered_out: usize,
    pub connection_type: ConnectionType,
}

pub fn is_visible(visibility: ToolVisibility, context: &ConnectionContext) -> bool {
    match context.connection_type {
        ConnectionType::Local => true,
        ConnectionType::Remote => visibility == ToolVisibility::RemoteSafe,
    }
}

/// Keep the tools `context` may see, preserving input order.
pub fn filter_tools<'a, I>(tools: I, context: &ConnectionContext) -> (Vec<&'a ToolDescriptor>, FilterStats)
where
    I: IntoIterator<Item = &'a ToolDescriptor>,
{
    let mut total = 0;
    let visible: Vec<_> = tools
        .into_iter()
        .inspect(|_| total += 1)
        .filter(|tool| is_visible(tool.visibility, context))
        .collect();

    let stats = FilterStats {
        total_tools: total,
        visible_tools: visible.len(),
        filtered_out: total - visible.len(),
        connection_type: context.connection_type,
    };
    (visible, stats)
}

/// Reject invocation of a tool hidden from `context`.
pub fn ensure_invocable(tool: &ToolDescriptor, context: &ConnectionContext) -> Result<()> {
    if is_visible(tool.visibility, context) {
        Ok(())
    } else {
        Err(HiveError::Forbidden {
            tool: tool.name.clone(),
            connection_type: context.connection_type,
        })
    }
}

/// Name patterns that mark a tool local-only regardless of where it came
/// from.
const DEFAULT_LOCAL_ONLY: &[&str] = &[
    "read_file",
    "write_file",
    "edit_file",
    "create_file",
    "delete_file",
    "list_dir",
    "list_directory",
    "file_search",
    "run_in_terminal",
    "run_command",
    "terminal_*",
    "vscode_*",
];

/// Classifies tools by name, for tools without a built-in tag.
#[derive(Debug, Clone)]
pub struct ToolClassifier {
    patterns: Vec<String>,
}

impl ToolClassifier {
    /// Built-in patterns plus `extra`. A trailing `*` matches by prefix.
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns = DEFAULT_LOCAL_ONLY
            .iter()
            .map(|p| p.to_string())
            .chain(extra.into_iter().map(Into::into))
            .collect();
        Self { patterns }
    }

    pub fn classify(&self, name: &str) -> ToolVisibility {
        let local = self.patterns.iter().any(|pattern| match pattern.strip_suffix('*') {
            Some(prefix) => name.starts_with(prefix),
            None => name == pattern,
        });
        if local {
            ToolVisibility::LocalOnly
        } else {
            ToolVisibility::RemoteSafe
        }
    }
}

impl Default for ToolClassifier {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}
