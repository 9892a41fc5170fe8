//! Trace gating by command name
//!
//! The filter is evaluated independently at command start and at
//! completion, never cached per command. A tracer reconfigured mid-flight
//! can therefore observe different decisions for the two halves of one
//! command: the started span is either left for the pruner or the
//! completion finds nothing to close. Documented behavior, not a bug.

use crate::config::TraceOptions;
use std::collections::HashSet;

/// Decides whether a command should be traced at all
#[derive(Debug, Clone)]
pub struct PolicyFilter {
    enabled: bool,
    /// Filtered command names, lowercased at construction
    filtered: HashSet<String>,
}

impl PolicyFilter {
    /// Build a filter from options, normalizing the set once
    pub fn new(options: &TraceOptions) -> Self {
        Self {
            enabled: options.enabled,
            filtered: options
                .filtered_commands
                .iter()
                .map(|name| name.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Whether `command_name` should be traced
    pub fn should_trace(&self, command_name: &str) -> bool {
        self.enabled && !self.filtered.contains(&command_name.to_ascii_lowercase())
    }
}
