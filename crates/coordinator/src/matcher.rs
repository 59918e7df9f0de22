//! Capability matching.

use std::collections::BTreeSet;

/// Whether an agent holding `agent_caps` may take a task requiring
/// `required_caps`. Empty requirements match every agent.
pub fn eligible(required_caps: &BTreeSet<String>, agent_caps: &BTreeSet<String>) -> bool {
    required_caps.is_subset(agent_caps)
}
