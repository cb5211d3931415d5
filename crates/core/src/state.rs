//! Per-node completion state machine.
//!
//! A click moves a node along `NotStarted -> InProgress -> Completed`, after
//! which it toggles between `Completed` and `InProgress`. The server only knows
//! two actions, so the action sent for a click is derived from the state the
//! node is in *before* the click.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Completion state of a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeState {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl NodeState {
    /// State after one click.
    ///
    /// `NotStarted` is never produced.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            NodeState::NotStarted | NodeState::Completed => NodeState::InProgress,
            NodeState::InProgress => NodeState::Completed,
        }
    }

    /// Decode the `(completed, inProgress)` flag pair used on the wire.
    ///
    /// Returns `None` for the illegal pair where both flags are set.
    #[must_use]
    pub fn from_flags(completed: bool, in_progress: bool) -> Option<Self> {
        match (completed, in_progress) {
            (false, false) => Some(NodeState::NotStarted),
            (false, true) => Some(NodeState::InProgress),
            (true, false) => Some(NodeState::Completed),
            (true, true) => None,
        }
    }

    /// Encode as `(completed, inProgress)`.
    #[must_use]
    pub fn flags(self) -> (bool, bool) {
        match self {
            NodeState::NotStarted => (false, false),
            NodeState::InProgress => (false, true),
            NodeState::Completed => (true, false),
        }
    }

    #[must_use]
    pub fn is_completed(self) -> bool {
        matches!(self, NodeState::Completed)
    }

    #[must_use]
    pub fn is_started(self) -> bool {
        !matches!(self, NodeState::NotStarted)
    }
}

/// Action understood by the per-node progress endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeAction {
    Complete,
    Incomplete,
}

impl NodeAction {
    /// Action to send for a click on a node currently in `state`.
    #[must_use]
    pub fn for_state(state: NodeState) -> Self {
        match state {
            NodeState::InProgress => NodeAction::Complete,
            NodeState::Completed | NodeState::NotStarted => NodeAction::Incomplete,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            NodeAction::Complete => "complete",
            NodeAction::Incomplete => "incomplete",
        }
    }
}

impl fmt::Display for NodeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unknown action string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown node action: {0}")]
pub struct ParseActionError(String);

impl FromStr for NodeAction {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "complete" => Ok(NodeAction::Complete),
            "incomplete" => Ok(NodeAction::Incomplete),
            other => Err(ParseActionError(other.to_string())),
        }
    }
}

/// One click on a node: the edge taken and the action that reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: NodeState,
    pub to: NodeState,
    pub action: NodeAction,
}

impl Transition {
    /// Plan the click for a node in `from`.
    #[must_use]
    pub fn plan(from: NodeState) -> Self {
        let transition = Self {
            from,
            to: from.next(),
            action: NodeAction::for_state(from),
        };
        debug_assert!(transition.is_consistent());
        transition
    }

    /// `complete` must be sent exactly when the node ends up completed.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        (self.action == NodeAction::Complete) == self.to.is_completed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [NodeState; 3] = [
        NodeState::NotStarted,
        NodeState::InProgress,
        NodeState::Completed,
    ];

    #[test]
    fn clicks_never_return_to_not_started() {
        let mut state = NodeState::default();
        let mut seen = Vec::new();
        for _ in 0..6 {
            state = state.next();
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                NodeState::InProgress,
                NodeState::Completed,
                NodeState::InProgress,
                NodeState::Completed,
                NodeState::InProgress,
                NodeState::Completed,
            ]
        );
    }

    #[test]
    fn action_follows_current_state() {
        assert_eq!(NodeAction::for_state(NodeState::NotStarted), NodeAction::Incomplete);
        assert_eq!(NodeAction::for_state(NodeState::InProgress), NodeAction::Complete);
        assert_eq!(NodeAction::for_state(NodeState::Completed), NodeAction::Incomplete);
    }

    #[test]
    fn every_edge_is_consistent() {
        for from in ALL {
            let t = Transition::plan(from);
            assert!(t.is_consistent(), "inconsistent edge from {from:?}");
            assert_eq!(t.to, from.next());
        }
    }

    #[test]
    fn flags_round_trip_and_reject_illegal_pair() {
        for state in ALL {
            let (completed, in_progress) = state.flags();
            assert_eq!(NodeState::from_flags(completed, in_progress), Some(state));
        }
        assert_eq!(NodeState::from_flags(true, true), None);
    }

    #[test]
    fn action_parses_from_wire() {
        assert_eq!("complete".parse::<NodeAction>().unwrap(), NodeAction::Complete);
        assert!("done".parse::<NodeAction>().is_err());
        assert_eq!(NodeAction::Incomplete.to_string(), "incomplete");
    }
}
