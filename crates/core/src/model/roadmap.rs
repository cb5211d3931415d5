use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::model::ids::{NodeId, RoadmapId};
use crate::state::NodeState;

//
// ─── NODE ──────────────────────────────────────────────────────────────────────
//

/// Smallest trackable unit of a roadmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "NodeWire", into = "NodeWire")]
pub struct Node {
    id: NodeId,
    title: String,
    description: Option<String>,
    state: NodeState,
}

impl Node {
    #[must_use]
    pub fn new(id: NodeId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: None,
            state: NodeState::NotStarted,
        }
    }

    #[must_use]
    pub fn with_state(mut self, state: NodeState) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn set_state(&mut self, state: NodeState) {
        self.state = state;
    }
}

/// Wire shape of a node: two flags instead of a state, id optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    in_progress: bool,
}

impl TryFrom<NodeWire> for Node {
    type Error = ModelError;

    fn try_from(wire: NodeWire) -> Result<Self, Self::Error> {
        let state = NodeState::from_flags(wire.completed, wire.in_progress)
            .ok_or_else(|| ModelError::IllegalNodeFlags(wire.title.clone()))?;
        // Legacy documents address nodes by title.
        let id = NodeId::new(wire.id.unwrap_or_else(|| wire.title.clone()))?;
        Ok(Self {
            id,
            title: wire.title,
            description: wire.description,
            state,
        })
    }
}

impl From<Node> for NodeWire {
    fn from(node: Node) -> Self {
        let (completed, in_progress) = node.state.flags();
        Self {
            id: Some(node.id.into()),
            title: node.title,
            description: node.description,
            completed,
            in_progress,
        }
    }
}

//
// ─── SECTION ───────────────────────────────────────────────────────────────────
//

/// Ordered group of nodes. The `completed` / `inProgress` flags are derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SectionWire", into = "SectionWire")]
pub struct Section {
    title: String,
    description: Option<String>,
    nodes: Vec<Node>,
}

impl Section {
    #[must_use]
    pub fn new(title: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            title: title.into(),
            description: None,
            nodes,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub(crate) fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id() == id)
    }

    /// Every node completed. An empty section is never completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        !self.nodes.is_empty() && self.nodes.iter().all(|n| n.state().is_completed())
    }

    /// Some work started but the section is not completed.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        !self.is_completed() && self.nodes.iter().any(|n| n.state().is_started())
    }

    pub(crate) fn reset(&mut self) {
        for node in &mut self.nodes {
            node.set_state(NodeState::NotStarted);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SectionWire {
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default)]
    nodes: Vec<Node>,
    // Derived; whatever arrives here is ignored.
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    in_progress: bool,
}

impl TryFrom<SectionWire> for Section {
    type Error = ModelError;

    // Ids must be unique within a section, or a toggle could only reach the first.
    fn try_from(wire: SectionWire) -> Result<Self, Self::Error> {
        for (i, node) in wire.nodes.iter().enumerate() {
            if wire.nodes[..i].iter().any(|n| n.id() == node.id()) {
                return Err(ModelError::DuplicateNode {
                    section: wire.title,
                    node: node.id().clone(),
                });
            }
        }
        Ok(Self {
            title: wire.title,
            description: wire.description,
            nodes: wire.nodes,
        })
    }
}

impl From<Section> for SectionWire {
    fn from(section: Section) -> Self {
        let completed = section.is_completed();
        let in_progress = section.is_in_progress();
        Self {
            title: section.title,
            description: section.description,
            nodes: section.nodes,
            completed,
            in_progress,
        }
    }
}

//
// ─── ROADMAP ───────────────────────────────────────────────────────────────────
//

/// Roadmap definition as served by content management. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roadmap {
    pub id: RoadmapId,
    pub title: String,
    #[serde(default)]
    pub sections: Vec<Section>,
}
