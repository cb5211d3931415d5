use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::model::ids::{NodeId, ProgressId, RoadmapId, UserId};
use crate::model::roadmap::{Roadmap, Section};
use crate::state::{NodeState, Transition};

/// A learner's copy of a roadmap's section/node tree, annotated with node state.
///
/// Serialized as a bare array of sections, which is what the progress endpoint
/// stores under `progress`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressTree {
    sections: Vec<Section>,
}

impl ProgressTree {
    #[must_use]
    pub fn new(sections: Vec<Section>) -> Self {
        Self { sections }
    }

    /// Fresh tree for a roadmap the learner has not touched yet.
    #[must_use]
    pub fn from_roadmap(roadmap: &Roadmap) -> Self {
        let mut sections = roadmap.sections.clone();
        for section in &mut sections {
            section.reset();
        }
        Self { sections }
    }

    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Look up a section by position.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::SectionOutOfRange` for a bad index.
    pub fn section(&self, index: usize) -> Result<&Section, ModelError> {
        self.sections.get(index).ok_or(ModelError::SectionOutOfRange {
            index,
            len: self.sections.len(),
        })
    }

    /// Current state of a node.
    ///
    /// # Errors
    ///
    /// Returns `ModelError` if the section or node does not exist.
    pub fn node_state(&self, section: usize, node: &NodeId) -> Result<NodeState, ModelError> {
        self.section(section)?
            .node(node)
            .map(|n| n.state())
            .ok_or_else(|| ModelError::UnknownNode {
                section,
                node: node.clone(),
            })
    }

    /// Plan one click on a node without changing the tree.
    ///
    /// # Errors
    ///
    /// Returns `ModelError` if the section or node does not exist.
    pub fn plan_toggle(&self, section: usize, node: &NodeId) -> Result<Transition, ModelError> {
        self.node_state(section, node).map(Transition::plan)
    }

    /// Set one node's state in place; all other nodes are untouched.
    ///
    /// # Errors
    ///
    /// Returns `ModelError` if the section or node does not exist.
    pub fn set_node_state(
        &mut self,
        section: usize,
        node: &NodeId,
        state: NodeState,
    ) -> Result<(), ModelError> {
        let len = self.sections.len();
        let target = self
            .sections
            .get_mut(section)
            .ok_or(ModelError::SectionOutOfRange { index: section, len })?
            .node_mut(node)
            .ok_or_else(|| ModelError::UnknownNode {
                section,
                node: node.clone(),
            })?;
        target.set_state(state);
        Ok(())
    }

    /// Copy of the tree with one node moved to `state`.
    ///
    /// # Errors
    ///
    /// Returns `ModelError` if the section or node does not exist.
    pub fn with_node_state(
        &self,
        section: usize,
        node: &NodeId,
        state: NodeState,
    ) -> Result<Self, ModelError> {
        let mut next = self.clone();
        next.set_node_state(section, node, state)?;
        Ok(next)
    }
}

/// Persisted progress of one user on one roadmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub id: ProgressId,
    pub user_id: UserId,
    pub roadmap_id: RoadmapId,
    pub progress: ProgressTree,
    pub started_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;
    use crate::time::fixed_now;
    use serde_json::json;

    fn node(id: &str) -> Node {
        Node::new(NodeId::new(id).unwrap(), id.to_uppercase())
    }

    fn roadmap() -> Roadmap {
        Roadmap {
            id: RoadmapId::new(5),
            title: "Backend".into(),
            sections: vec![
                Section::new("Internet", vec![node("dns"), node("http")]),
                Section::new("Databases", vec![node("sql")]),
            ],
        }
    }

    #[test]
    fn from_roadmap_starts_every_node_fresh() {
        let mut definition = roadmap();
        definition.sections[0] = Section::new(
            "Internet",
            vec![node("dns").with_state(NodeState::Completed), node("http")],
        );
        let tree = ProgressTree::from_roadmap(&definition);
        for section in tree.sections() {
            for n in section.nodes() {
                assert_eq!(n.state(), NodeState::NotStarted);
            }
        }
    }

    #[test]
    fn with_node_state_changes_only_the_target() {
        let tree = ProgressTree::from_roadmap(&roadmap());
        let dns = NodeId::new("dns").unwrap();
        let next = tree.with_node_state(0, &dns, NodeState::InProgress).unwrap();

        assert_eq!(next.node_state(0, &dns).unwrap(), NodeState::InProgress);
        assert_eq!(tree.node_state(0, &dns).unwrap(), NodeState::NotStarted);
        let http = NodeId::new("http").unwrap();
        assert_eq!(next.node_state(0, &http).unwrap(), NodeState::NotStarted);
        assert_eq!(next.sections()[1], tree.sections()[1]);
    }

    #[test]
    fn node_is_looked_up_inside_the_given_section_only() {
        let tree = ProgressTree::from_roadmap(&roadmap());
        let sql = NodeId::new("sql").unwrap();
        let err = tree.plan_toggle(0, &sql).unwrap_err();
        assert_eq!(err, ModelError::UnknownNode { section: 0, node: sql });
        let err = tree.plan_toggle(7, &NodeId::new("dns").unwrap()).unwrap_err();
        assert_eq!(err, ModelError::SectionOutOfRange { index: 7, len: 2 });
    }

    #[test]
    fn record_uses_camel_case_and_bare_tree() {
        let record = ProgressRecord {
            id: ProgressId::new(1),
            user_id: UserId::new(9),
            roadmap_id: RoadmapId::new(5),
            progress: ProgressTree::from_roadmap(&roadmap()),
            started_at: fixed_now(),
            last_accessed_at: fixed_now(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["userId"], json!(9));
        assert_eq!(value["roadmapId"], json!(5));
        assert!(value["progress"].is_array());
        assert_eq!(value["progress"][0]["nodes"][0]["id"], json!("dns"));

        let back: ProgressRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}
