//! Knowledge graph snapshot and node search

use crate::{
    error::{require_non_empty, ValidationError, ValidationResult},
    EntityIdType, EntityKind, HasEntityId, NodeId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A node in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: NodeId,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl GraphNode {
    /// Label shown to the user; the id when the label is blank.
    pub fn display_label(&self) -> &str {
        if self.label.trim().is_empty() {
            self.id.as_str()
        } else {
            &self.label
        }
    }
}

impl HasEntityId for GraphNode {
    type Id = NodeId;

    const KIND: EntityKind = EntityKind::GraphNode;

    fn entity_id(&self) -> &NodeId {
        &self.id
    }

    fn set_entity_id(&mut self, id: NodeId) {
        self.id = id;
    }
}

/// A directed, labelled edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub label: String,
}

/// Fields for adding a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNodeDraft {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl GraphNodeDraft {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into().trim().to_string(),
            group: None,
        }
    }

    pub fn validate(&self) -> ValidationResult<()> {
        require_non_empty("label", &self.label)
    }

    pub fn to_node(&self, id: NodeId) -> GraphNode {
        GraphNode {
            id,
            label: self.label.clone(),
            group: self.group.clone(),
        }
    }
}

/// Snapshot of the graph as served by `GET /knowledge-graph`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub links: Vec<GraphEdge>,
}

impl KnowledgeGraph {
    /// Check node ids are unique and every edge endpoint exists.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut ids = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            require_non_empty("id", node.id.as_str())?;
            if !ids.insert(&node.id) {
                return Err(ValidationError::Duplicate {
                    field: "id",
                    value: node.id.to_string(),
                });
            }
        }
        for edge in &self.links {
            for (field, end) in [("source", &edge.source), ("target", &edge.target)] {
                if !ids.contains(end) {
                    return Err(ValidationError::UnknownReference {
                        kind: EntityKind::GraphNode,
                        field,
                        id: end.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn node(&self, id: &NodeId) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.node(id).is_some()
    }

    /// First node whose display label contains `query`, ignoring case.
    /// A blank query matches nothing.
    pub fn find_node(&self, query: &str) -> Option<&GraphNode> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.nodes
            .iter()
            .find(|n| n.display_label().to_lowercase().contains(&needle))
    }

    /// Edges touching the given node.
    pub fn edges_of<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.links
            .iter()
            .filter(move |e| &e.source == id || &e.target == id)
    }
}
