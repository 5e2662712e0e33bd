//! Knowledge graph snapshot and node creation.

use super::state::DomainState;
use super::{OpKey, OperationKind, PreImage, Store};
use crate::error::StoreResult;
use crate::gateway::Created;
use std::future::Future;
use teagarden_core::{EntityIdType, GraphNode, GraphNodeDraft, KnowledgeGraph, NodeId};

impl Store {
    /// Replace the graph with the server's. Nodes still being added stay.
    pub fn load_graph(&self) -> impl Future<Output = StoreResult<()>> + Send + '_ {
        let mut ticket = self.queue.ticket(OpKey::Graph);
        async move {
            ticket.ready().await;
            self.run_load(
                OperationKind::LoadGraph,
                OpKey::Graph,
                || self.gateway.fetch_graph(),
                KnowledgeGraph::validate,
                |state: &mut DomainState, mut graph: KnowledgeGraph| {
                    let in_flight: Vec<GraphNode> = state
                        .graph
                        .nodes
                        .iter()
                        .filter(|n| {
                            !graph.contains(&n.id)
                                && state
                                    .ledger
                                    .any_pending(|op| op.pre_image.inserted_node(&n.id))
                        })
                        .cloned()
                        .collect();
                    graph.nodes.extend(in_flight);
                    state.graph = graph;
                },
            )
            .await
        }
    }

    /// Add an unconnected node with the given label.
    pub fn add_graph_node(
        &self,
        label: &str,
    ) -> impl Future<Output = StoreResult<GraphNode>> + Send + '_ {
        let draft = GraphNodeDraft::new(label);
        let mut ticket = self.queue.ticket(OpKey::Graph);
        async move {
            ticket.ready().await;
            draft.validate()?;
            let provisional = NodeId::provisional();
            let op = self.mutate(|state| {
                state.graph.nodes.push(draft.to_node(provisional.clone()));
                state.ledger.begin(
                    OperationKind::AddGraphNode,
                    OpKey::Graph,
                    PreImage::GraphNode(provisional.clone()),
                )
            });

            match self.gateway.add_graph_node(&draft).await {
                Ok(created) => Ok(self.commit(op, |state| {
                    let node = match created {
                        Created::Entity(node) if node.label.trim().is_empty() => GraphNode {
                            label: draft.label.clone(),
                            ..node
                        },
                        Created::Entity(node) => node,
                        Created::Acknowledged(id) => draft.to_node(id),
                    };
                    let nodes = &mut state.graph.nodes;
                    nodes.retain(|n| n.id != provisional);
                    if !nodes.iter().any(|n| n.id == node.id) {
                        nodes.push(node.clone());
                    }
                    node
                })),
                Err(err) => Err(self.rollback(op, err)),
            }
        }
    }
}
