//! Teagarden Core - Entity Types
//!
//! Pure data structures for the agent console: identifiers, enums, entity
//! records, drafts, patches and the knowledge graph snapshot. No I/O.

pub mod entities;
pub mod enums;
pub mod error;
pub mod graph;
pub mod identity;

pub use entities::*;
pub use enums::*;
pub use error::*;
pub use graph::*;
pub use identity::*;

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn arb_status() -> impl Strategy<Value = AgentStatus> {
        prop_oneof![Just(AgentStatus::Active), Just(AgentStatus::Inactive)]
    }

    fn arb_agent() -> impl Strategy<Value = Agent> {
        (
            "[A-Za-z]{1,12}",
            ".{0,24}",
            prop::collection::vec("[a-z]{1,8}", 0..4),
            arb_status(),
            prop::collection::btree_set("[a-z]{1,6}", 0..3),
        )
            .prop_map(|(name, description, skills, status, tools)| Agent {
                id: AgentId::from("a"),
                name,
                description,
                skills,
                role: AgentRole::Unspecified,
                status,
                permissions: Default::default(),
                tools: tools.into_iter().collect::<BTreeSet<_>>(),
                position: 0,
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Applying `between(a, b)` to `a` always yields `b`.
        #[test]
        fn prop_agent_patch_between_reaches_target(a in arb_agent(), b in arb_agent()) {
            let patch = AgentPatch::between(&a, &b);
            let mut merged = a.clone();
            merged.apply_patch(&patch);
            prop_assert_eq!(merged, b);
        }

        /// The patch between an entity and itself is empty.
        #[test]
        fn prop_agent_patch_of_identity_is_empty(a in arb_agent()) {
            prop_assert!(AgentPatch::between(&a, &a).is_empty());
        }

        /// Search never returns a node whose label does not contain the query.
        #[test]
        fn prop_find_node_result_contains_query(
            labels in prop::collection::vec("[a-zA-Z]{0,8}", 0..10),
            query in "[a-z]{1,3}",
        ) {
            let graph = KnowledgeGraph {
                nodes: labels
                    .iter()
                    .enumerate()
                    .map(|(i, label)| GraphNode {
                        id: NodeId::new(format!("n{}", i)),
                        label: label.clone(),
                        group: None,
                    })
                    .collect(),
                links: vec![],
            };
            if let Some(found) = graph.find_node(&query) {
                prop_assert!(found.display_label().to_lowercase().contains(&query));
            } else {
                prop_assert!(graph
                    .nodes
                    .iter()
                    .all(|n| !n.display_label().to_lowercase().contains(&query)));
            }
        }
    }
}
