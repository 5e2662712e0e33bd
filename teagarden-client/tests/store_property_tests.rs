//! Property-Based Tests for Store Invariants
//!
//! - Ranks stay dense and ids stay unique after any successful reorder
//! - A failed mutation leaves the collection exactly as it was
//! - A confirmed update equals the patch applied to the previous record
//! - Messages in a thread stay ordered by timestamp

use proptest::prelude::*;
use std::sync::Arc;
use teagarden_client::store::selectors;
use teagarden_client::{GatewayError, Store};
use teagarden_core::*;
use teagarden_test_utils::generators::*;
use teagarden_test_utils::{fixtures, Endpoint, MockGateway};
use tokio::runtime::Runtime;

fn test_runtime() -> Result<Runtime, TestCaseError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

fn loaded(rt: &Runtime, agents: Vec<Agent>) -> Result<(Arc<MockGateway>, Store), TestCaseError> {
    let gateway = Arc::new(MockGateway::new().with_agents(agents));
    let store = fixtures::store(&gateway);
    rt.block_on(store.load_agents())
        .map_err(|e| TestCaseError::fail(format!("load failed: {}", e)))?;
    Ok((gateway, store))
}

fn snapshot(store: &Store) -> Vec<Agent> {
    store.read(|s| s.agents.as_slice().to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_reorder_keeps_ranks_dense((agents, from, to) in arb_agents_with_move(8)) {
        let rt = test_runtime()?;
        let (gateway, store) = loaded(&rt, agents.clone())?;
        let moved = agents[from].id.clone();

        rt.block_on(store.reorder_agents(from, to))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let after = snapshot(&store);
        prop_assert_eq!(after.len(), agents.len());
        for (i, agent) in after.iter().enumerate() {
            prop_assert_eq!(agent.position, i);
        }
        prop_assert_eq!(&after[to].id, &moved);
        let mut ids: Vec<&AgentId> = after.iter().map(|a| &a.id).collect();
        ids.sort();
        ids.dedup();
        prop_assert_eq!(ids.len(), agents.len());
        let expected_calls = usize::from(from != to);
        prop_assert_eq!(gateway.call_count(Endpoint::ReorderAgents), expected_calls);
    }

    #[test]
    fn prop_failed_reorder_restores_order((agents, from, to) in arb_agents_with_move(8)) {
        let rt = test_runtime()?;
        let (gateway, store) = loaded(&rt, agents)?;
        let before = snapshot(&store);
        gateway.fail_next(Endpoint::ReorderAgents, GatewayError::network("down"));

        let _ = rt.block_on(store.reorder_agents(from, to));
        prop_assert_eq!(snapshot(&store), before);
    }

    #[test]
    fn prop_failed_add_restores_state(agents in arb_agents(6), draft in arb_agent_draft()) {
        let rt = test_runtime()?;
        let (gateway, store) = loaded(&rt, agents)?;
        let before = snapshot(&store);
        gateway.fail_next(Endpoint::CreateAgent, GatewayError::network("down"));

        prop_assert!(rt.block_on(store.add_agent(draft)).is_err());
        prop_assert_eq!(snapshot(&store), before);
        prop_assert!(store.read(|s| selectors::pending_operations(s).is_empty()));
    }

    #[test]
    fn prop_update_applies_patch_or_rolls_back(
        (agents, index, _) in arb_agents_with_move(6),
        patch in arb_agent_patch(),
        fail in any::<bool>(),
    ) {
        let rt = test_runtime()?;
        let (gateway, store) = loaded(&rt, agents.clone())?;
        let before = snapshot(&store);
        let target = agents[index].clone();
        if fail {
            gateway.fail_next(Endpoint::UpdateAgent, GatewayError::network("down"));
        }

        let result = rt.block_on(store.update_agent(&target.id, patch.clone()));

        if fail {
            prop_assert!(result.is_err());
            prop_assert_eq!(snapshot(&store), before);
        } else {
            let mut expected = target.clone();
            expected.apply_patch(&patch);
            let updated = result.map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(&updated, &expected);
            prop_assert_eq!(store.read(|s| s.agents.get(&target.id).cloned()), Some(expected));
        }
    }

    #[test]
    fn prop_thread_stays_time_ordered(texts in prop::collection::vec(arb_message_text(), 1..6)) {
        let rt = test_runtime()?;
        let (_, store) = loaded(&rt, fixtures::three_agents())?;
        let id = AgentId::from("1");

        for text in &texts {
            rt.block_on(store.send_message(&id, text))
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
        }

        let thread = store.read(|s| selectors::thread(s, &id).to_vec());
        prop_assert_eq!(thread.len(), texts.len());
        for pair in thread.windows(2) {
            prop_assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }
}
