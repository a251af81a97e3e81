//! Property-based tests for the transcript store.
//!
//! These check that ordering and uniqueness hold for arbitrary interleavings
//! of server deliveries, optimistic submissions, and removals.

use super::*;
use proptest::prelude::*;
use std::collections::HashSet;
use time::Duration;

// ============================================================================
// Generators
// ============================================================================

#[derive(Clone, Debug)]
enum Op {
    Ingest { id: u8, role: Role, secs: i64 },
    Optimistic { secs: i64 },
    Remove { id: u8 },
}

fn at(secs: i64) -> OffsetDateTime {
    OffsetDateTime::UNIX_EPOCH + Duration::seconds(1_700_000_000 + secs)
}

fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::System), Just(Role::User), Just(Role::Assistant), Just(Role::Tool)]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (0u8..24, arb_role(), 0i64..40).prop_map(|(id, role, secs)| Op::Ingest { id, role, secs }),
        2 => (0i64..40).prop_map(|secs| Op::Optimistic { secs }),
        1 => (0u8..24).prop_map(|id| Op::Remove { id }),
    ]
}

fn server_message(id: u8, role: Role, secs: i64) -> Message {
    Message::new(format!("srv-{id:02}"), role, at(secs)).with_content(format!("m{id}"))
}

fn apply(store: &mut TranscriptStore, op: &Op) {
    match op {
        Op::Ingest { id, role, secs } => {
            store.ingest(server_message(*id, *role, *secs));
        }
        Op::Optimistic { secs } => {
            store.append_optimistic(optimistic_user_message("typed", None, at(*secs)));
        }
        Op::Remove { id } => {
            store.remove_by_id(&format!("srv-{id:02}"));
        }
    }
}

fn assert_invariants(store: &TranscriptStore) -> Result<(), TestCaseError> {
    let mut seen = HashSet::new();
    for message in store.entries() {
        prop_assert!(seen.insert(message.id.clone()), "duplicate id {}", message.id);
    }
    for pair in store.messages().windows(2) {
        let a = (pair[0].created_at, pair[0].id.as_str());
        let b = (pair[1].created_at, pair[1].id.as_str());
        prop_assert!(a <= b, "out of order: {:?} before {:?}", a, b);
    }
    Ok(())
}

fn snapshot(store: &TranscriptStore) -> Vec<Message> {
    store.entries().cloned().collect()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn store_stays_sorted_and_unique(ops in prop::collection::vec(arb_op(), 0..80)) {
        let mut store = TranscriptStore::new();
        for op in &ops {
            apply(&mut store, op);
            assert_invariants(&store)?;
        }
    }

    #[test]
    fn seed_output_is_sorted_and_unique(
        raw in prop::collection::vec((0u8..16, arb_role(), 0i64..20), 0..40)
    ) {
        let mut store = TranscriptStore::new();
        store.seed(raw.iter().map(|(id, role, secs)| server_message(*id, *role, *secs)).collect());
        assert_invariants(&store)?;
    }

    #[test]
    fn ingest_is_idempotent(
        ops in prop::collection::vec(arb_op(), 0..40),
        id in 0u8..24,
        role in arb_role(),
        secs in 0i64..40,
    ) {
        let mut once = TranscriptStore::new();
        for op in &ops {
            apply(&mut once, op);
        }
        let mut twice = once.clone();

        once.ingest(server_message(id, role, secs));
        twice.ingest(server_message(id, role, secs));
        twice.ingest(server_message(id, role, secs));

        prop_assert_eq!(snapshot(&once), snapshot(&twice));
    }

    #[test]
    fn duplicate_deliveries_leave_one_copy(
        id in 0u8..24,
        role in arb_role(),
        secs in 0i64..40,
        repeats in 1usize..6,
    ) {
        let mut store = TranscriptStore::new();
        for _ in 0..repeats {
            store.ingest(server_message(id, role, secs));
        }
        let wanted = format!("srv-{id:02}");
        prop_assert_eq!(store.entries().filter(|m| m.id == wanted).count(), 1);
    }
}
