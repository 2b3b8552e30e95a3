//! Property-based tests for the cancellation registry and key derivation
//!
//! Uses proptest to verify:
//! - Registry handle and group maps stay consistent under any operation order
//! - At most one live handle exists per request key
//! - Cancelling one group never fires another group's handles
//! - Path normalization is idempotent and ignores query strings

use http::Method;
use proptest::prelude::*;
use redel::cancel::{
    CancelEntry, CancelHandle, CancelKind, CancellationRegistry, GroupKey, RequestKey,
    RequestTicket, normalize_path,
};
use redel::client::RequestDescriptor;
use std::collections::HashMap;

// =============================================================================
// REGISTRY PROPERTY TESTS
// =============================================================================

const PATHS: [&str; 4] = ["/a", "/b", "/c/d", "/basic"];
const GROUPS: [&str; 3] = ["g1", "g2", "g3"];

#[derive(Debug, Clone)]
enum Op {
    Admit { path: usize, group: Option<usize> },
    Release { path: usize, stale: bool },
    Cancel { path: usize },
    CancelGroup { group: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..PATHS.len(), proptest::option::of(0..GROUPS.len()))
            .prop_map(|(path, group)| Op::Admit { path, group }),
        2 => (0..PATHS.len(), any::<bool>()).prop_map(|(path, stale)| Op::Release { path, stale }),
        1 => (0..PATHS.len()).prop_map(|path| Op::Cancel { path }),
        1 => (0..GROUPS.len()).prop_map(|group| Op::CancelGroup { group }),
    ]
}

fn key(path: usize) -> RequestKey {
    RequestKey::new(Method::GET, PATHS[path])
}

struct Live {
    ticket: RequestTicket,
    group: Option<usize>,
    handle: CancelHandle,
}

proptest! {
    #[test]
    fn prop_registry_matches_model(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut registry = CancellationRegistry::new();
        let mut model: HashMap<usize, Live> = HashMap::new();

        for op in ops {
            match op {
                Op::Admit { path, group } => {
                    let handle = CancelHandle::new();
                    let ticket = RequestTicket::new();
                    let entry = CancelEntry::new(
                        handle.clone(),
                        group.map(|g| GroupKey::new(GROUPS[g])),
                        RequestDescriptor::get(PATHS[path]),
                        ticket,
                    );
                    if let Some(displaced) = registry.register(key(path), entry) {
                        prop_assert!(displaced.cancel(CancelKind::Superseded, key(path)));
                    }
                    if let Some(previous) = model.insert(path, Live { ticket, group, handle }) {
                        prop_assert!(previous.handle.is_cancelled());
                    }
                }
                Op::Release { path, stale } => {
                    let ticket = match model.get(&path) {
                        Some(live) if !stale => live.ticket,
                        _ => RequestTicket::new(),
                    };
                    let released = registry.release(&key(path), ticket).is_some();
                    prop_assert_eq!(released, !stale && model.contains_key(&path));
                    if released {
                        model.remove(&path);
                    }
                }
                Op::Cancel { path } => {
                    let cancelled = registry.cancel(&key(path), CancelKind::Explicit);
                    prop_assert_eq!(cancelled, model.contains_key(&path));
                    if let Some(live) = model.remove(&path) {
                        prop_assert!(live.handle.is_cancelled());
                    }
                }
                Op::CancelGroup { group } => {
                    let members: Vec<usize> = model
                        .iter()
                        .filter(|(_, live)| live.group == Some(group))
                        .map(|(path, _)| *path)
                        .collect();
                    let cancelled = registry.cancel_group(&GroupKey::new(GROUPS[group]));
                    prop_assert_eq!(cancelled, members.len());

                    for path in members {
                        let live = model.remove(&path).unwrap();
                        prop_assert!(live.handle.is_cancelled());
                    }
                    // Group isolation
                    prop_assert!(model.values().all(|live| !live.handle.is_cancelled()));
                    prop_assert!(!registry.has_group(&GroupKey::new(GROUPS[group])));
                }
            }

            prop_assert!(registry.is_consistent());
            prop_assert_eq!(registry.len(), model.len());
            for (path, live) in &model {
                let entry = registry.lookup(&key(*path));
                prop_assert!(entry.is_some_and(|e| e.ticket == live.ticket));
            }
            for (index, name) in GROUPS.iter().enumerate() {
                let expected = model.values().filter(|live| live.group == Some(index)).count();
                prop_assert_eq!(registry.group_members(&GroupKey::new(*name)).len(), expected);
            }
        }
    }
}

// =============================================================================
// KEY DERIVATION PROPERTY TESTS
// =============================================================================

fn path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z0-9-]{0,6}", 0..5).prop_map(|segments| {
        segments
            .iter()
            .map(|s| format!("/{s}"))
            .collect::<String>()
    })
}

proptest! {
    #[test]
    fn prop_normalize_path_is_idempotent(path in path_strategy()) {
        let once = normalize_path(&path);
        prop_assert_eq!(normalize_path(&once), once.clone());
        prop_assert!(once.starts_with('/'));
        prop_assert!(!once.contains("//"));
    }

    #[test]
    fn prop_query_does_not_change_request_key(
        path in path_strategy(),
        query in "[a-z]{1,5}=[a-z0-9]{0,5}",
    ) {
        let plain = RequestKey::new(Method::GET, &path);
        let with_query = RequestKey::new(Method::GET, &format!("{path}?{query}"));
        prop_assert_eq!(plain, with_query);
    }

    #[test]
    fn prop_methods_partition_keys(path in path_strategy()) {
        prop_assert_ne!(
            RequestKey::new(Method::GET, &path),
            RequestKey::new(Method::DELETE, &path)
        );
    }
}
