//! Permission service integration tests
//!
//! Every mutation must leave no stale cached result behind, and every
//! accepted mutation must reach the store exactly once.

use permweave::PermissionService;
use permweave::config::CacheConfig;
use permweave::error::{GraphError, StoreError, StoreResult};
use permweave::graph::{Group, GraphStore, MemoryStore, PermissionGraph, User};
use std::sync::Arc;
use std::thread;

// =============================================================================
// Test Helpers
// =============================================================================

fn base_graph() -> PermissionGraph {
    PermissionGraph::default()
        .with_group("default", Group::default().permissions(["chat.send"]))
        .with_group(
            "vip",
            Group::with_priority(50)
                .permissions(["vip.kit"])
                .parents(["default"]),
        )
        .with_group("mod", Group::with_priority(75).permissions(["mod.*"]))
        .with_user("u1", User::in_groups(["vip"]).named("Steve"))
        .with_user("u2", User::in_groups(["default"]).named("Alex"))
}

fn service_with_store() -> (PermissionService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with_graph(base_graph()));
    let service = PermissionService::load(store.clone(), &CacheConfig::default()).unwrap();
    (service, store)
}

/// Store that always fails to save
struct BrokenStore;

impl GraphStore for BrokenStore {
    fn load(&self) -> StoreResult<PermissionGraph> {
        Ok(base_graph())
    }

    fn save(&self, _graph: &PermissionGraph) -> StoreResult<()> {
        Err(StoreError::Unavailable("disk full".into()))
    }
}

// =============================================================================
// 1. Cache coherency
// =============================================================================

mod cache_coherency {
    use super::*;

    #[test]
    fn test_group_grant_is_visible_after_cached_deny() {
        let (service, _) = service_with_store();

        assert!(!service.has_permission("u1", "server.fly"));
        assert!(!service.has_permission("u1", "server.fly"));
        assert_eq!(service.cache_stats().hits, 1);

        service.add_group_permission("vip", "server.fly").unwrap();

        assert!(service.has_permission("u1", "server.fly"));
    }

    #[test]
    fn test_parent_grant_is_visible_to_descendants() {
        let (service, _) = service_with_store();
        assert!(!service.has_permission("u1", "world.visit"));

        service.add_group_permission("default", "world.visit").unwrap();

        assert!(service.has_permission("u1", "world.visit"));
        assert!(service.has_permission("stranger", "world.visit"));
    }

    #[test]
    fn test_user_permission_changes() {
        let (service, _) = service_with_store();
        assert!(service.has_permission("u1", "vip.kit"));

        service.add_user_permission("u1", "-vip.kit").unwrap();
        assert!(!service.has_permission("u1", "vip.kit"));

        service.remove_user_permission("u1", "-vip.kit").unwrap();
        assert!(service.has_permission("u1", "vip.kit"));
    }

    #[test]
    fn test_membership_changes() {
        let (service, _) = service_with_store();
        assert!(!service.has_permission("u2", "mod.kick"));

        service.add_user_to_group("u2", "mod").unwrap();
        assert!(service.has_permission("u2", "mod.kick"));

        service.remove_user_from_group("u2", "mod").unwrap();
        assert!(!service.has_permission("u2", "mod.kick"));
    }

    #[test]
    fn test_parent_changes() {
        let (service, _) = service_with_store();
        assert!(!service.has_permission("u1", "mod.kick"));

        service.add_parent("vip", "mod").unwrap();
        assert!(service.has_permission("u1", "mod.kick"));

        service.remove_parent("vip", "mod").unwrap();
        assert!(!service.has_permission("u1", "mod.kick"));
    }

    #[test]
    fn test_delete_group_removes_its_grants() {
        let (service, _) = service_with_store();
        assert!(service.has_permission("u1", "vip.kit"));

        service.delete_group("vip").unwrap();

        assert!(!service.has_permission("u1", "vip.kit"));
        // Dangling membership falls through to the default group
        assert!(service.has_permission("u1", "chat.send"));
    }

    #[test]
    fn test_default_group_change() {
        let (service, _) = service_with_store();
        assert!(!service.has_permission("stranger", "mod.kick"));

        service.set_default_group("mod").unwrap();

        assert!(service.has_permission("stranger", "mod.kick"));
    }

    #[test]
    fn test_reload_picks_up_external_edits() {
        let (service, store) = service_with_store();
        assert!(!service.has_permission("u2", "build"));

        let edited = base_graph().with_group("default", Group::default().permissions(["build"]));
        store.set_snapshot(edited);
        assert!(!service.has_permission("u2", "build"));

        service.reload().unwrap();
        assert!(service.has_permission("u2", "build"));
    }

    #[test]
    fn test_explicit_hooks_after_replace() {
        let (service, _) = service_with_store();
        service.has_permission("u1", "vip.kit");
        service.has_permission("u2", "chat.send");

        service.clear_user_cache("u1");
        assert_eq!(service.cache_stats().entries, 1);

        service.clear_cache();
        assert_eq!(service.cache_stats().entries, 0);
    }
}

// =============================================================================
// 2. Mutation rules
// =============================================================================

mod mutations {
    use super::*;

    #[test]
    fn test_self_parent_rejected() {
        let (service, store) = service_with_store();
        assert_eq!(
            service.add_parent("vip", "vip"),
            Err(GraphError::SelfParent("vip".into()))
        );
        assert_eq!(
            service.set_parents("vip", &["default", "vip"]),
            Err(GraphError::SelfParent("vip".into()))
        );
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let (service, _) = service_with_store();
        assert_eq!(
            service.add_parent("vip", "ghost"),
            Err(GraphError::GroupNotFound("ghost".into()))
        );
    }

    #[test]
    fn test_multi_hop_cycle_is_accepted_and_tolerated() {
        let (service, _) = service_with_store();
        service.add_parent("default", "vip").unwrap();

        assert!(service.has_permission("u2", "vip.kit"));
        assert!(!service.has_permission("u2", "nothing"));
    }

    #[test]
    fn test_cannot_delete_default_group() {
        let (service, _) = service_with_store();
        assert_eq!(
            service.delete_group("default"),
            Err(GraphError::DefaultGroupDeletion("default".into()))
        );
    }

    #[test]
    fn test_create_duplicate_group_rejected() {
        let (service, _) = service_with_store();
        assert_eq!(service.create_group("builders"), Ok(true));
        assert_eq!(
            service.create_group("builders"),
            Err(GraphError::GroupExists("builders".into()))
        );
    }

    #[test]
    fn test_add_user_to_unknown_group_rejected() {
        let (service, _) = service_with_store();
        assert_eq!(
            service.add_user_to_group("u1", "ghost"),
            Err(GraphError::GroupNotFound("ghost".into()))
        );
    }

    #[test]
    fn test_remove_from_unknown_user() {
        let (service, _) = service_with_store();
        assert_eq!(
            service.remove_user_permission("ghost", "x"),
            Err(GraphError::UserNotFound("ghost".into()))
        );
    }

    #[test]
    fn test_rename_group_keeps_resolution() {
        let (service, _) = service_with_store();
        assert!(service.has_permission("u1", "chat.send"));

        service.rename_group("default", "member").unwrap();

        service.with_graph(|graph| {
            assert_eq!(graph.default_group_id(), "member");
            assert_eq!(graph.group("vip").unwrap().parents, vec!["member"]);
            assert_eq!(graph.user("u2").unwrap().groups, vec!["member"]);
        });
        assert!(service.has_permission("u1", "chat.send"));
        assert!(service.has_permission("stranger", "chat.send"));
    }

    #[test]
    fn test_priority_change_moves_effective_group() {
        let (service, _) = service_with_store();
        service.add_user_to_group("u1", "mod").unwrap();
        assert_eq!(service.effective_group("u1").as_deref(), Some("mod"));

        service.set_priority("vip", 100).unwrap();
        assert_eq!(service.effective_group("u1").as_deref(), Some("vip"));
    }

    #[test]
    fn test_prefix_and_suffix_are_trimmed() {
        let (service, _) = service_with_store();
        service.set_prefix("vip", "  [VIP] ").unwrap();
        service.set_suffix("vip", " *  ").unwrap();

        assert_eq!(service.user_prefix("u1"), "[VIP]");
        assert_eq!(service.user_suffix("u1"), "*");
    }

    #[test]
    fn test_record_login_assigns_default_group() {
        let (service, _) = service_with_store();

        assert_eq!(service.record_login("u3", "Herobrine"), Ok(true));
        service.with_graph(|graph| {
            let user = graph.user("u3").unwrap();
            assert_eq!(user.groups, vec!["default"]);
            assert_eq!(user.username.as_deref(), Some("Herobrine"));
        });
        assert_eq!(service.user_id_by_name("herobrine").as_deref(), Some("u3"));

        // Same name again changes nothing
        assert_eq!(service.record_login("u3", "Herobrine"), Ok(false));
    }

    #[test]
    fn test_record_login_updates_name_only() {
        let (service, _) = service_with_store();
        assert_eq!(service.record_login("u1", "Steve2"), Ok(true));
        service.with_graph(|graph| {
            assert_eq!(graph.user("u1").unwrap().groups, vec!["vip"]);
        });
        assert_eq!(service.user_id_by_name("steve2").as_deref(), Some("u1"));
    }

    #[test]
    fn test_bulk_permission_changes() {
        let (service, _) = service_with_store();
        assert_eq!(
            service.add_user_permissions("u2", &["a", "b", "a"]),
            Ok(true)
        );
        service.with_graph(|graph| {
            assert_eq!(graph.user("u2").unwrap().permissions, vec!["a", "b"]);
        });
        assert_eq!(service.remove_group_permissions("vip", &["nope"]), Ok(false));
        assert_eq!(service.remove_user_permissions("u2", &["a", "b"]), Ok(true));
    }

    #[test]
    fn test_inherited_groups() {
        let (service, _) = service_with_store();
        assert_eq!(service.inherited_groups("u1"), vec!["vip", "default"]);
        assert_eq!(service.inherited_groups("stranger"), vec!["default"]);
    }
}

// =============================================================================
// 3. Persistence hand-off
// =============================================================================

mod persistence {
    use super::*;

    #[test]
    fn test_each_accepted_mutation_saves_once() {
        let (service, store) = service_with_store();

        service.add_group_permission("vip", "fly").unwrap();
        service.add_group_permission("vip", "fly").unwrap();
        service.add_user_to_group("u2", "vip").unwrap();

        assert_eq!(store.save_count(), 2);
        let saved = store.snapshot().unwrap();
        assert!(saved.group("vip").unwrap().permissions.contains(&"fly".to_string()));
        assert_eq!(saved.user("u2").unwrap().groups, vec!["default", "vip"]);
    }

    #[test]
    fn test_failed_save_keeps_in_memory_change() {
        let service =
            PermissionService::load(Arc::new(BrokenStore), &CacheConfig::default()).unwrap();
        assert!(!service.has_permission("u1", "fly"));

        assert_eq!(service.add_group_permission("vip", "fly"), Ok(true));

        assert!(service.has_permission("u1", "fly"));
    }

    #[test]
    fn test_replace_graph_does_not_save() {
        let (service, store) = service_with_store();
        service.replace_graph(PermissionGraph::default());
        assert_eq!(store.save_count(), 0);
        assert!(!service.has_permission("u1", "vip.kit"));
    }
}

// =============================================================================
// 4. Concurrency
// =============================================================================

#[test]
fn test_concurrent_lookups_and_mutations() {
    let (service, _) = service_with_store();

    thread::scope(|scope| {
        for reader in 0..4 {
            let service = &service;
            scope.spawn(move || {
                for i in 0..500 {
                    let node = format!("node.{}", (i + reader) % 20);
                    service.has_permission("u1", &node);
                    service.has_permission("u2", "chat.send");
                }
            });
        }

        let service = &service;
        scope.spawn(move || {
            for i in 0..50 {
                let node = format!("node.{}", i % 20);
                service.add_group_permission("vip", &node).unwrap();
                service.remove_group_permission("vip", &node).unwrap();
            }
        });
    });

    // After the writer finished, every node has been removed again
    for i in 0..20 {
        assert!(!service.has_permission("u1", &format!("node.{i}")));
    }
    assert!(service.has_permission("u2", "chat.send"));
}
