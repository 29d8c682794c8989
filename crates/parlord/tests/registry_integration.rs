//! Integration tests for the Registry Actor.
//!
//! These tests verify the registry works correctly as a complete system,
//! through `spawn_registry()` and the `RegistryHandle` interface.
//!
//! Tests CAN use `.unwrap()` and `.expect()`; the panic-free behavior of
//! production code is verified through assertions.

use std::collections::HashSet;
use std::time::Duration;

use parlor_core::{ConnectionId, Username};
use parlord::registry::{
    spawn_registry, spawn_registry_with_capacity, PresenceEvent, RegistryError, RegistryHandle,
};
use parlord::session::{open_outbound, SessionHandle};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Helpers
// ============================================================================

/// Helper to create a session whose output goes nowhere.
fn create_session(name: &str, id: u64) -> SessionHandle {
    let (outbound, _writer) = open_outbound(
        ConnectionId::new(id),
        tokio::io::sink(),
        CancellationToken::new(),
    );
    SessionHandle::new(Username::parse(name).unwrap(), outbound)
}

fn username(name: &str) -> Username {
    Username::parse(name).unwrap()
}

// ============================================================================
// Basic Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_basic_lifecycle() {
    let handle = spawn_registry();

    assert_eq!(handle.register(create_session("alice", 1)).await, Ok(1));

    let found = handle.lookup("alice").await.expect("alice should be online");
    assert_eq!(found.connection_id(), ConnectionId::new(1));

    assert_eq!(handle.count().await, 1);
    assert_eq!(handle.unregister(&username("alice"), ConnectionId::new(1)).await, Ok(0));
    assert!(handle.lookup("alice").await.is_none());
}

#[tokio::test]
async fn test_lookup_is_case_sensitive() {
    let handle = spawn_registry();
    handle.register(create_session("Alice", 1)).await.unwrap();

    assert!(handle.lookup("Alice").await.is_some());
    assert!(handle.lookup("alice").await.is_none());
}

#[tokio::test]
async fn test_duplicate_registration_fails() {
    let handle = spawn_registry();
    handle.register(create_session("alice", 1)).await.unwrap();

    let result = handle.register(create_session("alice", 2)).await;
    assert_eq!(result, Err(RegistryError::UsernameTaken(username("alice"))));

    // First holder still owns the name
    let holder = handle.lookup("alice").await.unwrap();
    assert_eq!(holder.connection_id(), ConnectionId::new(1));
    assert_eq!(handle.count().await, 1);
}

#[tokio::test]
async fn test_double_unregister_is_noop() {
    let handle = spawn_registry();
    handle.register(create_session("alice", 1)).await.unwrap();
    handle.register(create_session("bob", 2)).await.unwrap();

    let alice = username("alice");
    assert_eq!(handle.unregister(&alice, ConnectionId::new(1)).await, Ok(1));
    assert_eq!(handle.unregister(&alice, ConnectionId::new(1)).await, Ok(1));
    assert_eq!(handle.count().await, 1);
}

#[tokio::test]
async fn test_stale_unregister_keeps_new_holder() {
    let handle = spawn_registry();
    let alice = username("alice");

    handle.register(create_session("alice", 1)).await.unwrap();
    handle.unregister(&alice, ConnectionId::new(1)).await.unwrap();
    handle.register(create_session("alice", 2)).await.unwrap();

    // Late teardown of the first connection must not evict the second
    assert_eq!(handle.unregister(&alice, ConnectionId::new(1)).await, Ok(1));
    assert_eq!(
        handle.lookup("alice").await.unwrap().connection_id(),
        ConnectionId::new(2)
    );
}

#[tokio::test]
async fn test_snapshot_lists_everyone_once() {
    let handle = spawn_registry();
    for (i, name) in ["carol", "alice", "bob"].iter().enumerate() {
        handle.register(create_session(name, i as u64)).await.unwrap();
    }

    let names: Vec<String> = handle
        .usernames()
        .await
        .into_iter()
        .map(|n| n.to_string())
        .collect();
    assert_eq!(names, vec!["alice", "bob", "carol"]);
    assert_eq!(handle.snapshot().await.len(), 3);
}

#[tokio::test]
async fn test_capacity_limit() {
    let handle = spawn_registry_with_capacity(2);
    handle.register(create_session("a", 1)).await.unwrap();
    handle.register(create_session("b", 2)).await.unwrap();

    let result = handle.register(create_session("c", 3)).await;
    assert_eq!(result, Err(RegistryError::RegistryFull { max: 2 }));

    // Space frees up after a leave
    handle.unregister(&username("a"), ConnectionId::new(1)).await.unwrap();
    assert_eq!(handle.register(create_session("c", 3)).await, Ok(2));
}

// ============================================================================
// Count Consistency
// ============================================================================

#[tokio::test]
async fn test_count_tracks_join_leave_sequence() {
    let handle = spawn_registry();
    let mut online: HashSet<String> = HashSet::new();

    // Deterministic interleaving of joins and leaves
    for step in 0..60u64 {
        let name = format!("user{}", step % 7);
        if online.contains(&name) {
            let id = step % 7;
            let count = handle.unregister(&username(&name), ConnectionId::new(id)).await.unwrap();
            online.remove(&name);
            assert_eq!(count, online.len());
        } else {
            let count = handle.register(create_session(&name, step % 7)).await.unwrap();
            online.insert(name);
            assert_eq!(count, online.len());
        }

        assert_eq!(handle.count().await, online.len());
        assert_eq!(handle.usernames().await.len(), online.len());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins() {
    let handle = spawn_registry();

    let tasks: Vec<_> = (0..100u64)
        .map(|i| {
            let handle = handle.clone();
            tokio::spawn(async move {
                handle
                    .register(create_session(&format!("user-{i}"), i))
                    .await
                    .expect("distinct names should register")
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(handle.count().await, 100);
    let names: HashSet<String> = handle
        .usernames()
        .await
        .into_iter()
        .map(|n| n.to_string())
        .collect();
    assert_eq!(names.len(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_joins_admit_one() {
    let handle = spawn_registry();

    let tasks: Vec<_> = (0..20u64)
        .map(|i| {
            let handle = handle.clone();
            tokio::spawn(async move { handle.register(create_session("same", i)).await })
        })
        .collect();

    let mut admitted = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(handle.count().await, 1);
}

// ============================================================================
// Presence Events
// ============================================================================

#[tokio::test]
async fn test_presence_events() {
    let handle = spawn_registry();
    let mut events = handle.subscribe();

    handle.register(create_session("alice", 1)).await.unwrap();
    handle.register(create_session("bob", 2)).await.unwrap();
    handle.unregister(&username("alice"), ConnectionId::new(1)).await.unwrap();

    let mut received = Vec::new();
    for _ in 0..3 {
        let event = timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("event should arrive")
            .unwrap();
        received.push(event);
    }

    assert_eq!(
        received,
        vec![
            PresenceEvent::Joined {
                username: username("alice"),
                connection_id: ConnectionId::new(1),
                online: 1
            },
            PresenceEvent::Joined {
                username: username("bob"),
                connection_id: ConnectionId::new(2),
                online: 2
            },
            PresenceEvent::Left {
                username: username("alice"),
                connection_id: ConnectionId::new(1),
                online: 1
            },
        ]
    );
}

#[tokio::test]
async fn test_failed_operations_publish_nothing() {
    let handle = spawn_registry();
    handle.register(create_session("alice", 1)).await.unwrap();

    let mut events = handle.subscribe();
    let _ = handle.register(create_session("alice", 2)).await;
    handle.unregister(&username("nobody"), ConnectionId::new(9)).await.unwrap();

    let result = timeout(Duration::from_millis(100), events.recv()).await;
    assert!(result.is_err(), "no event expected, got {result:?}");
}

#[tokio::test]
async fn test_handle_clones_share_state() {
    let handle: RegistryHandle = spawn_registry();
    let other = handle.clone();

    handle.register(create_session("alice", 1)).await.unwrap();
    assert!(other.lookup("alice").await.is_some());
}
