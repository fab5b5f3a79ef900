//! Concurrent writers against the access document.

mod common;

use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use gatekit_core::access::AccessConfigRegistry;
use gatekit_core::storage::SubscriptionStatus;
use gatekit_core::DeploymentConfig;

const CLIENT_A: &str = "aaaaaaaa-0000-4000-8000-000000000001";
const CLIENT_B: &str = "bbbbbbbb-0000-4000-8000-000000000002";

fn ids(registry: &AccessConfigRegistry) -> Vec<String> {
    let document = registry.load().expect("load");
    registry
        .locate_managed_clients(&document)
        .expect("clients")
        .into_iter()
        .map(|client| client.id)
        .collect()
}

#[test]
fn test_unguarded_interleaving_loses_an_update() {
    let root = tempfile::tempdir().expect("tempdir");
    let registry = AccessConfigRegistry::new(&DeploymentConfig::with_root(root.path()))
        .expect("registry");

    // Both writers read the same pre-mutation snapshot.
    let seen_by_a = registry.load().expect("load a");
    let seen_by_b = registry.load().expect("load b");

    let written_by_a = registry.add_client(&seen_by_a, CLIENT_A, "tg_1").expect("add a");
    registry.save(&written_by_a).expect("save a");
    let written_by_b = registry.add_client(&seen_by_b, CLIENT_B, "tg_2").expect("add b");
    registry.save(&written_by_b).expect("save b");

    assert_eq!(ids(&registry), vec![CLIENT_B.to_string()]);
}

#[test]
fn test_locked_update_blocks_second_writer_until_first_saves() {
    let root = tempfile::tempdir().expect("tempdir");
    let config = DeploymentConfig::with_root(root.path());
    let first = Arc::new(AccessConfigRegistry::new(&config).expect("registry a"));
    let second = AccessConfigRegistry::new(&config).expect("registry b");
    let (loaded_tx, loaded_rx) = mpsc::channel();

    let writer = {
        let first = Arc::clone(&first);
        thread::spawn(move || {
            first
                .update(|registry, document| {
                    loaded_tx.send(()).expect("signal");
                    // Hold the lock past the point where the other writer loads.
                    thread::sleep(Duration::from_millis(100));
                    registry.add_client(document, CLIENT_A, "tg_1")
                })
                .expect("update a");
        })
    };

    loaded_rx.recv().expect("first writer loaded");
    second.grant(CLIENT_B, "tg_2").expect("grant b");
    writer.join().expect("join");

    let mut survivors = ids(&second);
    survivors.sort();
    assert_eq!(survivors, vec![CLIENT_A.to_string(), CLIENT_B.to_string()]);
}

#[test]
fn test_concurrent_grants_through_separate_handles_all_survive() {
    const WRITERS: usize = 8;
    let root = tempfile::tempdir().expect("tempdir");
    let config = Arc::new(DeploymentConfig::with_root(root.path()));
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|index| {
            let config = Arc::clone(&config);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                // Separate handles contend on the file lock, not only the mutex.
                let registry = AccessConfigRegistry::new(&config).expect("registry");
                barrier.wait();
                registry
                    .grant(&format!("client-{index}"), &format!("tg_{index}"))
                    .expect("grant");
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("join");
    }

    let registry = AccessConfigRegistry::new(&config).expect("registry");
    let mut survivors = ids(&registry);
    survivors.sort();
    let mut expected: Vec<_> = (0..WRITERS).map(|index| format!("client-{index}")).collect();
    expected.sort();
    assert_eq!(survivors, expected);
}

#[test]
fn test_concurrent_provisions_share_one_engine() {
    const SUBSCRIBERS: i64 = 6;
    let env = common::test_engine();
    let engine = &env.engine;
    let barrier = Barrier::new(usize::try_from(SUBSCRIBERS).expect("fits"));

    thread::scope(|scope| {
        for external_id in 0..SUBSCRIBERS {
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                engine
                    .provision(external_id, 30, Utc::now())
                    .expect("provision");
            });
        }
    });

    let listed = engine.list().expect("list");
    assert_eq!(listed.len(), 6);
    let ids = common::managed_ids(engine);
    assert_eq!(ids.len(), 6);
    for response in listed {
        assert!(ids.contains(&response.client_id));
    }
}

#[test]
fn test_reconcile_waiting_on_the_lock_does_not_regrant_a_revoke() {
    let env = common::test_engine();
    let engine = &env.engine;
    let client_id = engine
        .provision(1, 30, Utc::now())
        .expect("provision")
        .client_id;
    let holder = AccessConfigRegistry::new(engine.config()).expect("second handle");
    let (locked_tx, locked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let report = thread::scope(|scope| {
        let withdrawn = client_id.clone();
        let revoker = scope.spawn(move || {
            holder
                .update(|registry, document| {
                    locked_tx.send(()).expect("signal");
                    release_rx.recv().expect("release");
                    registry.remove_client(document, &withdrawn)
                })
                .expect("withdraw");
        });
        locked_rx.recv().expect("holder has the lock");

        let reconciler = scope.spawn(move || engine.reconcile().expect("reconcile"));
        // Let reconcile start and queue on the lock before the revoke commits.
        thread::sleep(Duration::from_millis(100));
        engine
            .store()
            .update_status(1, SubscriptionStatus::Revoked, Utc::now())
            .expect("revoke record");
        release_tx.send(()).expect("release");

        revoker.join().expect("join revoker");
        reconciler.join().expect("join reconciler")
    });

    assert!(report.granted.is_empty());
    assert!(report.withdrawn.is_empty());
    let row = engine.store().get(1).expect("get").expect("row");
    assert_eq!(row.status, SubscriptionStatus::Revoked);
    assert!(!common::managed_ids(engine).contains(&client_id));
}
