mod common;

use atomic_upsert::{DbError, IsolationLevel, LockingRead, fields};
use common::{Membership, Tag, engine, membership, short_lock_store, soft_delete, store};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_racing_creates_converge_to_one_row() {
    let store = store();
    let engine = Arc::new(engine(store.clone()));
    let racers = 16;
    let barrier = Arc::new(Barrier::new(racers));

    let tasks = (0..racers).map(|i| {
        let engine = Arc::clone(&engine);
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            engine
                .upsert::<Membership>(membership(1, 2), fields! { "role" => format!("r{}", i) })
                .await
        })
    });

    let outcomes: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let created = outcomes.iter().filter(|o| o.was_created).count();
    assert_eq!(created, 1);

    let ids: HashSet<_> = outcomes.iter().map(|o| o.record.id).collect();
    assert_eq!(ids.len(), 1);
    assert_eq!(store.row_count("memberships").unwrap(), 1);
    assert_eq!(store.held_locks().unwrap(), 0);

    let stats = store.stats();
    assert_eq!(stats.commits, racers as u64);
    assert_eq!(stats.begun, stats.commits + stats.rollbacks);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_restores_revive_once() {
    let store = store();
    let engine = Arc::new(engine(store.clone()));

    let seeded = engine
        .upsert::<Membership>(membership(4, 4), fields! { "role" => "member" })
        .await
        .unwrap();
    soft_delete(&store, "memberships", seeded.record.id).await;

    let racers = 8;
    let barrier = Arc::new(Barrier::new(racers));
    let tasks = (0..racers).map(|_| {
        let engine = Arc::clone(&engine);
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            engine
                .upsert::<Membership>(membership(4, 4), fields! { "role" => "member" })
                .await
        })
    });

    let outcomes: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert!(outcomes.iter().all(|o| !o.was_created));
    assert!(outcomes.iter().all(|o| o.record.id == seeded.record.id));
    assert_eq!(outcomes.iter().filter(|o| o.restored).count(), 1);
    assert_eq!(store.row_count("memberships").unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_keys_many_writers() {
    let store = store();
    let engine = Arc::new(engine(store.clone()));
    let writers = 6;
    let keys = 5i64;
    let barrier = Arc::new(Barrier::new(writers));

    let tasks = (0..writers).map(|w| {
        let engine = Arc::clone(&engine);
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            for round in 0..4 {
                for key in 0..keys {
                    engine
                        .upsert::<Tag>(
                            fields! { "name" => format!("tag-{}", key) },
                            fields! { "color" => format!("w{}-r{}", w, round) },
                        )
                        .await?;
                }
            }
            Ok::<_, DbError>(())
        })
    });

    for joined in join_all(tasks).await {
        joined.unwrap().unwrap();
    }

    assert_eq!(store.row_count("tags").unwrap(), keys as usize);
    for key in 0..keys {
        let rows = store
            .find("tags", &fields! { "name" => format!("tag-{}", key) })
            .unwrap();
        assert_eq!(rows.len(), 1);
    }
}

#[tokio::test]
async fn test_different_identities_do_not_block() {
    let store = short_lock_store(100);
    let engine = engine(store.clone());

    engine
        .upsert::<Membership>(membership(1, 2), fields! { "role" => "member" })
        .await
        .unwrap();

    // Hold the row lock for (1, 2) in an open transaction.
    let mut holder = store
        .begin_transaction(IsolationLevel::ReadCommitted)
        .unwrap();
    let locked = holder
        .locking_read("memberships", &LockingRead::new(membership(1, 2)))
        .await
        .unwrap();
    assert!(locked.is_some());

    let other = tokio::time::timeout(
        Duration::from_secs(2),
        engine.upsert::<Membership>(membership(1, 3), fields! { "role" => "member" }),
    )
    .await
    .expect("unrelated identity must not wait")
    .unwrap();
    assert!(other.was_created);

    holder.rollback().await.unwrap();
}

#[tokio::test]
async fn test_lock_timeout_is_fatal_and_not_retried() {
    let store = short_lock_store(50);
    let engine = engine(store.clone());

    engine
        .upsert::<Membership>(membership(1, 2), fields! { "role" => "member" })
        .await
        .unwrap();

    let mut holder = store
        .begin_transaction(IsolationLevel::ReadCommitted)
        .unwrap();
    holder
        .locking_read("memberships", &LockingRead::new(membership(1, 2)))
        .await
        .unwrap();

    let begun_before = store.stats().begun;
    let err = engine
        .upsert::<Membership>(membership(1, 2), fields! { "role" => "owner" })
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::LockTimeout(_)));
    assert_eq!(store.stats().begun, begun_before + 1);
    assert_eq!(store.stats().lock_timeouts, 1);

    holder.rollback().await.unwrap();
    let row = &store.find("memberships", &membership(1, 2)).unwrap()[0];
    assert_eq!(row.get("role"), Some(&atomic_upsert::Value::from("member")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_waiter_sees_committed_update() {
    let store = store();
    let engine = Arc::new(engine(store.clone()));

    engine
        .upsert::<Membership>(membership(2, 2), fields! { "role" => "member" })
        .await
        .unwrap();

    let mut holder = store
        .begin_transaction(IsolationLevel::ReadCommitted)
        .unwrap();
    let row = holder
        .locking_read("memberships", &LockingRead::new(membership(2, 2)))
        .await
        .unwrap()
        .unwrap();

    let waiter = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .upsert::<Membership>(membership(2, 2), fields! { "role" => "viewer" })
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!waiter.is_finished());

    holder
        .update("memberships", row.id, fields! { "role" => "owner" })
        .await
        .unwrap();
    holder.commit().await.unwrap();

    let outcome = waiter.await.unwrap().unwrap();
    assert!(!outcome.was_created);
    assert_eq!(outcome.record.id, row.id);
    assert_eq!(outcome.entity.role.as_deref(), Some("viewer"));
}
