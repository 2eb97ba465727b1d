//! Many tasks hammering one session, and many sessions in parallel.

use std::sync::Arc;

use satchel_core::config::BackendOptions;
use satchel_core::kv::InMemoryKvStore;
use satchel_core::manager::{DurableSessionManager, MemorySessionManager};
use satchel_core::{Session, SessionManager, SessionValue};

const WRITERS: usize = 8;
const READERS: usize = 8;
const ROUNDS: i64 = 200;

async fn stress_one_session(session: Arc<dyn Session>) {
    let mut handles = Vec::new();

    for w in 0..WRITERS {
        let session = session.clone();
        handles.push(tokio::spawn(async move {
            let own_key = format!("writer-{w}");
            for round in 0..ROUNDS {
                session.set(&own_key, round.into());
                session.set("shared", SessionValue::Int(w as i64 * 1_000 + round));
                if round % 10 == 0 {
                    session.del("scratch");
                } else {
                    session.set("scratch", round.into());
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    for _ in 0..READERS {
        let session = session.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..ROUNDS {
                if let Ok(value) = session.get("shared") {
                    // Every observed value must be one some writer actually wrote.
                    let n = value.as_i64().unwrap();
                    let writer = n / 1_000;
                    let round = n % 1_000;
                    assert!((writer as usize) < WRITERS);
                    assert!(round < ROUNDS);
                }
                let _ = session.snapshot();
                tokio::task::yield_now().await;
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    // Each writer's last write to its own key wins.
    for w in 0..WRITERS {
        assert_eq!(
            session.get(&format!("writer-{w}")).unwrap(),
            SessionValue::Int(ROUNDS - 1)
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_session_under_contention() {
    let manager = MemorySessionManager::new();
    stress_one_session(manager.create_session()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn durable_session_under_contention() {
    let store = Arc::new(InMemoryKvStore::new());
    let manager = DurableSessionManager::with_store(store.clone(), BackendOptions::default())
        .await
        .unwrap();
    let session = manager.create_session();
    stress_one_session(session.clone()).await;

    assert!(session.is_modified());
    session.save().await.unwrap();
    assert!(!session.is_modified());
    assert_eq!(store.writes(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn saves_interleaved_with_writes_never_lose_dirty() {
    let store = Arc::new(InMemoryKvStore::new());
    let manager = DurableSessionManager::with_store(store.clone(), BackendOptions::default())
        .await
        .unwrap();
    let session = manager.create_session();

    let writer = {
        let session = session.clone();
        tokio::spawn(async move {
            for round in 0..ROUNDS {
                session.set("n", round.into());
                tokio::task::yield_now().await;
            }
        })
    };
    let saver = {
        let session = session.clone();
        tokio::spawn(async move {
            for _ in 0..ROUNDS {
                session.save().await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };
    writer.await.unwrap();
    saver.await.unwrap();

    // Whatever happened above, one more save must leave the store holding the final value.
    session.save().await.unwrap();
    assert!(!session.is_modified());

    let reloaded = manager.get_session(session.id()).await.unwrap();
    assert_eq!(reloaded.get("n").unwrap(), SessionValue::Int(ROUNDS - 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_sessions_created_and_cleared_in_parallel() {
    let manager: Arc<dyn SessionManager> = Arc::new(MemorySessionManager::new());

    let mut handles = Vec::new();
    for i in 0..64i64 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            let session = manager.create_session();
            session.set("i", i.into());
            let fetched = manager.get_session(session.id()).await.unwrap();
            assert_eq!(fetched.get("i").unwrap().as_i64(), Some(i));
            if i % 2 == 0 {
                manager.clear(session.id()).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(manager.len(), 32);
}
