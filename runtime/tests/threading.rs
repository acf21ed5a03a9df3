//! Concurrency tests: many tasks dispatching into one store

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use statehouse_core::reducer::on;
use statehouse_core::{Feature, StoreInitialized};
use statehouse_runtime::{ImmediateInitialization, Store};
use statehouse_testing::{Hook, HookLog, RecordingMiddleware};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
enum TestAction {
    Initialized,
    Increment,
}

impl From<StoreInitialized> for TestAction {
    fn from(_: StoreInitialized) -> Self {
        Self::Initialized
    }
}

const TASKS: usize = 10;
const DISPATCHES_PER_TASK: usize = 1_000;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dispatches_are_all_applied() {
    let store = Store::new(ImmediateInitialization);
    let counter = Arc::new(Feature::new("counter", 0_usize).with_reducer(on(
        |action: &TestAction| matches!(action, TestAction::Increment),
        |count: &usize, _: &TestAction| count + 1,
    )));
    store.add_feature(Arc::clone(&counter)).await.unwrap();
    store.initialize().await.unwrap();
    store.initialized().await;

    let handles: Vec<_> = (0..TASKS)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..DISPATCHES_PER_TASK {
                    store.dispatch(TestAction::Increment).await;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(*counter.state(), TASKS * DISPATCHES_PER_TASK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hooks_never_interleave_across_concurrent_dispatches() {
    let store = Store::new(ImmediateInitialization);
    let log = HookLog::new();
    store
        .add_middleware(RecordingMiddleware::new("spy", log.clone()))
        .await
        .unwrap();
    store.initialize().await.unwrap();
    store.initialized().await;
    log.clear();

    let handles: Vec<_> = (0..TASKS)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    store.dispatch(TestAction::Increment).await;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let hooks: Vec<Hook> = log.calls().into_iter().map(|call| call.hook).collect();
    assert_eq!(hooks.len(), TASKS * 100 * 2);
    for pair in hooks.chunks(2) {
        assert_eq!(pair, [Hook::BeforeDispatch, Hook::AfterDispatch]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dispatches_racing_activation_are_not_lost() {
    let store = Store::new(ImmediateInitialization);
    let counter = Arc::new(Feature::new("counter", 0_usize).with_reducer(on(
        |action: &TestAction| matches!(action, TestAction::Increment),
        |count: &usize, _: &TestAction| count + 1,
    )));
    store.add_feature(Arc::clone(&counter)).await.unwrap();

    let handles: Vec<_> = (0..TASKS)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    store.dispatch(TestAction::Increment).await;
                }
            })
        })
        .collect();
    store.initialize().await.unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
    store.initialized().await;

    assert_eq!(*counter.state(), TASKS * 100);
}
