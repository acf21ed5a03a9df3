//! Dispatch Performance Benchmarks
//!
//! These benchmarks track the cost of the dispatch pipeline:
//! - Feature fold: a reducer pass over one feature, no store involved
//! - Store throughput: one action through an activated store
//! - Middleware overhead: the same action with hooks registered
//! - Concurrent dispatch: several tasks contending for the store
//!
//! Run with: `cargo bench`

#![allow(missing_docs)] // Benchmarks don't need extensive docs
#![allow(clippy::expect_used)] // Benchmarks can use expect for setup

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use statehouse_core::reducer::on;
use statehouse_core::{AnyFeature, Feature, StoreInitialized};
use statehouse_runtime::{ImmediateInitialization, Middleware, Store, StoreConfig};
use std::hint::black_box;
use std::sync::Arc;

// Test state
#[derive(Clone, Debug)]
struct BenchState {
    counter: i64,
    data: Vec<u8>, // For testing state size impact
}

impl Default for BenchState {
    fn default() -> Self {
        Self {
            counter: 0,
            data: vec![0; 1024], // 1KB of data
        }
    }
}

// Test actions
#[derive(Clone, Debug)]
enum BenchAction {
    Initialized,
    Increment,
    SetValue(i64),
    NoOp,
}

impl From<StoreInitialized> for BenchAction {
    fn from(_: StoreInitialized) -> Self {
        Self::Initialized
    }
}

fn bench_feature() -> Feature<BenchState, BenchAction> {
    Feature::new("bench", BenchState::default())
        .with_reducer(on(
            |action: &BenchAction| matches!(action, BenchAction::Increment),
            |state: &BenchState, _: &BenchAction| BenchState {
                counter: state.counter + 1,
                data: state.data.clone(),
            },
        ))
        .with_reducer(on(
            |action: &BenchAction| matches!(action, BenchAction::SetValue(_)),
            |state: &BenchState, action: &BenchAction| BenchState {
                counter: match action {
                    BenchAction::SetValue(value) => *value,
                    _ => state.counter,
                },
                data: state.data.clone(),
            },
        ))
}

// Middleware that looks at every action and lets it through
struct PassThrough;

impl Middleware<BenchAction> for PassThrough {
    fn before_dispatch(&self, action: &BenchAction) {
        black_box(action);
    }

    fn after_dispatch(&self, action: &BenchAction) {
        black_box(action);
    }
}

async fn activated_store(middlewares: usize) -> Store<BenchAction> {
    let store = Store::with_config(
        ImmediateInitialization,
        StoreConfig::new("bench", false),
    );
    store
        .add_feature(Arc::new(bench_feature()))
        .await
        .expect("Failed to add feature");
    for _ in 0..middlewares {
        store
            .add_middleware(PassThrough)
            .await
            .expect("Failed to add middleware");
    }
    store.initialize().await.expect("Failed to initialize");
    store.initialized().await;
    store
}

/// Benchmark a single feature fold
fn benchmark_feature_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("feature_fold");
    group.throughput(Throughput::Elements(1));

    let feature = bench_feature();

    group.bench_function("increment", |b| {
        b.iter(|| feature.receive_dispatch_notification(black_box(&BenchAction::Increment)));
    });

    group.bench_function("set_value", |b| {
        b.iter(|| feature.receive_dispatch_notification(black_box(&BenchAction::SetValue(42))));
    });

    group.bench_function("no_match", |b| {
        b.iter(|| feature.receive_dispatch_notification(black_box(&BenchAction::NoOp)));
    });

    group.finish();
}

/// Benchmark Store throughput (actions/sec)
fn benchmark_store_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_throughput");
    group.throughput(Throughput::Elements(1));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    group.bench_function("dispatch", |b| {
        let store = runtime.block_on(activated_store(0));

        b.to_async(&runtime).iter(|| async {
            store.dispatch(black_box(BenchAction::Increment)).await;
        });
    });

    group.bench_function("dispatch_unmatched", |b| {
        let store = runtime.block_on(activated_store(0));

        b.to_async(&runtime).iter(|| async {
            store.dispatch(black_box(BenchAction::NoOp)).await;
        });
    });

    group.finish();
}

/// Benchmark the cost of middleware hooks around dispatch
fn benchmark_middleware_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("middleware_overhead");
    group.throughput(Throughput::Elements(1));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    for count in [1, 4, 16] {
        group.bench_function(format!("{count}_middlewares"), |b| {
            let store = runtime.block_on(activated_store(count));

            b.to_async(&runtime).iter(|| async {
                store.dispatch(black_box(BenchAction::Increment)).await;
            });
        });
    }

    group.finish();
}

/// Benchmark concurrent Store access
fn benchmark_concurrent_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent");
    group.throughput(Throughput::Elements(10));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    group.bench_function("10_concurrent_dispatches", |b| {
        let store = runtime.block_on(activated_store(1));

        b.to_async(&runtime).iter(|| async {
            let handles: Vec<_> = (0..10)
                .map(|_| {
                    let store = store.clone();
                    tokio::spawn(async move {
                        store.dispatch(BenchAction::Increment).await;
                    })
                })
                .collect();

            for handle in handles {
                handle.await.expect("Task failed");
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_feature_fold,
    benchmark_store_throughput,
    benchmark_middleware_overhead,
    benchmark_concurrent_access,
);
criterion_main!(benches);
