//! Counter example binary
//!
//! Demonstrates the Statehouse state container with a simple counter.

use counter::{CounterAction, build_store};
use statehouse_runtime::ImmediateInitialization;
use statehouse_runtime::metrics::MetricsServer;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "counter=info,statehouse_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut metrics = MetricsServer::new("127.0.0.1:9090".parse()?);
    metrics.start()?;

    println!("=== Counter Example: Statehouse ===\n");

    let (store, counter) = build_store(ImmediateInitialization, 3).await?;

    // Queued until the store activates
    store.dispatch(CounterAction::Increment).await;
    println!("Count before activation: {}", counter.state().count);

    let script = store.initialize().await?;
    store.initialized().await;
    println!("Bootstrap script:\n{script}");
    println!("Count after activation: {}", counter.state().count);

    for _ in 0..4 {
        println!("\n>>> Dispatching: Increment");
        store.dispatch(CounterAction::Increment).await;
        println!("Count: {}", counter.state().count);
    }

    println!("\n>>> Dispatching: Decrement");
    store.dispatch(CounterAction::Decrement).await;
    println!("Count: {}", counter.state().count);

    println!("\n>>> Dispatching: IncrementLater(50ms)");
    let mut changes = counter.subscribe();
    store
        .dispatch(CounterAction::IncrementLater(Duration::from_millis(50)))
        .await;
    changes.changed().await?;
    println!("Count: {}", counter.state().count);

    println!("\n>>> Replaying a snapshot (dispatch suppressed)");
    store
        .with_internal_middleware_change(|| async {
            store.dispatch(CounterAction::Reset).await;
        })
        .await?;
    println!("Count: {}", counter.state().count);

    println!("\n>>> Dispatching: Reset");
    store.dispatch(CounterAction::Reset).await;
    println!("Count: {}", counter.state().count);

    if let Some(rendered) = metrics.render() {
        println!("\n=== Metrics ===\n{rendered}");
    }

    Ok(())
}
