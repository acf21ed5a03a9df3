//! # Counter Example
//!
//! A simple counter demonstrating the Statehouse state container.
//!
//! This example showcases:
//! - A feature with several closure reducers
//! - A middleware that logs actions and one that vetoes them
//! - An effect that dispatches a follow-up action later
//! - Two-phase activation of the store
//!
//! ## Example
//!
//! ```no_run
//! use counter::{CounterAction, build_store};
//! use statehouse_runtime::ImmediateInitialization;
//!
//! # async fn example() -> Result<(), statehouse_runtime::StoreError> {
//! let (store, counter) = build_store(ImmediateInitialization, 10).await?;
//! store.initialize().await?;
//! store.initialized().await;
//!
//! store.dispatch(CounterAction::Increment).await;
//! assert_eq!(counter.state().count, 1);
//! # Ok(())
//! # }
//! ```

use statehouse_core::effect::{BoxError, Effect, effect_fn};
use statehouse_core::reducer::on;
use statehouse_core::{Dispatcher, Feature, StoreInitialized};
use statehouse_runtime::{InitializationStrategy, Middleware, Store, StoreError};
use std::sync::Arc;
use std::time::Duration;

/// Counter state
///
/// Replaced, never mutated: every reducer builds a new value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterState {
    /// Current count value
    pub count: i64,
    /// Whether the store has finished activating
    pub ready: bool,
}

/// Counter actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterAction {
    /// The store activated
    Initialized,
    /// Increment the counter by 1
    Increment,
    /// Decrement the counter by 1
    Decrement,
    /// Reset the counter to 0
    Reset,
    /// Increment the counter after a delay
    IncrementLater(Duration),
}

impl From<StoreInitialized> for CounterAction {
    fn from(_: StoreInitialized) -> Self {
        Self::Initialized
    }
}

/// Counter feature
pub type CounterFeature = Feature<CounterState, CounterAction>;

/// Build the counter feature and its reducers
#[must_use]
pub fn counter_feature() -> CounterFeature {
    Feature::new("counter", CounterState::default())
        .with_reducer(on(
            |action: &CounterAction| matches!(action, CounterAction::Initialized),
            |state: &CounterState, _: &CounterAction| CounterState {
                ready: true,
                ..state.clone()
            },
        ))
        .with_reducer(on(
            |action: &CounterAction| matches!(action, CounterAction::Increment),
            |state: &CounterState, _: &CounterAction| CounterState {
                count: state.count.saturating_add(1),
                ..state.clone()
            },
        ))
        .with_reducer(on(
            |action: &CounterAction| matches!(action, CounterAction::Decrement),
            |state: &CounterState, _: &CounterAction| CounterState {
                count: state.count.saturating_sub(1),
                ..state.clone()
            },
        ))
        .with_reducer(on(
            |action: &CounterAction| matches!(action, CounterAction::Reset),
            |state: &CounterState, _: &CounterAction| CounterState {
                count: 0,
                ..state.clone()
            },
        ))
}

/// Effect that turns `IncrementLater` into an `Increment` once the delay passes
#[must_use]
pub fn delayed_increment() -> impl Effect<CounterAction> {
    effect_fn(
        |action: &CounterAction| matches!(action, CounterAction::IncrementLater(_)),
        |action: CounterAction, dispatcher: Arc<dyn Dispatcher<CounterAction>>| async move {
            if let CounterAction::IncrementLater(delay) = action {
                tokio::time::sleep(delay).await;
                dispatcher.dispatch(CounterAction::Increment).await;
            }
            Ok::<(), BoxError>(())
        },
    )
}

/// Logs every processed action
#[derive(Debug, Default)]
pub struct ActionLogger;

impl Middleware<CounterAction> for ActionLogger {
    fn after_initialize_all(&self) {
        tracing::info!("Counter store ready");
    }

    fn after_dispatch(&self, action: &CounterAction) {
        tracing::info!(?action, "Action processed");
    }

    fn client_script(&self) -> Option<String> {
        Some("console.debug('counter store attached');".to_string())
    }

    fn name(&self) -> &str {
        "ActionLogger"
    }
}

/// Refuses increments once the counter reaches `max`
#[derive(Debug)]
pub struct Ceiling {
    counter: Arc<CounterFeature>,
    max: i64,
}

impl Ceiling {
    /// Cap `counter` at `max`
    #[must_use]
    pub const fn new(counter: Arc<CounterFeature>, max: i64) -> Self {
        Self { counter, max }
    }
}

impl Middleware<CounterAction> for Ceiling {
    fn may_dispatch(&self, action: &CounterAction) -> bool {
        let allowed =
            !matches!(action, CounterAction::Increment) || self.counter.state().count < self.max;
        if !allowed {
            tracing::warn!(max = self.max, "Increment refused at ceiling");
        }
        allowed
    }

    fn name(&self) -> &str {
        "Ceiling"
    }
}

/// Assemble a counter store: feature, logger, ceiling and delayed increments.
///
/// # Errors
///
/// Returns [`StoreError`] if registration fails.
pub async fn build_store<S>(
    strategy: S,
    max: i64,
) -> Result<(Store<CounterAction>, Arc<CounterFeature>), StoreError>
where
    S: InitializationStrategy<CounterAction> + 'static,
{
    let store = Store::new(strategy);
    let counter = Arc::new(counter_feature());

    store.add_feature(Arc::clone(&counter)).await?;
    store.add_middleware(ActionLogger).await?;
    store
        .add_middleware(Ceiling::new(Arc::clone(&counter), max))
        .await?;
    store.add_effect(delayed_increment()).await?;

    Ok((store, counter))
}
