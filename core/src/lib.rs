//! # Statehouse Core
//!
//! Core traits and types for the Statehouse state container.
//!
//! Application state is held in named, typed slices (**features**), replaced
//! only by pure transition functions (**reducers**) in response to dispatched
//! **actions**. Side effects (**effects**) react to actions after the state
//! has been folded and may dispatch further actions.
//!
//! The orchestration (queueing, middleware, activation) lives in the
//! `statehouse-runtime` crate. This crate only defines the pieces an
//! application writes.
//!
//! ## Core Concepts
//!
//! - **Action**: An immutable value describing something that happened
//! - **Reducer**: Pure function `(&State, &Action) → State`, scoped to one feature
//! - **Feature**: Named owner of one state slice and its ordered reducers
//! - **Effect**: Predicate-gated asynchronous reaction that may dispatch actions
//! - **Dispatcher**: The only capability an effect gets back into the store
//!
//! ## Example
//!
//! ```
//! use statehouse_core::{Feature, StoreInitialized, reducer::on};
//!
//! #[derive(Clone, Debug)]
//! enum CounterAction {
//!     Initialized,
//!     Increment,
//! }
//!
//! impl From<StoreInitialized> for CounterAction {
//!     fn from(_: StoreInitialized) -> Self {
//!         Self::Initialized
//!     }
//! }
//!
//! let feature = Feature::new("counter", 0_i64).with_reducer(on(
//!     |action: &CounterAction| matches!(action, CounterAction::Increment),
//!     |count: &i64, _action: &CounterAction| count + 1,
//! ));
//!
//! assert_eq!(*feature.state(), 0);
//! ```

pub use futures::future::BoxFuture;

/// Reducer trait and closure-based reducers
pub mod reducer;

/// Features: named, subscribable state slices
pub mod feature;

/// Effects: asynchronous reactions to actions
pub mod effect;

/// Action module - the bound every dispatched value satisfies
///
/// Actions are plain values, usually one enum per application. The store
/// needs to clone them (one copy per reacting effect), log them, move them
/// across tasks, and build the well-known [`StoreInitialized`] marker into
/// them, which is everything the [`Action`] bound asks for.
pub mod action {
    use serde::{Deserialize, Serialize};
    use std::fmt::Debug;

    /// Marker action queued exactly once when a store is constructed.
    ///
    /// It flows through the pipeline as the first action after activation,
    /// so features and middleware registered before activation all observe it.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct StoreInitialized;

    /// Bound satisfied by every action type a store can carry.
    ///
    /// Implemented automatically for any type that is
    /// `Clone + Debug + Send + Sync + 'static` and can be built from
    /// [`StoreInitialized`].
    pub trait Action: Clone + Debug + Send + Sync + 'static + From<StoreInitialized> {}

    impl<T> Action for T where T: Clone + Debug + Send + Sync + 'static + From<StoreInitialized> {}
}

/// Dispatcher module - the capability effects use to feed actions back
pub mod dispatcher {
    use futures::future::BoxFuture;

    /// Something actions can be dispatched into.
    ///
    /// Handed to effects so they can issue follow-up actions without seeing
    /// the rest of the store. The returned future completes once the action
    /// has been queued (and, when the store is active and nothing else is
    /// draining, processed).
    pub trait Dispatcher<A>: Send + Sync {
        /// Dispatch an action
        fn dispatch(&self, action: A) -> BoxFuture<'_, ()>;
    }
}

// Re-export commonly used types
pub use action::{Action, StoreInitialized};
pub use dispatcher::Dispatcher;
pub use effect::{Effect, EffectResult};
pub use feature::{AnyFeature, Feature};
pub use reducer::Reducer;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    enum TestAction {
        Initialized,
    }

    impl From<StoreInitialized> for TestAction {
        fn from(_: StoreInitialized) -> Self {
            Self::Initialized
        }
    }

    fn assert_action<A: Action>() {}

    #[test]
    fn enums_with_marker_conversion_are_actions() {
        assert_action::<TestAction>();
        assert_eq!(TestAction::from(StoreInitialized), TestAction::Initialized);
    }
}
