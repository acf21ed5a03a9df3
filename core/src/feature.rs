//! Features: named owners of one state slice and its reducers.
//!
//! A [`Feature`] holds its current state behind an [`Arc`] and publishes every
//! replacement through a [`tokio::sync::watch`] channel, which is how a UI
//! layer observes it. The store only ever sees features through the
//! object-safe [`AnyFeature`] trait, so features with different state types
//! can share one registry.
//!
//! # Example
//!
//! ```
//! use statehouse_core::{AnyFeature, Feature, StoreInitialized, reducer::on};
//!
//! #[derive(Clone, Debug)]
//! enum Action {
//!     Initialized,
//!     Rename(String),
//! }
//!
//! impl From<StoreInitialized> for Action {
//!     fn from(_: StoreInitialized) -> Self {
//!         Self::Initialized
//!     }
//! }
//!
//! let feature = Feature::new("profile", String::from("anonymous")).with_reducer(on(
//!     |a: &Action| matches!(a, Action::Rename(_)),
//!     |name: &String, a: &Action| match a {
//!         Action::Rename(next) => next.clone(),
//!         Action::Initialized => name.clone(),
//!     },
//! ));
//!
//! let changes = feature.subscribe();
//! feature.receive_dispatch_notification(&Action::Rename("ada".into()));
//!
//! assert_eq!(feature.state().as_str(), "ada");
//! assert!(changes.has_changed().unwrap_or(false));
//! ```

use crate::reducer::Reducer;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;

/// Object-safe view of a feature, as held by the store registry.
///
/// The store calls [`AnyFeature::receive_dispatch_notification`] once per
/// processed action, in feature-registration order.
pub trait AnyFeature<A>: Send + Sync {
    /// Unique (case-insensitive) feature name
    fn name(&self) -> &str;

    /// Fold the action through every matching reducer and publish the result
    fn receive_dispatch_notification(&self, action: &A);
}

type SharedReducer<S, A> = Arc<dyn Reducer<State = S, Action = A>>;

/// A named, typed state slice with an ordered list of reducers
///
/// # Type Parameters
///
/// - `S`: The state type (replaced on every change, never mutated in place)
/// - `A`: The application action type
pub struct Feature<S, A> {
    name: String,
    state: watch::Sender<Arc<S>>,
    reducers: RwLock<Vec<SharedReducer<S, A>>>,
}

impl<S, A> Feature<S, A>
where
    S: Send + Sync + 'static,
    A: 'static,
{
    /// Create a feature with its initial state and no reducers
    #[must_use]
    pub fn new(name: impl Into<String>, initial_state: S) -> Self {
        let (state, _) = watch::channel(Arc::new(initial_state));
        Self {
            name: name.into(),
            state,
            reducers: RwLock::new(Vec::new()),
        }
    }

    /// Builder form of [`Feature::add_reducer`]
    #[must_use]
    pub fn with_reducer<R>(self, reducer: R) -> Self
    where
        R: Reducer<State = S, Action = A> + 'static,
    {
        self.add_reducer(reducer);
        self
    }

    /// Append a reducer.
    ///
    /// Reducers apply in the order they were added. Adding a reducer after
    /// the feature has been registered with a store is allowed; it takes part
    /// in every action processed afterwards.
    pub fn add_reducer<R>(&self, reducer: R)
    where
        R: Reducer<State = S, Action = A> + 'static,
    {
        self.reducers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(reducer));
    }

    /// Number of registered reducers
    #[must_use]
    pub fn reducer_count(&self) -> usize {
        self.reducers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> Arc<S> {
        Arc::clone(&self.state.borrow())
    }

    /// Subscribe to state replacements.
    ///
    /// The receiver observes the state current at subscription time as
    /// already seen; every later replacement marks it changed.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<S>> {
        self.state.subscribe()
    }
}

impl<S, A> AnyFeature<A> for Feature<S, A>
where
    S: Send + Sync + 'static,
    A: 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn receive_dispatch_notification(&self, action: &A) {
        let reducers = self.reducers.read().unwrap_or_else(PoisonError::into_inner);
        let current = self.state();

        let mut next: Option<S> = None;
        for reducer in reducers.iter().filter(|r| r.should_reduce(action)) {
            let base = next.as_ref().unwrap_or(&*current);
            let reduced = reducer.reduce(base, action);
            next = Some(reduced);
        }

        // No matching reducer: state untouched, subscribers not woken
        if let Some(next) = next {
            self.state.send_replace(Arc::new(next));
        }
    }
}

impl<S: fmt::Debug, A> fmt::Debug for Feature<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feature")
            .field("name", &self.name)
            .field("state", &*self.state.borrow())
            .field(
                "reducers",
                &self.reducers.read().unwrap_or_else(PoisonError::into_inner).len(),
            )
            .finish()
    }
}
