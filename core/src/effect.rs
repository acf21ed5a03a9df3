//! Effects: predicate-gated asynchronous reactions to actions.
//!
//! After an action has been folded into every feature, the store asks each
//! registered [`Effect`] whether it reacts to it. Every effect that does is
//! started on its own task and handed a [`Dispatcher`] for follow-up
//! actions. The store never awaits an effect: a slow or failing effect
//! cannot hold up the actions queued behind it.
//!
//! # Example
//!
//! ```
//! use statehouse_core::effect::{effect_fn, BoxError, Effect};
//! use statehouse_core::Dispatcher;
//! use std::sync::Arc;
//!
//! #[derive(Clone, Debug)]
//! enum Action {
//!     Fetch,
//!     Fetched(u32),
//! }
//!
//! let fetch = effect_fn(
//!     |a: &Action| matches!(a, Action::Fetch),
//!     |_action: Action, dispatcher: Arc<dyn Dispatcher<Action>>| async move {
//!         dispatcher.dispatch(Action::Fetched(42)).await;
//!         Ok::<(), BoxError>(())
//!     },
//! );
//!
//! assert!(fetch.should_react(&Action::Fetch));
//! assert!(!fetch.should_react(&Action::Fetched(1)));
//! ```

use crate::dispatcher::Dispatcher;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Boxed error returned by failing effects
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of an effect handler.
///
/// Failures are logged and counted by the store; they never stop other
/// queued actions from being processed.
pub type EffectResult = Result<(), BoxError>;

/// An asynchronous reaction to dispatched actions
///
/// Effects may capture collaborators (API clients, clocks) at construction
/// but keep no state between dispatches.
pub trait Effect<A>: Send + Sync {
    /// Whether this effect reacts to the given action
    fn should_react(&self, action: &A) -> bool;

    /// React to an action.
    ///
    /// `dispatcher` feeds follow-up actions back into the store. They are
    /// queued behind whatever the store is currently processing.
    fn handle<'a>(
        &'a self,
        action: A,
        dispatcher: Arc<dyn Dispatcher<A>>,
    ) -> BoxFuture<'a, EffectResult>;
}

/// An effect built from a predicate closure and an async handler closure.
///
/// Created with [`effect_fn`].
pub struct EffectFn<A, P, H> {
    predicate: P,
    handler: H,
    _marker: PhantomData<fn(A)>,
}

impl<A, P, H, Fut> Effect<A> for EffectFn<A, P, H>
where
    A: Send + 'static,
    P: Fn(&A) -> bool + Send + Sync,
    H: Fn(A, Arc<dyn Dispatcher<A>>) -> Fut + Send + Sync,
    Fut: Future<Output = EffectResult> + Send + 'static,
{
    fn should_react(&self, action: &A) -> bool {
        (self.predicate)(action)
    }

    fn handle<'a>(
        &'a self,
        action: A,
        dispatcher: Arc<dyn Dispatcher<A>>,
    ) -> BoxFuture<'a, EffectResult> {
        Box::pin((self.handler)(action, dispatcher))
    }
}

impl<A, P, H> fmt::Debug for EffectFn<A, P, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectFn").finish_non_exhaustive()
    }
}

/// Build an effect from a predicate and an async handler.
pub const fn effect_fn<A, P, H, Fut>(predicate: P, handler: H) -> EffectFn<A, P, H>
where
    P: Fn(&A) -> bool + Send + Sync,
    H: Fn(A, Arc<dyn Dispatcher<A>>) -> Fut + Send + Sync,
    Fut: Future<Output = EffectResult> + Send + 'static,
{
    EffectFn {
        predicate,
        handler,
        _marker: PhantomData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<u32>>);

    impl Dispatcher<u32> for Collect {
        fn dispatch(&self, action: u32) -> BoxFuture<'_, ()> {
            Box::pin(async move {
                self.0
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .push(action);
            })
        }
    }

    #[tokio::test]
    async fn closure_effect_dispatches_through_handle() {
        let effect = effect_fn(
            |n: &u32| *n == 1,
            |n: u32, dispatcher: Arc<dyn Dispatcher<u32>>| async move {
                dispatcher.dispatch(n + 1).await;
                dispatcher.dispatch(n + 2).await;
                Ok::<(), BoxError>(())
            },
        );
        let collected = Arc::new(Collect::default());
        let dispatcher: Arc<dyn Dispatcher<u32>> = collected.clone();

        assert!(effect.should_react(&1));
        assert!(!effect.should_react(&2));
        assert!(effect.handle(1, dispatcher).await.is_ok());

        let seen = collected
            .0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        assert_eq!(seen, vec![2, 3]);
    }

    #[tokio::test]
    async fn closure_effect_reports_failures() {
        let effect = effect_fn(
            |_: &u32| true,
            |_: u32, _: Arc<dyn Dispatcher<u32>>| async move { Err::<(), BoxError>("boom".into()) },
        );
        let dispatcher: Arc<dyn Dispatcher<u32>> = Arc::new(Collect::default());

        let result = effect.handle(7, dispatcher).await;

        assert_eq!(result.map_err(|e| e.to_string()), Err("boom".to_string()));
    }
}
