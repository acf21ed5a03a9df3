//! # Statehouse Testing
//!
//! Testing utilities and helpers for the Statehouse state container.
//!
//! This crate provides:
//! - A manually completed initialization strategy
//! - Middleware and effects that record what the store did with them
//! - A Given-When-Then harness for reducers
//! - Helpers for waiting on asynchronous outcomes and for test logging
//!
//! ## Example
//!
//! ```ignore
//! use statehouse_testing::{HookLog, ManualInitialization, RecordingMiddleware};
//! use statehouse_runtime::Store;
//!
//! #[tokio::test]
//! async fn queued_actions_wait_for_activation() {
//!     let init = ManualInitialization::new();
//!     let store = Store::new(init.clone());
//!     let log = HookLog::new();
//!     store.add_middleware(RecordingMiddleware::new("spy", log.clone())).await?;
//!
//!     store.initialize().await?;
//!     store.dispatch(AppAction::Increment).await;
//!     assert!(log.calls().is_empty());
//!
//!     init.complete().await;
//!     assert_eq!(log.actions(Hook::BeforeDispatch).len(), 2);
//! }
//! ```

/// Given-When-Then harness for reducers
pub mod reducer_test;

/// Test doubles for the store's extension points
pub mod mocks {
    use futures::future::BoxFuture;
    use statehouse_core::{Action, Dispatcher, Effect, EffectResult};
    use statehouse_runtime::{Activation, InitializationStrategy, Middleware, MiddlewareChange, Store};
    use std::fmt;
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;
    use tokio::sync::watch;

    /// Strategy that activates only when the test says so
    ///
    /// Clones share the pending activation, so keep one clone and hand the
    /// other to the store.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let init = ManualInitialization::new();
    /// let store: Store<AppAction> = Store::new(init.clone());
    ///
    /// store.initialize().await?;
    /// assert!(init.is_requested());
    ///
    /// init.complete().await;
    /// assert!(store.is_initialized());
    /// ```
    pub struct ManualInitialization<A: Action> {
        pending: Arc<Mutex<Option<Activation<A>>>>,
    }

    impl<A: Action> ManualInitialization<A> {
        /// Create a strategy with no activation pending
        #[must_use]
        pub fn new() -> Self {
            Self {
                pending: Arc::new(Mutex::new(None)),
            }
        }

        /// Whether the store has asked to be activated
        #[must_use]
        pub fn is_requested(&self) -> bool {
            self.pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some()
        }

        /// Activate the store, if it asked to be.
        ///
        /// Returns `false` when `Store::initialize` has not been called yet
        /// (or the activation was already completed).
        pub async fn complete(&self) -> bool {
            let activation = self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();

            match activation {
                Some(activation) => {
                    activation.activate().await;
                    true
                },
                None => false,
            }
        }
    }

    impl<A: Action> InitializationStrategy<A> for ManualInitialization<A> {
        fn initialize(&self, on_ready: Activation<A>) {
            *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(on_ready);
        }
    }

    impl<A: Action> Clone for ManualInitialization<A> {
        fn clone(&self) -> Self {
            Self {
                pending: Arc::clone(&self.pending),
            }
        }
    }

    impl<A: Action> Default for ManualInitialization<A> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<A: Action> fmt::Debug for ManualInitialization<A> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("ManualInitialization")
                .field("requested", &self.is_requested())
                .finish()
        }
    }

    /// Middleware hook recorded by [`RecordingMiddleware`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Hook {
        /// `initialize`
        Initialize,
        /// `after_initialize_all`
        AfterInitializeAll,
        /// `may_dispatch` returned `false`
        Vetoed,
        /// `before_dispatch`
        BeforeDispatch,
        /// `after_dispatch`
        AfterDispatch,
        /// `begin_internal_middleware_change`
        ChangeBegun,
        /// The change handle was released
        ChangeEnded,
    }

    /// One recorded hook invocation
    #[derive(Debug, Clone, PartialEq)]
    pub struct HookCall<A> {
        /// Name of the middleware that recorded the call
        pub middleware: String,
        /// Which hook ran
        pub hook: Hook,
        /// The action, for dispatch hooks
        pub action: Option<A>,
    }

    /// Shared, ordered log of hook calls
    ///
    /// Several middleware can write to one log, which makes cross-middleware
    /// ordering observable.
    pub struct HookLog<A> {
        calls: Arc<Mutex<Vec<HookCall<A>>>>,
    }

    impl<A: Clone> HookLog<A> {
        /// Create an empty log
        #[must_use]
        pub fn new() -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn push(&self, middleware: &str, hook: Hook, action: Option<A>) {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(HookCall {
                    middleware: middleware.to_string(),
                    hook,
                    action,
                });
        }

        /// Every recorded call, oldest first
        #[must_use]
        pub fn calls(&self) -> Vec<HookCall<A>> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// `(middleware, hook)` pairs, oldest first
        #[must_use]
        pub fn sequence(&self) -> Vec<(String, Hook)> {
            self.calls()
                .into_iter()
                .map(|call| (call.middleware, call.hook))
                .collect()
        }

        /// Actions seen by a given hook, across all middleware
        #[must_use]
        pub fn actions(&self, hook: Hook) -> Vec<A> {
            self.calls()
                .into_iter()
                .filter(|call| call.hook == hook)
                .filter_map(|call| call.action)
                .collect()
        }

        /// Number of calls of a given hook
        #[must_use]
        pub fn count(&self, hook: Hook) -> usize {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .filter(|call| call.hook == hook)
                .count()
        }

        /// Forget everything recorded so far
        pub fn clear(&self) {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
    }

    impl<A> Clone for HookLog<A> {
        fn clone(&self) -> Self {
            Self {
                calls: Arc::clone(&self.calls),
            }
        }
    }

    impl<A: Clone> Default for HookLog<A> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<A: fmt::Debug> fmt::Debug for HookLog<A> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_list()
                .entries(self.calls.lock().unwrap_or_else(PoisonError::into_inner).iter())
                .finish()
        }
    }

    type Veto<A> = Arc<dyn Fn(&A) -> bool + Send + Sync>;

    /// Middleware that records every hook call into a [`HookLog`]
    ///
    /// # Example
    ///
    /// ```ignore
    /// let log = HookLog::new();
    /// store
    ///     .add_middleware(
    ///         RecordingMiddleware::new("guard", log.clone())
    ///             .vetoing(|a| matches!(a, AppAction::Forbidden)),
    ///     )
    ///     .await?;
    /// ```
    pub struct RecordingMiddleware<A> {
        name: String,
        log: HookLog<A>,
        veto: Option<Veto<A>>,
        script: Option<String>,
        on_initialize: Vec<A>,
    }

    impl<A: Action> RecordingMiddleware<A> {
        /// Create a middleware that allows everything
        #[must_use]
        pub fn new(name: impl Into<String>, log: HookLog<A>) -> Self {
            Self {
                name: name.into(),
                log,
                veto: None,
                script: None,
                on_initialize: Vec::new(),
            }
        }

        /// Refuse actions matching `predicate`
        #[must_use]
        pub fn vetoing<F>(mut self, predicate: F) -> Self
        where
            F: Fn(&A) -> bool + Send + Sync + 'static,
        {
            self.veto = Some(Arc::new(predicate));
            self
        }

        /// Contribute a bootstrap script
        #[must_use]
        pub fn with_script(mut self, script: impl Into<String>) -> Self {
            self.script = Some(script.into());
            self
        }

        /// Dispatch `action` into the store from `initialize`
        #[must_use]
        pub fn dispatching_on_initialize(mut self, action: A) -> Self {
            self.on_initialize.push(action);
            self
        }
    }

    impl<A: Action> Middleware<A> for RecordingMiddleware<A> {
        fn initialize<'a>(&'a self, store: &'a Store<A>) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                self.log.push(&self.name, Hook::Initialize, None);
                for action in &self.on_initialize {
                    store.dispatch(action.clone()).await;
                }
            })
        }

        fn after_initialize_all(&self) {
            self.log.push(&self.name, Hook::AfterInitializeAll, None);
        }

        fn may_dispatch(&self, action: &A) -> bool {
            let allowed = self.veto.as_ref().is_none_or(|veto| !veto(action));
            if !allowed {
                self.log.push(&self.name, Hook::Vetoed, Some(action.clone()));
            }
            allowed
        }

        fn before_dispatch(&self, action: &A) {
            self.log
                .push(&self.name, Hook::BeforeDispatch, Some(action.clone()));
        }

        fn after_dispatch(&self, action: &A) {
            self.log
                .push(&self.name, Hook::AfterDispatch, Some(action.clone()));
        }

        fn begin_internal_middleware_change(&self) -> MiddlewareChange {
            self.log.push(&self.name, Hook::ChangeBegun, None);
            let log = self.log.clone();
            let name = self.name.clone();
            MiddlewareChange::on_end(move || log.push(&name, Hook::ChangeEnded, None))
        }

        fn client_script(&self) -> Option<String> {
            self.script.clone()
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    impl<A> fmt::Debug for RecordingMiddleware<A> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("RecordingMiddleware")
                .field("name", &self.name)
                .field("vetoes", &self.veto.is_some())
                .finish_non_exhaustive()
        }
    }

    type Predicate<A> = Box<dyn Fn(&A) -> bool + Send + Sync>;

    /// Effect that records the actions it handled and dispatches a fixed
    /// list of follow-up actions for each
    ///
    /// Clones share the record.
    pub struct RecordingEffect<A> {
        predicate: Arc<Predicate<A>>,
        emits: Vec<A>,
        handled: Arc<watch::Sender<Vec<A>>>,
    }

    impl<A: Action> RecordingEffect<A> {
        /// React to actions matching `predicate` without dispatching anything
        #[must_use]
        pub fn new<F>(predicate: F) -> Self
        where
            F: Fn(&A) -> bool + Send + Sync + 'static,
        {
            let (handled, _) = watch::channel(Vec::new());
            Self {
                predicate: Arc::new(Box::new(predicate)),
                emits: Vec::new(),
                handled: Arc::new(handled),
            }
        }

        /// Dispatch `actions`, in order, every time this effect runs
        #[must_use]
        pub fn emitting(mut self, actions: impl IntoIterator<Item = A>) -> Self {
            self.emits.extend(actions);
            self
        }

        /// Actions handled so far, in completion order
        #[must_use]
        pub fn handled(&self) -> Vec<A> {
            self.handled.borrow().clone()
        }

        /// Wait until at least `count` actions have been handled
        ///
        /// # Errors
        ///
        /// Returns [`TestError::Timeout`](crate::TestError::Timeout) if the
        /// effect has not run often enough within `timeout`.
        pub async fn wait_for_count(
            &self,
            count: usize,
            timeout: Duration,
        ) -> Result<Vec<A>, crate::TestError> {
            let mut rx = self.handled.subscribe();
            let waited = tokio::time::timeout(timeout, async {
                rx.wait_for(|handled| handled.len() >= count)
                    .await
                    .map(|handled| handled.clone())
            })
            .await;

            match waited {
                Ok(Ok(handled)) => Ok(handled),
                _ => Err(crate::TestError::Timeout(timeout)),
            }
        }
    }

    impl<A: Action> Effect<A> for RecordingEffect<A> {
        fn should_react(&self, action: &A) -> bool {
            (self.predicate)(action)
        }

        fn handle<'a>(
            &'a self,
            action: A,
            dispatcher: Arc<dyn Dispatcher<A>>,
        ) -> BoxFuture<'a, EffectResult> {
            Box::pin(async move {
                for follow_up in &self.emits {
                    dispatcher.dispatch(follow_up.clone()).await;
                }
                self.handled.send_modify(|handled| handled.push(action));
                Ok(())
            })
        }
    }

    impl<A: Clone> Clone for RecordingEffect<A> {
        fn clone(&self) -> Self {
            Self {
                predicate: Arc::clone(&self.predicate),
                emits: self.emits.clone(),
                handled: Arc::clone(&self.handled),
            }
        }
    }

    impl<A: fmt::Debug> fmt::Debug for RecordingEffect<A> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("RecordingEffect")
                .field("emits", &self.emits)
                .field("handled", &*self.handled.borrow())
                .finish_non_exhaustive()
        }
    }
}

/// Test helpers and utilities
pub mod helpers {
    use crate::TestError;
    use statehouse_core::Feature;
    use std::sync::Arc;
    use std::time::Duration;

    /// Install a `tracing` subscriber that writes through the test harness
    ///
    /// Honours `RUST_LOG`; defaults to `debug` for the statehouse crates.
    /// Safe to call from every test: only the first call installs anything.
    pub fn init_test_tracing() {
        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("statehouse_runtime=debug,statehouse_core=debug")
        });
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    }

    /// Wait until a feature's state satisfies `predicate`
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Timeout`] if the state does not get there within
    /// `timeout`.
    pub async fn wait_for_state<S, A, P>(
        feature: &Feature<S, A>,
        predicate: P,
        timeout: Duration,
    ) -> Result<Arc<S>, TestError>
    where
        S: Send + Sync + 'static,
        A: 'static,
        P: Fn(&S) -> bool,
    {
        let mut rx = feature.subscribe();
        let waited = tokio::time::timeout(timeout, async {
            rx.wait_for(|state| predicate(&**state))
                .await
                .map(|state| Arc::clone(&state))
        })
        .await;

        match waited {
            Ok(Ok(state)) => Ok(state),
            _ => Err(TestError::Timeout(timeout)),
        }
    }
}

/// Errors from test helpers
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TestError {
    /// The awaited condition did not hold in time
    #[error("Condition not met within {0:?}")]
    Timeout(std::time::Duration),
}

// Re-export commonly used items
pub use helpers::{init_test_tracing, wait_for_state};
pub use mocks::{Hook, HookCall, HookLog, ManualInitialization, RecordingEffect, RecordingMiddleware};
pub use reducer_test::ReducerTest;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use statehouse_core::reducer::on;
    use futures::future::BoxFuture;
    use statehouse_core::{AnyFeature, Dispatcher, Feature, StoreInitialized};
    use std::sync::Arc;
    use std::time::Duration;

    struct Discard;

    impl Dispatcher<TestAction> for Discard {
        fn dispatch(&self, _: TestAction) -> BoxFuture<'_, ()> {
            Box::pin(async {})
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    enum TestAction {
        Initialized,
        Bump,
    }

    impl From<StoreInitialized> for TestAction {
        fn from(_: StoreInitialized) -> Self {
            Self::Initialized
        }
    }

    #[test]
    fn hook_log_is_shared_between_clones() {
        let log: HookLog<TestAction> = HookLog::new();
        let middleware = RecordingMiddleware::new("spy", log.clone());

        statehouse_runtime::Middleware::before_dispatch(&middleware, &TestAction::Bump);

        assert_eq!(log.actions(Hook::BeforeDispatch), vec![TestAction::Bump]);
        assert_eq!(log.sequence(), vec![("spy".to_string(), Hook::BeforeDispatch)]);
    }

    #[tokio::test]
    async fn recording_effect_clones_share_the_record() {
        let effect = RecordingEffect::new(|a: &TestAction| matches!(a, TestAction::Bump))
            .emitting([TestAction::Initialized]);
        let observer = effect.clone();
        let dispatcher: Arc<dyn Dispatcher<TestAction>> = Arc::new(Discard);

        statehouse_core::Effect::handle(&effect, TestAction::Bump, dispatcher)
            .await
            .unwrap();

        assert_eq!(observer.handled(), vec![TestAction::Bump]);
        assert_eq!(
            observer.wait_for_count(1, Duration::from_millis(10)).await,
            Ok(vec![TestAction::Bump])
        );
    }

    #[tokio::test]
    async fn manual_initialization_does_nothing_until_requested() {
        let init: ManualInitialization<TestAction> = ManualInitialization::new();

        assert!(!init.is_requested());
        assert!(!init.complete().await);
    }

    #[tokio::test]
    async fn wait_for_state_returns_matching_state() {
        let feature: Feature<u32, TestAction> = Feature::new("bumps", 0).with_reducer(on(
            |a: &TestAction| matches!(a, TestAction::Bump),
            |n: &u32, _: &TestAction| n + 1,
        ));
        feature.receive_dispatch_notification(&TestAction::Bump);

        let state = wait_for_state(&feature, |n| *n == 1, Duration::from_millis(50))
            .await
            .unwrap();

        assert_eq!(*state, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_state_times_out() {
        let feature: Feature<u32, TestAction> = Feature::new("idle", 0);

        let result = wait_for_state(&feature, |n| *n > 0, Duration::from_secs(1)).await;

        assert_eq!(result, Err(TestError::Timeout(Duration::from_secs(1))));
    }
}
