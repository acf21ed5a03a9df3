//! The store: feature registry, middleware chain and dispatch pipeline.
//!
//! # Concurrency
//!
//! All mutable store state lives behind one [`tokio::sync::Mutex`].
//! Registration, dispatch, activation and middleware-change regions all take
//! it, so actions are processed strictly one at a time, in the order they were
//! queued. Waiting for the lock suspends the calling task; no thread ever
//! blocks.
//!
//! Effects run on their own spawned tasks and never under the lock. Their
//! follow-up dispatches simply queue behind whatever is being processed.
//!
//! # Reentrancy
//!
//! Middleware `initialize` hooks are awaited while the lock is held. The
//! store marks that region with a task-local; a dispatch issued from inside it
//! goes to an inbox that is folded into the queue before the next drain, and
//! every other store call fails with [`StoreError::Reentrant`].

use crate::StoreConfig;
use crate::error::StoreError;
use crate::metrics::{EffectMetrics, StoreMetrics};
use crate::middleware::{Middleware, MiddlewareChange};
use crate::strategy::{Activation, InitializationStrategy};
use futures::FutureExt;
use futures::future::BoxFuture;
use statehouse_core::{Action, AnyFeature, Dispatcher, Effect, StoreInitialized};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Instant;
use tokio::sync::{Mutex, MutexGuard, watch};
use tracing::Instrument;

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    /// Id of the store whose lock the current task holds while awaiting
    /// middleware hooks
    static CRITICAL_SECTION: u64;
}

/// Everything guarded by the store lock
struct StoreState<A: Action> {
    features: Vec<Arc<dyn AnyFeature<A>>>,
    middlewares: Vec<Arc<dyn Middleware<A>>>,
    /// Same middleware, newest first (after-dispatch order)
    reversed_middlewares: Vec<Arc<dyn Middleware<A>>>,
    effects: Vec<Arc<dyn Effect<A>>>,
    queue: VecDeque<A>,
    activated: bool,
    draining: bool,
    change_depth: usize,
}

impl<A: Action> StoreState<A> {
    fn new() -> Self {
        let mut queue = VecDeque::new();
        queue.push_back(A::from(StoreInitialized));
        Self {
            features: Vec::new(),
            middlewares: Vec::new(),
            reversed_middlewares: Vec::new(),
            effects: Vec::new(),
            queue,
            activated: false,
            draining: false,
            change_depth: 0,
        }
    }

    /// Close one middleware-change region.
    ///
    /// Only the region that brings the depth back to zero releases its
    /// handles; handles of inner regions are discarded.
    fn end_change(&mut self, handles: Vec<MiddlewareChange>) {
        self.change_depth = self.change_depth.saturating_sub(1);
        if self.change_depth == 0 {
            tracing::debug!(handles = handles.len(), "Middleware change ended");
            for handle in handles {
                handle.release();
            }
        } else {
            tracing::trace!(depth = self.change_depth, "Nested middleware change ended");
        }
    }
}

/// Clears the draining flag when the drain loop exits, including by unwinding
/// out of a panicking reducer or hook
struct DrainGuard<'a, A: Action>(&'a mut StoreState<A>);

impl<A: Action> Drop for DrainGuard<'_, A> {
    fn drop(&mut self) {
        self.0.draining = false;
        if std::thread::panicking() {
            tracing::error!(queued = self.0.queue.len(), "Drain aborted by a panic");
        }
    }
}

struct Shared<A: Action> {
    id: u64,
    config: StoreConfig,
    strategy: Box<dyn InitializationStrategy<A>>,
    state: Mutex<StoreState<A>>,
    /// Actions dispatched from inside the critical section
    inbox: StdMutex<VecDeque<A>>,
    initialized: watch::Sender<bool>,
}

/// The state container
///
/// Cheap to clone: clones share the same registry, queue and lock.
///
/// # Type Parameters
///
/// - `A`: The application action type
///
/// # Example
///
/// ```ignore
/// let store: Store<AppAction> = Store::new(ImmediateInitialization);
/// store.add_feature(Arc::clone(&counter)).await?;
/// store.add_middleware(Logger).await?;
///
/// store.initialize().await?;
/// store.initialized().await;
///
/// store.dispatch(AppAction::Increment).await;
/// ```
pub struct Store<A: Action> {
    shared: Arc<Shared<A>>,
}

impl<A: Action> Store<A> {
    /// Create a store with the default configuration.
    ///
    /// The store starts unactivated with [`StoreInitialized`] already queued.
    /// Nothing is processed until the strategy reports the host ready.
    #[must_use]
    pub fn new<S>(strategy: S) -> Self
    where
        S: InitializationStrategy<A> + 'static,
    {
        Self::with_config(strategy, StoreConfig::default())
    }

    /// Create a store with a custom configuration
    #[must_use]
    pub fn with_config<S>(strategy: S, config: StoreConfig) -> Self
    where
        S: InitializationStrategy<A> + 'static,
    {
        let (initialized, _) = watch::channel(false);
        let shared = Shared {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            config,
            strategy: Box::new(strategy),
            state: Mutex::new(StoreState::new()),
            inbox: StdMutex::new(VecDeque::new()),
            initialized,
        };
        tracing::debug!(store = %shared.config.name, "Store created");
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Store configuration
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    fn in_critical_section(&self) -> bool {
        CRITICAL_SECTION
            .try_with(|id| *id == self.shared.id)
            .unwrap_or(false)
    }

    async fn lock(&self) -> Result<MutexGuard<'_, StoreState<A>>, StoreError> {
        if self.in_critical_section() {
            tracing::warn!(store = %self.shared.config.name, "Store called from its own critical section");
            return Err(StoreError::Reentrant);
        }
        Ok(self.shared.state.lock().await)
    }

    /// Register a feature.
    ///
    /// The feature sees every action processed from now on. Names are unique
    /// ignoring case.
    ///
    /// # Errors
    ///
    /// - [`StoreError::DuplicateFeatureName`]: a feature with the same name is
    ///   already registered (the registry is unchanged)
    /// - [`StoreError::Reentrant`]: called from a middleware `initialize` hook
    pub async fn add_feature<F>(&self, feature: Arc<F>) -> Result<(), StoreError>
    where
        F: AnyFeature<A> + 'static,
    {
        let mut state = self.lock().await?;
        let key = feature.name().to_lowercase();
        if state
            .features
            .iter()
            .any(|existing| existing.name().to_lowercase() == key)
        {
            tracing::warn!(feature = feature.name(), "Rejected duplicate feature");
            return Err(StoreError::DuplicateFeatureName(feature.name().to_string()));
        }
        tracing::debug!(feature = feature.name(), "Feature registered");
        state.features.push(feature);
        Ok(())
    }

    /// Register an effect
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Reentrant`] if called from a middleware
    /// `initialize` hook.
    pub async fn add_effect<E>(&self, effect: E) -> Result<(), StoreError>
    where
        E: Effect<A> + 'static,
    {
        let mut state = self.lock().await?;
        state.effects.push(Arc::new(effect));
        tracing::debug!(effects = state.effects.len(), "Effect registered");
        Ok(())
    }

    /// Register a middleware.
    ///
    /// On an already-activated store the middleware is initialized (and its
    /// `after_initialize_all` hook called) before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Reentrant`] if called from a middleware
    /// `initialize` hook.
    pub async fn add_middleware<M>(&self, middleware: M) -> Result<(), StoreError>
    where
        M: Middleware<A> + 'static,
    {
        let middleware: Arc<dyn Middleware<A>> = Arc::new(middleware);
        let mut state = self.lock().await?;
        state.middlewares.push(Arc::clone(&middleware));
        state.reversed_middlewares.insert(0, Arc::clone(&middleware));
        tracing::debug!(middleware = middleware.name(), "Middleware registered");

        if state.activated {
            CRITICAL_SECTION
                .scope(self.shared.id, middleware.initialize(self))
                .await;
            middleware.after_initialize_all();
            self.absorb_inbox(&mut state);
            self.drain(&mut state);
        }
        Ok(())
    }

    /// Look up a registered feature by name (ignoring case)
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Reentrant`] if called from a middleware
    /// `initialize` hook.
    pub async fn feature(&self, name: &str) -> Result<Option<Arc<dyn AnyFeature<A>>>, StoreError> {
        let key = name.to_lowercase();
        let state = self.lock().await?;
        Ok(state
            .features
            .iter()
            .find(|feature| feature.name().to_lowercase() == key)
            .cloned())
    }

    /// Names of the registered features, in registration order
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Reentrant`] if called from a middleware
    /// `initialize` hook.
    pub async fn feature_names(&self) -> Result<Vec<String>, StoreError> {
        let state = self.lock().await?;
        Ok(state
            .features
            .iter()
            .map(|feature| feature.name().to_string())
            .collect())
    }

    /// Dispatch an action.
    ///
    /// Before activation the action is queued. After activation every queued
    /// action is processed before this returns, unless another caller is
    /// already draining. Inside a middleware-change region the action is
    /// dropped.
    #[tracing::instrument(skip(self, action), name = "store_dispatch", fields(store = %self.shared.config.name))]
    pub async fn dispatch(&self, action: A) {
        StoreMetrics::record_dispatched();

        if self.in_critical_section() {
            tracing::trace!("Dispatched from critical section, deferring to next drain");
            self.push_inbox(action);
            return;
        }

        let mut state = self.shared.state.lock().await;
        if state.change_depth > 0 {
            tracing::debug!(depth = state.change_depth, "Dispatch suppressed during middleware change");
            StoreMetrics::record_suppressed();
            return;
        }

        state.queue.push_back(action);
        if !state.activated {
            tracing::trace!(queued = state.queue.len(), "Store not activated, action queued");
            return;
        }

        self.drain(&mut state);
    }

    fn push_inbox(&self, action: A) {
        self.shared
            .inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(action);
    }

    /// Move critical-section dispatches into the queue
    fn absorb_inbox(&self, state: &mut StoreState<A>) {
        let pending: Vec<A> = self
            .shared
            .inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        for action in pending {
            if state.change_depth > 0 {
                StoreMetrics::record_suppressed();
                continue;
            }
            state.queue.push_back(action);
        }
    }

    /// Process queued actions until the queue is empty
    fn drain(&self, state: &mut StoreState<A>) {
        if state.draining {
            return;
        }
        state.draining = true;
        let mut guard = DrainGuard(state);
        let state = &mut *guard.0;

        let start = Instant::now();
        let mut processed = 0_usize;

        while let Some(action) = state.queue.pop_front() {
            if let Some(veto) = state
                .middlewares
                .iter()
                .find(|middleware| !middleware.may_dispatch(&action))
            {
                tracing::debug!(middleware = veto.name(), "Action vetoed");
                StoreMetrics::record_vetoed();
                continue;
            }

            if self.shared.config.log_actions {
                tracing::debug!(?action, "Processing action");
            }

            for middleware in &state.middlewares {
                middleware.before_dispatch(&action);
            }
            for feature in &state.features {
                feature.receive_dispatch_notification(&action);
            }
            for middleware in &state.reversed_middlewares {
                middleware.after_dispatch(&action);
            }

            self.trigger_effects(&state.effects, &action);
            processed += 1;
        }

        drop(guard);
        StoreMetrics::record_drain(processed, start.elapsed());
        tracing::trace!(processed, "Drain completed");
    }

    /// Spawn every effect that reacts to `action`
    fn trigger_effects(&self, effects: &[Arc<dyn Effect<A>>], action: &A) {
        for effect in effects.iter().filter(|effect| effect.should_react(action)) {
            EffectMetrics::record_triggered();

            let effect = Arc::clone(effect);
            let action = action.clone();
            let dispatcher: Arc<dyn Dispatcher<A>> = Arc::new(self.clone());
            let span = tracing::debug_span!("effect", store = %self.shared.config.name);

            tokio::spawn(
                async move {
                    match AssertUnwindSafe(effect.handle(action, dispatcher))
                        .catch_unwind()
                        .await
                    {
                        Ok(Ok(())) => tracing::trace!("Effect completed"),
                        Ok(Err(error)) => {
                            tracing::warn!(%error, "Effect failed");
                            EffectMetrics::record_failure();
                        },
                        Err(_) => {
                            tracing::error!("Effect panicked");
                            EffectMetrics::record_failure();
                        },
                    }
                }
                .instrument(span),
            );
        }
    }

    /// Open a middleware-change region.
    ///
    /// Until the returned guard ends, [`Store::dispatch`] is a no-op. Regions
    /// nest; middleware is told the change is over only when the outermost
    /// one ends.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Reentrant`] if called from a middleware
    /// `initialize` hook.
    pub async fn begin_internal_middleware_change(
        &self,
    ) -> Result<MiddlewareChangeGuard<A>, StoreError> {
        let mut state = self.lock().await?;
        state.change_depth += 1;
        tracing::debug!(depth = state.change_depth, "Middleware change started");

        let handles = state
            .middlewares
            .iter()
            .map(|middleware| middleware.begin_internal_middleware_change())
            .collect();

        Ok(MiddlewareChangeGuard {
            store: self.clone(),
            handles,
            ended: false,
        })
    }

    /// Run `f` inside a middleware-change region.
    ///
    /// The region ends when `f` completes. If the returned future is dropped
    /// early the region still ends (see [`MiddlewareChangeGuard`]).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Reentrant`] if called from a middleware
    /// `initialize` hook.
    pub async fn with_internal_middleware_change<F, Fut, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut guard = self.begin_internal_middleware_change().await?;
        let output = f().await;
        guard.end().await?;
        Ok(output)
    }

    /// Whether a middleware-change region is open
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Reentrant`] if called from a middleware
    /// `initialize` hook.
    pub async fn is_inside_middleware_change(&self) -> Result<bool, StoreError> {
        Ok(self.lock().await?.change_depth > 0)
    }

    /// Hand the store to its initialization strategy.
    ///
    /// Returns the bootstrap script contributed by middleware (an empty string
    /// if the store is already activated). Activation itself happens whenever
    /// the strategy decides the host is ready; await [`Store::initialized`] to
    /// observe it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Reentrant`] if called from a middleware
    /// `initialize` hook.
    #[tracing::instrument(skip(self), name = "store_initialize", fields(store = %self.shared.config.name))]
    pub async fn initialize(&self) -> Result<String, StoreError> {
        let script = {
            let state = self.lock().await?;
            if state.activated {
                tracing::debug!("Store already activated");
                return Ok(String::new());
            }
            state
                .middlewares
                .iter()
                .filter_map(|middleware| {
                    middleware.client_script().map(|script| {
                        format!("// Middleware scripts: {}\n{script}\n", middleware.name())
                    })
                })
                .collect::<String>()
        };

        self.shared.strategy.initialize(Activation::new(self.clone()));
        Ok(script)
    }

    /// Activate the store: initialize middleware, then process everything
    /// queued since construction.
    pub(crate) async fn activate(&self) {
        let Ok(mut state) = self.lock().await else {
            tracing::error!("Activation requested from inside the store's critical section");
            return;
        };
        if state.activated {
            tracing::trace!("Store already activated");
            return;
        }
        state.activated = true;
        tracing::info!(
            store = %self.shared.config.name,
            features = state.features.len(),
            middlewares = state.middlewares.len(),
            queued = state.queue.len(),
            "Activating store"
        );

        let middlewares = state.middlewares.clone();
        for middleware in &middlewares {
            CRITICAL_SECTION
                .scope(self.shared.id, middleware.initialize(self))
                .await;
        }
        for middleware in &middlewares {
            middleware.after_initialize_all();
        }

        self.absorb_inbox(&mut state);
        self.drain(&mut state);

        self.shared.initialized.send_replace(true);
        StoreMetrics::record_activation();
    }

    /// Wait until the store has been activated
    pub async fn initialized(&self) {
        let mut ready = self.shared.initialized.subscribe();
        // The sender lives as long as the store, so this only returns once set
        let _ = ready.wait_for(|activated| *activated).await;
    }

    /// Whether the store has been activated
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        *self.shared.initialized.borrow()
    }
}

impl<A: Action> Clone for Store<A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A: Action> Dispatcher<A> for Store<A> {
    fn dispatch(&self, action: A) -> BoxFuture<'_, ()> {
        Box::pin(Self::dispatch(self, action))
    }
}

impl<A: Action> fmt::Debug for Store<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.shared.config.name)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

/// An open middleware-change region.
///
/// Returned by [`Store::begin_internal_middleware_change`]. Call
/// [`MiddlewareChangeGuard::end`] to close it. A guard dropped without being
/// ended closes its region on a spawned task.
#[must_use = "dispatch stays suppressed until the guard is ended or dropped"]
pub struct MiddlewareChangeGuard<A: Action> {
    store: Store<A>,
    handles: Vec<MiddlewareChange>,
    ended: bool,
}

impl<A: Action> MiddlewareChangeGuard<A> {
    /// Close the region.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Disposed`]: the guard was already ended
    /// - [`StoreError::Reentrant`]: called from a middleware `initialize` hook
    pub async fn end(&mut self) -> Result<(), StoreError> {
        if self.ended {
            return Err(StoreError::Disposed);
        }
        let mut state = self.store.lock().await?;
        self.ended = true;
        state.end_change(std::mem::take(&mut self.handles));
        Ok(())
    }

    /// Whether [`MiddlewareChangeGuard::end`] has completed
    #[must_use]
    pub const fn is_ended(&self) -> bool {
        self.ended
    }
}

impl<A: Action> Drop for MiddlewareChangeGuard<A> {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;

        let shared = Arc::clone(&self.store.shared);
        let handles = std::mem::take(&mut self.handles);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let mut state = shared.state.lock().await;
                    tracing::debug!(store = %shared.config.name, "Ending middleware change of dropped guard");
                    state.end_change(handles);
                });
            },
            Err(_) => {
                tracing::error!(
                    store = %self.store.shared.config.name,
                    "Middleware change guard dropped outside a tokio runtime, dispatch stays suppressed"
                );
            },
        }
    }
}

impl<A: Action> fmt::Debug for MiddlewareChangeGuard<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChangeGuard")
            .field("store", &self.store.shared.config.name)
            .field("handles", &self.handles.len())
            .field("ended", &self.ended)
            .finish()
    }
}
