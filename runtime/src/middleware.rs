//! Middleware: hooks around every action the store processes.
//!
//! Middleware is the extension point for cross-cutting tools such as loggers,
//! state inspectors and routing integration. Every hook has a default, so an
//! implementation only overrides the ones it cares about.
//!
//! # Hook order
//!
//! For each action taken off the queue:
//!
//! 1. [`Middleware::may_dispatch`] on every middleware, registration order.
//!    The first `false` drops the action.
//! 2. [`Middleware::before_dispatch`], registration order.
//! 3. Every feature folds the action.
//! 4. [`Middleware::after_dispatch`], reverse registration order.
//!
//! # Example
//!
//! ```ignore
//! struct Logger;
//!
//! impl Middleware<AppAction> for Logger {
//!     fn after_dispatch(&self, action: &AppAction) {
//!         tracing::info!(?action, "processed");
//!     }
//! }
//!
//! store.add_middleware(Logger).await?;
//! ```

use crate::store::Store;
use futures::future::BoxFuture;
use statehouse_core::Action;
use std::fmt;

/// Hooks invoked by the store around initialization and dispatch
pub trait Middleware<A: Action>: Send + Sync {
    /// Called once when the store activates, or immediately when added to an
    /// already-activated store.
    ///
    /// Runs while the store is locked. Actions dispatched from here are queued
    /// and processed after every `initialize` has returned; other store calls
    /// fail with [`StoreError::Reentrant`](crate::StoreError::Reentrant).
    fn initialize<'a>(&'a self, store: &'a Store<A>) -> BoxFuture<'a, ()> {
        let _ = store;
        Box::pin(async {})
    }

    /// Called after every middleware has been initialized
    fn after_initialize_all(&self) {}

    /// Return `false` to drop the action before it reaches any feature
    fn may_dispatch(&self, action: &A) -> bool {
        let _ = action;
        true
    }

    /// Called before features see the action
    fn before_dispatch(&self, action: &A) {
        let _ = action;
    }

    /// Called after every feature has folded the action
    fn after_dispatch(&self, action: &A) {
        let _ = action;
    }

    /// Called when a middleware-change region opens.
    ///
    /// The returned handle is released when the outermost region ends. Use
    /// [`MiddlewareChange::on_end`] to run code at that point.
    fn begin_internal_middleware_change(&self) -> MiddlewareChange {
        MiddlewareChange::none()
    }

    /// Bootstrap script contributed to [`Store::initialize`]
    fn client_script(&self) -> Option<String> {
        None
    }

    /// Name used in logs and in the bootstrap script header
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Handle returned by [`Middleware::begin_internal_middleware_change`].
///
/// Holds the optional callback to run when the change ends. Dropping a handle
/// the store did not release (because the region was nested inside another
/// one) discards the callback without running it.
#[must_use = "the store releases this handle when the change region ends"]
pub struct MiddlewareChange {
    on_end: Option<Box<dyn FnOnce() + Send>>,
}

impl MiddlewareChange {
    /// A handle with nothing to do on release
    pub const fn none() -> Self {
        Self { on_end: None }
    }

    /// A handle that runs `f` when the change region ends
    pub fn on_end<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            on_end: Some(Box::new(f)),
        }
    }

    /// Run the end callback, if any
    pub(crate) fn release(mut self) {
        if let Some(f) = self.on_end.take() {
            f();
        }
    }
}

impl Default for MiddlewareChange {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Debug for MiddlewareChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChange")
            .field("has_end_hook", &self.on_end.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Debug)]
    struct Ping;

    impl From<statehouse_core::StoreInitialized> for Ping {
        fn from(_: statehouse_core::StoreInitialized) -> Self {
            Self
        }
    }

    struct Silent;

    impl Middleware<Ping> for Silent {}

    #[test]
    fn default_hooks_allow_everything() {
        let middleware = Silent;

        assert!(middleware.may_dispatch(&Ping));
        assert!(middleware.client_script().is_none());
        assert!(middleware.name().ends_with("Silent"));
    }

    #[test]
    fn release_runs_end_hook_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        MiddlewareChange::on_end(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .release();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_unreleased_handle_skips_end_hook() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let change = MiddlewareChange::on_end(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(change);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(format!("{:?}", MiddlewareChange::none()).contains("false"));
    }
}
