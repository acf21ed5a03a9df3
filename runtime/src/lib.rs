//! # Statehouse Runtime
//!
//! The dispatch orchestration engine for the Statehouse state container.
//!
//! This crate provides the [`Store`] that owns the feature registry, the
//! middleware chain, the effect list and the pending-action queue, and that
//! drives every dispatched action through the pipeline.
//!
//! ## Core Components
//!
//! - **Store**: Serialized dispatch through a single async lock
//! - **Middleware**: Veto / before / after hooks around every action
//! - **Middleware-change regions**: Scoped suppression of dispatch while an
//!   external batch replaces state (time travel, back/forward navigation)
//! - **Initialization strategies**: Two-phase activation once the host is ready
//!
//! ## Pipeline
//!
//! ```text
//! dispatch(action)
//!    │
//!    ▼
//! ┌────────────────┐   suppressed?  ──► dropped
//! │  pending queue │   not active?  ──► stays queued
//! └───────┬────────┘
//!         │ drain (FIFO)
//!         ▼
//! may_dispatch (all middleware) ──► vetoed: dropped
//!         │
//!         ▼
//! before_dispatch (registration order)
//!         │
//!         ▼
//! features fold the action (registration order)
//!         │
//!         ▼
//! after_dispatch (reverse registration order)
//!         │
//!         ▼
//! matching effects spawned ──► may dispatch again
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use statehouse_runtime::{ImmediateInitialization, Store};
//!
//! let store: Store<AppAction> = Store::new(ImmediateInitialization);
//! store.add_feature(counter_feature.clone()).await?;
//! store.initialize().await?;
//! store.initialized().await;
//!
//! store.dispatch(AppAction::Increment).await;
//! assert_eq!(*counter_feature.state(), 1);
//! ```

/// Backoff schedule used while waiting for the host
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

/// Middleware trait and change handles
pub mod middleware;

/// Store runtime
pub mod store;

/// Initialization strategies and the activation callback
pub mod strategy;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// A feature with the same (case-insensitive) name is already registered
        ///
        /// The registry is left unchanged.
        #[error("A feature named '{0}' is already registered")]
        DuplicateFeatureName(String),

        /// The middleware-change guard has already been ended
        #[error("Middleware change has already been ended")]
        Disposed,

        /// The store was called from a hook it is currently awaiting
        ///
        /// Middleware `initialize` runs while the store holds its lock.
        /// Dispatching from there is queued; every other store call would
        /// wait on the lock forever and fails with this error instead.
        #[error("Store called from inside its own critical section")]
        Reentrant,
    }

    /// Failures reported by initialization strategies.
    ///
    /// These never reach the store: they are published by the strategy
    /// itself (see [`crate::strategy::InitializationStatus`]).
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum InitializationError {
        /// The host did not report ready before the deadline
        #[error("Store initialization timed out after {attempts} attempts: {last_error}")]
        TimedOut {
            /// Number of probe calls made
            attempts: u32,
            /// The last transient failure observed
            last_error: String,
        },

        /// The readiness probe failed in a way retrying cannot fix
        #[error("Store initialization failed: {0}")]
        Fatal(String),
    }
}

/// Configuration for Store instances
///
/// # Example
///
/// ```
/// use statehouse_runtime::StoreConfig;
///
/// let config = StoreConfig::default()
///     .with_name("checkout")
///     .with_action_logging(false);
///
/// assert_eq!(config.name, "checkout");
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Name recorded on every tracing span emitted by the store
    pub name: String,
    /// Whether processed actions are logged (with their `Debug` output) at debug level
    pub log_actions: bool,
}

impl StoreConfig {
    /// Create a new configuration with custom values
    #[must_use]
    pub fn new(name: impl Into<String>, log_actions: bool) -> Self {
        Self {
            name: name.into(),
            log_actions,
        }
    }

    /// Set the store name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Enable or disable per-action debug logging
    #[must_use]
    pub const fn with_action_logging(mut self, enabled: bool) -> Self {
        self.log_actions = enabled;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "store".to_string(),
            log_actions: true,
        }
    }
}

pub use error::{InitializationError, StoreError};
pub use middleware::{Middleware, MiddlewareChange};
pub use retry::RetryPolicy;
pub use store::{MiddlewareChangeGuard, Store};
pub use strategy::{
    Activation, ImmediateInitialization, InitializationStatus, InitializationStrategy,
    PollingConfig, PollingInitialization, ProbeError, ReadinessProbe,
};
