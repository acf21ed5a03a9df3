//! Initialization strategies: deciding when the host is ready.
//!
//! A store queues every action until it is activated. Activation is not the
//! store's decision: [`Store::initialize`](crate::Store::initialize) hands an
//! [`Activation`] to the configured [`InitializationStrategy`], which consumes
//! it once the host environment can take part in dispatch (for example once a
//! browser page has finished loading and its script bridge answers).
//!
//! Two strategies ship with the runtime:
//!
//! - [`ImmediateInitialization`]: activate at once (headless hosts, tests)
//! - [`PollingInitialization`]: poll a [`ReadinessProbe`] until it reports
//!   ready, with a deadline and backoff between rounds

use crate::error::InitializationError;
use crate::metrics::InitializationMetrics;
use crate::retry::RetryPolicy;
use crate::store::Store;
use futures::future::BoxFuture;
use statehouse_core::Action;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

/// Decides when a store may activate
pub trait InitializationStrategy<A: Action>: Send + Sync {
    /// Called by [`Store::initialize`](crate::Store::initialize).
    ///
    /// Await [`Activation::activate`] once the host is ready. Never
    /// activating leaves the store queueing actions forever; failures are the
    /// strategy's to report.
    fn initialize(&self, on_ready: Activation<A>);
}

/// One-shot callback that activates a store
#[must_use = "the store never processes actions unless activate is awaited"]
pub struct Activation<A: Action> {
    store: Store<A>,
}

impl<A: Action> Activation<A> {
    pub(crate) const fn new(store: Store<A>) -> Self {
        Self { store }
    }

    /// Activate the store.
    ///
    /// Initializes every middleware, then processes all actions queued since
    /// the store was created. Does nothing if the store is already active.
    pub async fn activate(self) {
        self.store.activate().await;
    }
}

impl<A: Action> fmt::Debug for Activation<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activation")
            .field("store", &self.store)
            .finish()
    }
}

/// Activates as soon as the store is initialized
///
/// Activation runs on a spawned task, so `Store::initialize` must be called
/// from within a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateInitialization;

impl<A: Action> InitializationStrategy<A> for ImmediateInitialization {
    fn initialize(&self, on_ready: Activation<A>) {
        tokio::spawn(on_ready.activate());
    }
}

/// Failures a [`ReadinessProbe`] can report
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The host is reachable but not ready yet; keep polling until the deadline
    #[error("Host not ready: {0}")]
    Transient(String),

    /// The host cannot take part at all (e.g. it is pre-rendering); stop
    /// quietly without activating
    #[error("Host unavailable")]
    Unavailable,

    /// Retrying cannot help; stop and report
    #[error("Readiness probe failed: {0}")]
    Fatal(String),
}

/// Asks the host whether it is ready
///
/// Implemented for any `Fn() -> impl Future<Output = Result<bool, ProbeError>>`.
pub trait ReadinessProbe: Send + Sync {
    /// `Ok(true)` when ready, `Ok(false)` or a transient error to retry
    fn probe(&self) -> BoxFuture<'_, Result<bool, ProbeError>>;
}

impl<F, Fut> ReadinessProbe for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, ProbeError>> + Send + 'static,
{
    fn probe(&self) -> BoxFuture<'_, Result<bool, ProbeError>> {
        Box::pin(self())
    }
}

/// Outcome of a [`PollingInitialization`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitializationStatus {
    /// Still polling (or not started)
    Pending,
    /// The host reported ready and the store has been activated
    Ready,
    /// The host is unavailable; the store was left unactivated
    Skipped,
    /// Polling gave up
    Failed(InitializationError),
}

impl InitializationStatus {
    /// Whether polling has finished
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Polling configuration
///
/// # Default Values
///
/// - `immediate_attempts`: 2 (a second back-to-back attempt often succeeds)
/// - `hard_fail_after`: 1 second
/// - `retry_policy`: [`RetryPolicy::default`]
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Probe calls per round, without pausing in between
    pub immediate_attempts: u32,
    /// Give up once a round ends after this much time has passed
    pub hard_fail_after: Duration,
    /// Pause between rounds
    pub retry_policy: RetryPolicy,
}

impl PollingConfig {
    /// Set the number of probe calls per round
    #[must_use]
    pub const fn with_immediate_attempts(mut self, attempts: u32) -> Self {
        self.immediate_attempts = attempts;
        self
    }

    /// Set the deadline
    #[must_use]
    pub const fn with_hard_fail_after(mut self, deadline: Duration) -> Self {
        self.hard_fail_after = deadline;
        self
    }

    /// Set the backoff between rounds
    #[must_use]
    pub const fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            immediate_attempts: 2,
            hard_fail_after: Duration::from_secs(1),
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Activates once a [`ReadinessProbe`] reports the host ready
///
/// Polling runs on a spawned task. Its outcome is logged and published
/// through [`PollingInitialization::status`].
pub struct PollingInitialization<P> {
    probe: Arc<P>,
    config: PollingConfig,
    status: Arc<watch::Sender<InitializationStatus>>,
}

impl<P: ReadinessProbe + 'static> PollingInitialization<P> {
    /// Create a strategy with the default [`PollingConfig`]
    #[must_use]
    pub fn new(probe: P) -> Self {
        Self::with_config(probe, PollingConfig::default())
    }

    /// Create a strategy with a custom configuration
    #[must_use]
    pub fn with_config(probe: P, config: PollingConfig) -> Self {
        let (status, _) = watch::channel(InitializationStatus::Pending);
        Self {
            probe: Arc::new(probe),
            config,
            status: Arc::new(status),
        }
    }

    /// Subscribe to the polling outcome
    #[must_use]
    pub fn status(&self) -> watch::Receiver<InitializationStatus> {
        self.status.subscribe()
    }
}

impl<A, P> InitializationStrategy<A> for PollingInitialization<P>
where
    A: Action,
    P: ReadinessProbe + 'static,
{
    fn initialize(&self, on_ready: Activation<A>) {
        let probe = Arc::clone(&self.probe);
        let config = self.config.clone();
        let status = Arc::clone(&self.status);

        tokio::spawn(async move {
            status.send_replace(InitializationStatus::Pending);
            let outcome = wait_until_ready(probe.as_ref(), &config).await;

            match &outcome {
                InitializationStatus::Ready => {
                    tracing::info!("Host ready, activating store");
                    on_ready.activate().await;
                },
                InitializationStatus::Skipped => {
                    tracing::info!("Host unavailable, store left inactive");
                },
                InitializationStatus::Failed(error) => {
                    tracing::error!(%error, "Store initialization failed");
                },
                InitializationStatus::Pending => {},
            }

            status.send_replace(outcome);
        });
    }
}

impl<P> fmt::Debug for PollingInitialization<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingInitialization")
            .field("config", &self.config)
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

/// Poll in rounds until the probe settles or the deadline passes
async fn wait_until_ready<P>(probe: &P, config: &PollingConfig) -> InitializationStatus
where
    P: ReadinessProbe + ?Sized,
{
    let deadline = Instant::now() + config.hard_fail_after;
    let mut attempts = 0_u32;
    let mut last_error = String::from("host reported not ready");

    let mut round = 0_u32;

    loop {
        for _ in 0..config.immediate_attempts.max(1) {
            attempts += 1;
            InitializationMetrics::record_attempt();

            match probe.probe().await {
                Ok(true) => return InitializationStatus::Ready,
                Ok(false) => tracing::trace!(attempts, "Host not ready"),
                Err(ProbeError::Transient(error)) => {
                    tracing::debug!(attempts, %error, "Readiness probe failed, will retry");
                    last_error = error;
                },
                Err(ProbeError::Unavailable) => return InitializationStatus::Skipped,
                Err(ProbeError::Fatal(error)) => {
                    return InitializationStatus::Failed(InitializationError::Fatal(error));
                },
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return InitializationStatus::Failed(InitializationError::TimedOut { attempts, last_error });
        }
        let delay = config.retry_policy.delay_for_attempt(round).min(deadline - now);
        tokio::time::sleep(delay).await;
        round = round.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn polling_defaults_try_twice_for_one_second() {
        let config = PollingConfig::default();

        assert_eq!(config.immediate_attempts, 2);
        assert_eq!(config.hard_fail_after, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn second_immediate_attempt_succeeds_without_pausing() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let probe = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, ProbeError>(n == 1) }
        };
        let start = Instant::now();

        let outcome = wait_until_ready(&probe, &PollingConfig::default()).await;

        assert_eq!(outcome, InitializationStatus::Ready);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_probe_error_stops_at_once() {
        let probe = || async { Err::<bool, _>(ProbeError::Fatal("script error".to_string())) };

        let outcome = wait_until_ready(&probe, &PollingConfig::default()).await;

        assert_eq!(
            outcome,
            InitializationStatus::Failed(InitializationError::Fatal("script error".to_string()))
        );
    }

    #[test]
    fn only_pending_is_unfinished() {
        assert!(!InitializationStatus::Pending.is_finished());
        assert!(InitializationStatus::Ready.is_finished());
        assert!(InitializationStatus::Skipped.is_finished());
    }
}
