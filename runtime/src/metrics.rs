//! Prometheus metrics for observability and monitoring.
//!
//! The store records its metrics through the `metrics` facade, so they cost
//! nothing until a recorder is installed. [`MetricsServer`] installs the
//! Prometheus recorder and renders the current values.
//!
//! Metrics recorded:
//! - Dispatch: dispatched, suppressed, vetoed and processed actions
//! - Drain loop duration
//! - Effects triggered and failed
//! - Activations and readiness probe attempts
//!
//! # Example
//!
//! ```rust,no_run
//! use statehouse_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! if let Some(text) = server.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Holds the Prometheus recorder handle for the address the host exposes
/// metrics on.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address the host serves metrics on (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Describe all store metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the metrics exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), the
    /// existing recorder is kept and this returns `Ok(())` without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Address the metrics are meant to be served on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Dispatch
    describe_counter!(
        "store_actions_dispatched_total",
        "Total number of actions passed to dispatch"
    );
    describe_counter!(
        "store_actions_suppressed_total",
        "Actions dropped because a middleware change was in progress"
    );
    describe_counter!(
        "store_actions_vetoed_total",
        "Actions dropped because a middleware refused them"
    );
    describe_counter!(
        "store_actions_processed_total",
        "Actions delivered to features"
    );
    describe_histogram!(
        "store_drain_duration_seconds",
        "Time taken to drain the pending-action queue"
    );

    // Effects
    describe_counter!(
        "store_effects_triggered_total",
        "Total number of effect handlers started"
    );
    describe_counter!(
        "store_effects_failed_total",
        "Total number of effect handlers that returned an error"
    );

    // Activation
    describe_counter!("store_activations_total", "Total number of store activations");
    describe_counter!(
        "store_initialization_attempts_total",
        "Total number of readiness probe calls"
    );
}

/// Dispatch pipeline metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record an action entering dispatch.
    pub fn record_dispatched() {
        counter!("store_actions_dispatched_total").increment(1);
    }

    /// Record an action dropped inside a middleware change.
    pub fn record_suppressed() {
        counter!("store_actions_suppressed_total").increment(1);
    }

    /// Record an action vetoed by a middleware.
    pub fn record_vetoed() {
        counter!("store_actions_vetoed_total").increment(1);
    }

    /// Record a completed drain.
    pub fn record_drain(processed: usize, duration: Duration) {
        counter!("store_actions_processed_total").increment(processed as u64);
        histogram!("store_drain_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a store activation.
    pub fn record_activation() {
        counter!("store_activations_total").increment(1);
    }
}

/// Effect metrics recorder.
pub struct EffectMetrics;

impl EffectMetrics {
    /// Record an effect handler being started.
    pub fn record_triggered() {
        counter!("store_effects_triggered_total").increment(1);
    }

    /// Record an effect failure.
    pub fn record_failure() {
        counter!("store_effects_failed_total").increment(1);
    }
}

/// Initialization metrics recorder.
pub struct InitializationMetrics;

impl InitializationMetrics {
    /// Record a readiness probe call.
    pub fn record_attempt() {
        counter!("store_initialization_attempts_total").increment(1);
    }
}
