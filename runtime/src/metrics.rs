//! Prometheus metrics for study operations and the lifecycle sweep.
//!
//! - Mutations (create, update, delete) by outcome
//! - Enrollments (apply, cancel) by outcome
//! - Sweep runs, transitions, per-study failures and duration
//!
//! # Example
//!
//! ```rust,no_run
//! use bookclub_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! if let Some(rendered) = server.render() {
//!     println!("{rendered}");
//! }
//! # Ok(())
//! # }
//! ```

use bookclub_core::{StudyError, StudyState};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

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

/// Prometheus metrics recorder.
///
/// Installs the global recorder and renders the scrape payload for the
/// configured address.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server for `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the scrape payload is published for
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed. An
    /// already installed recorder is tolerated.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0],
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

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "study_mutations_total",
        "Study create, update and delete calls by outcome"
    );
    describe_counter!(
        "study_enrollments_total",
        "Apply and cancel calls by outcome"
    );
    describe_counter!(
        "study_sweep_runs_total",
        "Lifecycle sweep runs by outcome"
    );
    describe_counter!(
        "study_sweep_transitions_total",
        "State transitions applied by the sweep, by target state"
    );
    describe_counter!(
        "study_sweep_failures_total",
        "Studies the sweep failed to process"
    );
    describe_histogram!(
        "study_sweep_duration_seconds",
        "Time taken by one sweep run"
    );
}

/// `ok` for success, the error kind otherwise
#[must_use]
pub fn outcome<T>(result: &Result<T, StudyError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(error) => error.kind().as_str(),
    }
}

/// Study mutation and enrollment metrics recorder.
pub struct StudyMetrics;

impl StudyMetrics {
    /// Record a create/update/delete call.
    pub fn record_mutation(operation: &'static str, outcome: &'static str) {
        counter!("study_mutations_total", "operation" => operation, "outcome" => outcome)
            .increment(1);
    }

    /// Record an apply/cancel call.
    pub fn record_enrollment(operation: &'static str, outcome: &'static str) {
        counter!("study_enrollments_total", "operation" => operation, "outcome" => outcome)
            .increment(1);
    }
}

/// Sweep metrics recorder.
pub struct SweepMetrics;

impl SweepMetrics {
    /// Record a finished or skipped run.
    pub fn record_run(outcome: &'static str, duration: Duration) {
        counter!("study_sweep_runs_total", "outcome" => outcome).increment(1);
        histogram!("study_sweep_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record one applied transition.
    pub fn record_transition(to: StudyState) {
        counter!("study_sweep_transitions_total", "to" => to.as_str()).increment(1);
    }

    /// Record one study the sweep could not process.
    pub fn record_failure() {
        counter!("study_sweep_failures_total").increment(1);
    }
}
