//! Off-request-path telemetry.
//!
//! Captures are queued by the interceptor and turned into shipped records by
//! a fixed pool of workers (see [`queue`]). Anything that goes wrong there is
//! described by a [`TelemetryFault`] and handed to an [`ErrorSink`]; it never
//! reaches the caller of the intercepted request.

pub mod queue;

use thiserror::Error;
use tracing::{error, warn};

pub use queue::{TelemetryProcessor, TelemetryQueue};

/// A failure inside the telemetry pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryFault {
    #[error("telemetry task panicked: {0}")]
    Panicked(String),

    /// The record could not be sanitized and was dropped.
    #[error("sanitize record: {0}")]
    Sanitize(String),

    #[error("ship records: {0}")]
    Delivery(String),

    /// The queue was full; the capture for this URL was dropped.
    #[error("telemetry queue full, dropped capture for {0}")]
    QueueFull(String),
}

/// Receives telemetry faults.
pub trait ErrorSink: Send + Sync {
    fn report(&self, fault: &TelemetryFault);
}

/// Logs faults through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, fault: &TelemetryFault) {
        match fault {
            TelemetryFault::Panicked(_) => error!("{}", fault),
            _ => warn!("{}", fault),
        }
    }
}
