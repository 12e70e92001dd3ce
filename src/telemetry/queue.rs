//! Bounded telemetry queue with a fixed worker pool.
//!
//! Submitting never waits: when the queue is full the newest capture is
//! dropped and reported. Each capture is processed inside its own unwind
//! boundary so a panicking sink or sanitizer only loses that capture.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::interceptor::capture::Exchange;
use crate::sanitize::Sanitizer;
use crate::shipper::RecordShipper;
use crate::telemetry::{ErrorSink, TelemetryFault};

/// Turns one capture into a shipped record.
pub struct TelemetryProcessor {
    sanitizer: Sanitizer,
    shipper: RecordShipper,
    errors: Arc<dyn ErrorSink>,
}

impl TelemetryProcessor {
    /// Sanitize each capture with `sanitizer` and ship it; faults go to `errors`.
    pub fn new(sanitizer: Sanitizer, shipper: RecordShipper, errors: Arc<dyn ErrorSink>) -> Self {
        Self {
            sanitizer,
            shipper,
            errors,
        }
    }

    /// Build, sanitize and ship the record for `exchange`.
    ///
    /// A record that fails sanitization is dropped rather than shipped.
    pub async fn process(&self, exchange: Exchange) {
        let record = exchange.into_record();
        let record = match self.sanitizer.sanitize(record) {
            Ok(record) => record,
            Err(e) => {
                self.errors.report(&TelemetryFault::Sanitize(e.to_string()));
                return;
            }
        };

        if let Err(e) = self.shipper.ship(vec![record]).await {
            self.errors.report(&TelemetryFault::Delivery(e.to_string()));
        }
    }
}

pub struct TelemetryQueue {
    sender: mpsc::Sender<Exchange>,
    workers: Vec<JoinHandle<()>>,
    errors: Arc<dyn ErrorSink>,
}

impl TelemetryQueue {
    /// Spawn `workers` tasks draining a queue of `capacity` captures.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(capacity: usize, workers: usize, processor: TelemetryProcessor) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let errors = Arc::clone(&processor.errors);
        let processor = Arc::new(processor);

        let workers = (0..workers.max(1))
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                let processor = Arc::clone(&processor);
                tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(exchange) = next else { break };

                        let outcome = AssertUnwindSafe(processor.process(exchange))
                            .catch_unwind()
                            .await;
                        if let Err(panic) = outcome {
                            processor
                                .errors
                                .report(&TelemetryFault::Panicked(panic_message(panic.as_ref())));
                        }
                    }
                    debug!(worker = id, "Telemetry worker stopped");
                })
            })
            .collect();

        Self {
            sender,
            workers,
            errors,
        }
    }

    /// Queue a capture. Returns `false` if it was dropped.
    pub fn submit(&self, exchange: Exchange) -> bool {
        match self.sender.try_send(exchange) {
            Ok(()) => true,
            Err(TrySendError::Full(exchange)) => {
                self.errors
                    .report(&TelemetryFault::QueueFull(exchange.uri.to_string()));
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Close the queue and wait for queued captures to be processed.
    pub async fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!("Telemetry worker failed: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for TelemetryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryQueue")
            .field("workers", &self.workers.len())
            .field("available", &self.sender.capacity())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
