use std::sync::Arc;

use tracing::debug;

use crate::collector::{LogSink, LogsEnvelope};
use crate::error::Result;
use crate::record::Record;

/// Wraps sanitized records in an envelope and hands them to a [`LogSink`].
#[derive(Clone)]
pub struct RecordShipper {
    sink: Arc<dyn LogSink>,
    secret_key: String,
}

impl RecordShipper {
    /// Ship through `sink`, tagging each envelope with `secret_key`.
    pub fn new(sink: Arc<dyn LogSink>, secret_key: impl Into<String>) -> Self {
        Self {
            sink,
            secret_key: secret_key.into(),
        }
    }

    /// Deliver `records` in a single shipment. An empty batch is a no-op.
    pub async fn ship(&self, records: Vec<Record>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let count = records.len();
        let envelope = LogsEnvelope::new(&self.secret_key, records);
        self.sink.send_logs(&envelope).await?;
        debug!(records = count, "Shipped records to collector");
        Ok(())
    }
}

impl std::fmt::Debug for RecordShipper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordShipper").finish_non_exhaustive()
    }
}
