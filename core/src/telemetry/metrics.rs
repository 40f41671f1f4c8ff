use std::sync::Mutex;

/// Counters shared by the acquisition and transmit tasks.
pub struct StreamMetrics {
    inner: Mutex<MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_processed: u64,
    pub read_errors: u64,
    pub records_dropped: u64,
    pub packets_sent: u64,
    pub send_errors: u64,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    pub fn record_frame(&self, dropped_records: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.frames_processed += 1;
            metrics.records_dropped += dropped_records as u64;
        }
    }

    pub fn record_read_error(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.read_errors += 1;
        }
    }

    pub fn record_sent(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.packets_sent += 1;
        }
    }

    pub fn record_send_error(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.send_errors += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            MetricsSnapshot::default()
        }
    }
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}
