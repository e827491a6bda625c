// Circuit breaker Prometheus metrics
//
// Side-effect sink for breaker activity:
// - Probe outcomes and durations
// - Rejections by reason (circuit_open, failing, inaccessible, misconfiguration)
// - Fleet check outcomes

use prometheus::{
    register_histogram, register_int_counter_vec, Histogram, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;

/// Global metrics registry for storage circuit breakers
pub struct BreakerMetrics {
    /// Probes that found the storage accessible
    pub probes_available: IntCounter,

    /// Probes that failed or timed out
    pub probes_unavailable: IntCounter,

    /// Probe duration histogram (in seconds)
    pub probe_duration: Histogram,

    /// Operations rejected by a breaker, by storage and reason
    pub rejections: IntCounterVec,

    /// Fleet checks, by storage and result
    pub checks: IntCounterVec,
}

/// Global singleton instance of metrics
static METRICS: OnceLock<BreakerMetrics> = OnceLock::new();

impl BreakerMetrics {
    /// Initialize and return the global metrics instance
    ///
    /// Subsequent calls return the same instance.
    pub fn global() -> &'static Self {
        METRICS.get_or_init(|| {
            let probes = register_int_counter_vec!(
                "storage_circuit_probes_total",
                "Total number of storage accessibility probes by result",
                &["result"] // available, unavailable
            )
            .expect("Failed to register storage_circuit_probes_total metric");

            let probe_duration = register_histogram!(
                "storage_circuit_probe_duration_seconds",
                "Duration of storage accessibility probes in seconds",
                vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0]
            )
            .expect("Failed to register storage_circuit_probe_duration_seconds metric");

            let rejections = register_int_counter_vec!(
                "storage_circuit_rejections_total",
                "Operations rejected by a storage circuit breaker",
                &["storage", "reason"]
            )
            .expect("Failed to register storage_circuit_rejections_total metric");

            let checks = register_int_counter_vec!(
                "storage_circuit_checks_total",
                "Fleet storage checks by result",
                &["storage", "result"] // success, failure
            )
            .expect("Failed to register storage_circuit_checks_total metric");

            BreakerMetrics {
                probes_available: probes.with_label_values(&["available"]),
                probes_unavailable: probes.with_label_values(&["unavailable"]),
                probe_duration,
                rejections,
                checks,
            }
        })
    }

    pub fn record_probe(&self, available: bool) {
        if available {
            self.probes_available.inc();
        } else {
            self.probes_unavailable.inc();
        }
    }

    pub fn record_rejection(&self, storage: &str, reason: &str) {
        self.rejections.with_label_values(&[storage, reason]).inc();
    }

    pub fn record_check(&self, storage: &str, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.checks.with_label_values(&[storage, result]).inc();
    }

    /// Start timing a probe; the duration is recorded when the timer drops
    pub fn start_probe_timer(&self) -> HistogramTimer {
        HistogramTimer {
            histogram: self.probe_duration.clone(),
            start: std::time::Instant::now(),
        }
    }
}

/// RAII timer for histogram metrics
///
/// Automatically records duration when dropped.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}
