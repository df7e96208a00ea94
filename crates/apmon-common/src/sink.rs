//! The registration seam between samplers and whatever stores their values.

use std::sync::Arc;

/// Callback that records one data point for a previously registered metric.
pub type Recorder = Arc<dyn Fn(f64) + Send + Sync>;

/// A named, multi-sample numeric metric store.
///
/// Samplers call [`MetricSink::register_sampled`] once when they are built
/// and keep the returned [`Recorder`] for the rest of their life. `unit`
/// describes the recorded values (e.g. `"MiB"`, `"ms"`) and may be empty.
pub trait MetricSink: Send + Sync {
    fn register_sampled(&self, metric_name: &str, unit: &str) -> Recorder;
}
