use apmon_common::sink::{MetricSink, Recorder};
use apmon_common::types::MetricDataPoint;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Bounded FIFO of data points; the oldest point is dropped on overflow.
pub struct MetricBuffer {
    buffer: VecDeque<MetricDataPoint>,
    max_size: usize,
    dropped: u64,
}

impl MetricBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(max_size),
            max_size,
            dropped: 0,
        }
    }

    pub fn push(&mut self, point: MetricDataPoint) {
        if self.buffer.len() >= self.max_size {
            self.buffer.pop_front();
            self.dropped += 1;
        }
        self.buffer.push_back(point);
    }

    pub fn drain_all(&mut self) -> Vec<MetricDataPoint> {
        self.buffer.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Points discarded since the last call, reset on read.
    pub fn take_dropped(&mut self) -> u64 {
        std::mem::take(&mut self.dropped)
    }
}

/// The agent's metric sink: every recorder appends to one shared buffer.
#[derive(Clone)]
pub struct SharedBuffer {
    agent_id: Arc<str>,
    inner: Arc<Mutex<MetricBuffer>>,
}

impl SharedBuffer {
    pub fn new(agent_id: &str, max_size: usize) -> Self {
        Self {
            agent_id: Arc::from(agent_id),
            inner: Arc::new(Mutex::new(MetricBuffer::new(max_size))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MetricBuffer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Empties the buffer, returning the points and how many were dropped
    /// since the previous drain.
    pub fn drain_all(&self) -> (Vec<MetricDataPoint>, u64) {
        let mut buf = self.lock();
        let dropped = buf.take_dropped();
        (buf.drain_all(), dropped)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}

impl MetricSink for SharedBuffer {
    fn register_sampled(&self, metric_name: &str, unit: &str) -> Recorder {
        let buffer = self.clone();
        let metric_name = metric_name.to_string();
        let mut labels = HashMap::new();
        if !unit.is_empty() {
            labels.insert("unit".to_string(), unit.to_string());
        }
        Arc::new(move |value| {
            let point = MetricDataPoint::new(&buffer.agent_id, &metric_name, value)
                .with_labels(labels.clone());
            buffer.lock().push(point);
        })
    }
}
