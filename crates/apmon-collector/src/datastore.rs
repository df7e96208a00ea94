//! Timing shim for database statement execution.
//!
//! Wrap each statement a driver executes in [`StatementTimer::time`]; the
//! elapsed time lands in `Database/all` and in a per-operation metric such
//! as `Database/select`.

use apmon_common::sink::{MetricSink, Recorder};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

pub const DATABASE_ALL_METRIC: &str = "Database/all";

const MILLIS: &str = "ms";

/// Receives the SQL text and duration of every timed statement.
pub type SqlObserver = Arc<dyn Fn(&str, Duration) + Send + Sync>;

pub struct StatementTimer {
    sink: Arc<dyn MetricSink>,
    all: Recorder,
    by_operation: Mutex<HashMap<&'static str, Recorder>>,
    observer: Option<SqlObserver>,
}

impl StatementTimer {
    pub fn new(sink: Arc<dyn MetricSink>) -> Self {
        let all = sink.register_sampled(DATABASE_ALL_METRIC, MILLIS);
        Self {
            sink,
            all,
            by_operation: Mutex::new(HashMap::new()),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: SqlObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Runs `execute` and records how long it took. Whatever `execute`
    /// returns, including an error, is handed back unchanged.
    pub fn time<R>(&self, sql: &str, execute: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = execute();
        self.record(sql, start.elapsed());
        result
    }

    fn record(&self, sql: &str, elapsed: Duration) {
        let millis = elapsed.as_secs_f64() * 1000.0;
        let operation = statement_operation(sql);
        let recorder = {
            let mut by_operation = self
                .by_operation
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            by_operation
                .entry(operation)
                .or_insert_with(|| {
                    self.sink
                        .register_sampled(&format!("Database/{operation}"), MILLIS)
                })
                .clone()
        };

        (self.all)(millis);
        recorder(millis);
        if let Some(observer) = &self.observer {
            observer(sql, elapsed);
        }
        tracing::trace!(operation, elapsed_ms = millis, "Timed statement");
    }
}

/// Classifies a statement by its leading keyword.
///
/// # Examples
///
/// ```
/// use apmon_collector::datastore::statement_operation;
///
/// assert_eq!(statement_operation("SELECT * FROM users"), "select");
/// assert_eq!(statement_operation("  (select 1)"), "select");
/// assert_eq!(statement_operation("BEGIN"), "other");
/// ```
pub fn statement_operation(sql: &str) -> &'static str {
    let keyword = sql
        .trim_start_matches(|c: char| c == '(' || c.is_whitespace())
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    match keyword.as_str() {
        "select" => "select",
        "insert" => "insert",
        "update" => "update",
        "delete" => "delete",
        _ => "other",
    }
}
