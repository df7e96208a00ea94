use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDataPoint {
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub metric_name: String,
    pub value: f64,
    pub labels: HashMap<String, String>,
}

impl MetricDataPoint {
    pub fn new(agent_id: &str, metric_name: &str, value: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            agent_id: agent_id.to_string(),
            metric_name: metric_name.to_string(),
            value,
            labels: HashMap::new(),
        }
    }

    pub fn with_labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels = labels;
        self
    }
}

/// Running statistics for one metric over a reporting period. Labels are
/// taken from the first point seen.
///
/// # Examples
///
/// ```
/// use apmon_common::types::MetricSummary;
///
/// let mut summary = MetricSummary::new("Memory/Physical");
/// summary.record(2.0);
/// summary.record(4.0);
/// assert_eq!(summary.count, 2);
/// assert_eq!(summary.min, 2.0);
/// assert_eq!(summary.max, 4.0);
/// assert_eq!(summary.mean(), 3.0);
/// assert_eq!(summary.last, 4.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub metric_name: String,
    pub labels: HashMap<String, String>,
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub total: f64,
    pub last: f64,
}

impl MetricSummary {
    pub fn new(metric_name: &str) -> Self {
        Self {
            metric_name: metric_name.to_string(),
            labels: HashMap::new(),
            count: 0,
            min: 0.0,
            max: 0.0,
            total: 0.0,
            last: 0.0,
        }
    }

    pub fn record(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.total += value;
        self.last = value;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }

    /// Groups a batch of points by metric name. The result is sorted by
    /// metric name.
    pub fn from_points(points: &[MetricDataPoint]) -> Vec<MetricSummary> {
        let mut by_name: HashMap<&str, MetricSummary> = HashMap::new();
        for point in points {
            by_name
                .entry(point.metric_name.as_str())
                .or_insert_with(|| MetricSummary {
                    labels: point.labels.clone(),
                    ..MetricSummary::new(&point.metric_name)
                })
                .record(point.value);
        }
        let mut summaries: Vec<MetricSummary> = by_name.into_values().collect();
        summaries.sort_by(|a, b| a.metric_name.cmp(&b.metric_name));
        summaries
    }
}

/// Renders labels as `key=value` pairs in key order, for log lines.
///
/// # Examples
///
/// ```
/// use std::collections::{BTreeMap, HashMap};
/// use apmon_common::types::format_labels;
///
/// let mut labels = HashMap::new();
/// labels.insert("unit".to_string(), "MiB".to_string());
/// labels.insert("sampler".to_string(), "memory".to_string());
/// assert_eq!(format_labels(&labels), "sampler=memory, unit=MiB");
/// ```
pub fn format_labels(labels: &HashMap<String, String>) -> String {
    let ordered: BTreeMap<&str, &str> = labels
        .iter()
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect();
    ordered
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summaries_group_by_metric_name() {
        let points = vec![
            MetricDataPoint::new("web-01", "Memory/Physical", 120.0),
            MetricDataPoint::new("web-01", "Database/all", 3.5),
            MetricDataPoint::new("web-01", "Memory/Physical", 130.0),
        ];

        let summaries = MetricSummary::from_points(&points);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].metric_name, "Database/all");
        assert_eq!(summaries[0].count, 1);
        assert_eq!(summaries[1].metric_name, "Memory/Physical");
        assert_eq!(summaries[1].count, 2);
        assert_eq!(summaries[1].min, 120.0);
        assert_eq!(summaries[1].max, 130.0);
        assert_eq!(summaries[1].last, 130.0);
    }

    #[test]
    fn summaries_carry_labels_of_first_point() {
        let unit = HashMap::from([("unit".to_string(), "MiB".to_string())]);
        let points = vec![
            MetricDataPoint::new("web-01", "Memory/Physical", 120.0).with_labels(unit.clone()),
            MetricDataPoint::new("web-01", "Memory/Physical", 121.0).with_labels(unit.clone()),
        ];

        let summaries = MetricSummary::from_points(&points);
        assert_eq!(summaries[0].labels, unit);
        assert_eq!(format_labels(&summaries[0].labels), "unit=MiB");
    }

    #[test]
    fn empty_summary_has_zero_mean() {
        let summary = MetricSummary::new("Memory/Physical");
        assert_eq!(summary.mean(), 0.0);
        assert!(MetricSummary::from_points(&[]).is_empty());
    }

    #[test]
    fn data_point_serializes_metric_name() {
        let point = MetricDataPoint::new("web-01", "Memory/Physical", 2.0);
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["metric_name"], "Memory/Physical");
        assert_eq!(json["agent_id"], "web-01");
        assert_eq!(json["value"], 2.0);
    }

    #[test]
    fn format_labels_empty_is_empty_string() {
        assert_eq!(format_labels(&HashMap::new()), "");
    }
}
