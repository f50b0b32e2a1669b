use dbm_async_core::jobs::{HealthEvent, MetricSink};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMetric {
    pub name: String,
    pub value: f64,
    pub tags: Vec<String>,
}

/// In-memory sink standing in for the check's aggregator
#[derive(Debug, Default)]
pub struct RecordingSink {
    counts: Mutex<Vec<RecordedMetric>>,
    histograms: Mutex<Vec<RecordedMetric>>,
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingSink {
    pub fn counts_named(&self, name: &str) -> Vec<RecordedMetric> {
        self.counts
            .lock()
            .iter()
            .filter(|metric| metric.name == name)
            .cloned()
            .collect()
    }

    pub fn histograms_named(&self, name: &str) -> Vec<RecordedMetric> {
        self.histograms
            .lock()
            .iter()
            .filter(|metric| metric.name == name)
            .cloned()
            .collect()
    }

    pub fn health_events(&self) -> Vec<HealthEvent> {
        self.events.lock().clone()
    }
}

impl MetricSink for RecordingSink {
    fn count(&self, name: &str, value: u64, tags: &[String]) {
        self.counts.lock().push(RecordedMetric {
            name: name.to_string(),
            value: value as f64,
            tags: tags.to_vec(),
        });
    }

    fn histogram(&self, name: &str, value: f64, tags: &[String]) {
        self.histograms.lock().push(RecordedMetric {
            name: name.to_string(),
            value,
            tags: tags.to_vec(),
        });
    }

    fn health_event(&self, event: &HealthEvent) {
        self.events.lock().push(event.clone());
    }
}
