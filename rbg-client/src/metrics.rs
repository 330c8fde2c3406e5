//! Metrics Aggregator
//!
//! Folds terminal run events into process-wide counters. Completed runs add
//! to the totals and the running average of processing time; failed runs only
//! bump the error counter.

use chrono::{DateTime, Utc};
use rbg_common::events::{ClientEvent, SessionMetrics};
use tracing::debug;

#[derive(Debug)]
pub struct MetricsAggregator {
    metrics: SessionMetrics,
}

impl MetricsAggregator {
    pub fn new(session_start: DateTime<Utc>) -> Self {
        Self {
            metrics: SessionMetrics::new(session_start),
        }
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// Fold one client event; returns `MetricsUpdated` when counters changed
    pub fn fold(&mut self, event: &ClientEvent) -> Option<ClientEvent> {
        match event {
            ClientEvent::RunCompleted {
                result,
                duration_secs,
                ..
            } => {
                let metrics = &mut self.metrics;
                let previous = metrics.total_analyses as f64;
                metrics.total_analyses += 1;
                metrics.positive_detections += result.positive_findings();
                metrics.average_processing_time = (metrics.average_processing_time * previous
                    + duration_secs.max(0.0))
                    / metrics.total_analyses as f64;
            }
            ClientEvent::RunFailed { .. } => {
                self.metrics.errors += 1;
            }
            _ => return None,
        }

        debug!(
            total = self.metrics.total_analyses,
            positives = self.metrics.positive_detections,
            errors = self.metrics.errors,
            "Metrics updated"
        );
        Some(ClientEvent::MetricsUpdated {
            metrics: self.metrics.clone(),
            timestamp: Utc::now(),
        })
    }
}
