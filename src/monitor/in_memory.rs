//! In-process availability store.
//!
//! Samples live in per-target vectors ordered by arrival. Reads expire
//! old samples in place and evict targets (and whole services) whose
//! tails emptied, so the map never grows past the active window.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{AvailabilityProvider, MetricsRecorder, MonitorError};

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: DateTime<Utc>,
    ok: bool,
}

/// Availability backend holding recent samples in memory.
pub struct InMemoryMetrics {
    samples: Mutex<HashMap<i64, HashMap<String, Vec<Sample>>>>,
    empty_availability: f64,
}

impl InMemoryMetrics {
    /// Store reporting 0.0 availability when no samples exist.
    pub fn new() -> Self {
        Self::with_empty_default(0.0)
    }

    /// Store reporting the given default when no samples exist.
    pub fn with_empty_default(empty_availability: f64) -> Self {
        Self {
            samples: Mutex::new(HashMap::new()),
            empty_availability,
        }
    }

    fn record_at(&self, service_id: i64, target: &str, ok: bool, at: DateTime<Utc>) {
        let mut samples = self.samples.lock().expect("samples lock");
        samples
            .entry(service_id)
            .or_default()
            .entry(target.to_string())
            .or_default()
            .push(Sample { at, ok });
    }

    fn availability_at(&self, service_id: i64, window: Duration, now: DateTime<Utc>) -> f64 {
        let cutoff = now - chrono::Duration::from_std(window).unwrap_or(chrono::Duration::zero());
        let mut samples = self.samples.lock().expect("samples lock");

        let Some(targets) = samples.get_mut(&service_id) else {
            return self.empty_availability;
        };

        let mut total = 0usize;
        let mut ok_count = 0usize;
        targets.retain(|_, tail| {
            tail.retain(|sample| sample.at > cutoff);
            if tail.is_empty() {
                return false;
            }
            total += tail.len();
            ok_count += tail.iter().filter(|sample| sample.ok).count();
            true
        });

        if targets.is_empty() {
            samples.remove(&service_id);
            return self.empty_availability;
        }
        if total == 0 {
            return self.empty_availability;
        }
        ok_count as f64 / total as f64
    }
}

impl Default for InMemoryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsRecorder for InMemoryMetrics {
    async fn record_probe(
        &self,
        service_id: i64,
        target: &str,
        ok: bool,
        _latency: Duration,
    ) -> Result<(), MonitorError> {
        self.record_at(service_id, target, ok, Utc::now());
        Ok(())
    }
}

#[async_trait]
impl AvailabilityProvider for InMemoryMetrics {
    async fn availability(&self, service_id: i64, window: Duration) -> Result<f64, MonitorError> {
        Ok(self.availability_at(service_id, window, Utc::now()))
    }
}
