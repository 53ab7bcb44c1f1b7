use crate::clock::Clock;
use crate::collectors::Capture;
use crate::metrics::Metrics;
use crate::scheduler::RefreshTarget;
use crate::store::MetricsStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

pub const HISTORY_CAPACITY: usize = 24;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySample {
    pub timestamp: DateTime<Utc>,
    pub cpu: f64,
    pub memory: f64,
}

#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    samples: VecDeque<HistorySample>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: HistorySample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &HistorySample> {
        self.samples.iter()
    }

    pub fn since(&self, cutoff: DateTime<Utc>) -> Vec<HistorySample> {
        self.samples
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .cloned()
            .collect()
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeRange {
    #[default]
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    OneDay,
}

impl TimeRange {
    pub fn span(self) -> chrono::Duration {
        match self {
            TimeRange::OneHour => chrono::Duration::hours(1),
            TimeRange::SixHours => chrono::Duration::hours(6),
            TimeRange::OneDay => chrono::Duration::hours(24),
        }
    }
}

pub struct Dashboard {
    store: Arc<MetricsStore>,
    clock: Arc<dyn Clock>,
    current: RwLock<Option<Arc<Capture>>>,
    history: RwLock<HistoryBuffer>,
    in_flight: AtomicUsize,
    metrics: Option<Arc<Metrics>>,
}

impl Dashboard {
    pub fn new(store: Arc<MetricsStore>, clock: Arc<dyn Clock>, history_capacity: usize) -> Self {
        Self {
            store,
            clock,
            current: RwLock::new(None),
            history: RwLock::new(HistoryBuffer::new(history_capacity)),
            in_flight: AtomicUsize::new(0),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn fetch(&self, force_refresh: bool) -> Arc<Capture> {
        let _in_flight = InFlight::enter(&self.in_flight);
        let capture = self.store.get(force_refresh).await;

        let sample = HistorySample {
            timestamp: self.clock.now(),
            cpu: capture.snapshot.cpu.usage_percent,
            memory: capture.snapshot.memory.usage_percent,
        };
        *self.current.write().await = Some(Arc::clone(&capture));
        let len = {
            let mut history = self.history.write().await;
            history.push(sample);
            history.len()
        };
        if let Some(metrics) = &self.metrics {
            metrics.set_history_len(len);
        }
        capture
    }

    pub async fn current(&self) -> Option<Arc<Capture>> {
        let own = self.current.read().await.clone();
        match own {
            Some(capture) => Some(capture),
            None => self.store.latest().await,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub async fn history(&self, range: TimeRange) -> Vec<HistorySample> {
        let cutoff = self.clock.now() - range.span();
        self.history.read().await.since(cutoff)
    }
}

// Released on drop, so a cancelled fetch does not leave the dashboard loading.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RefreshTarget for Dashboard {
    async fn refresh(&self, force_refresh: bool) {
        self.fetch(force_refresh).await;
    }
}
