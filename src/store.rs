use crate::clock::Clock;
use crate::collectors::{Capture, Collector};
use crate::metrics::Metrics;
use crate::persist::Persistence;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(10);

pub struct MetricsStore {
    collector: Arc<dyn Collector>,
    persistence: Arc<dyn Persistence>,
    clock: Arc<dyn Clock>,
    freshness: Duration,
    entry: RwLock<Option<Arc<Capture>>>,
    metrics: Option<Arc<Metrics>>,
}

impl MetricsStore {
    pub fn new(
        collector: Arc<dyn Collector>,
        persistence: Arc<dyn Persistence>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            collector,
            persistence,
            clock,
            freshness: DEFAULT_FRESHNESS,
            entry: RwLock::new(None),
            metrics: None,
        }
    }

    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn latest(&self) -> Option<Arc<Capture>> {
        self.entry.read().await.clone()
    }

    pub async fn get(&self, force_refresh: bool) -> Arc<Capture> {
        if !force_refresh {
            let now = self.clock.now();

            if let Some(entry) = self.entry.read().await.as_ref() {
                if self.is_fresh(entry.captured_at, now) {
                    self.count("cache_hit");
                    return Arc::clone(entry);
                }
            }

            match self.persistence.load().await {
                Ok(Some(capture)) if self.is_fresh(capture.captured_at, now) => {
                    debug!(captured_at = %capture.captured_at, "adopting persisted snapshot");
                    self.count("persisted");
                    return self.install(capture).await;
                }
                Ok(Some(capture)) => {
                    debug!(captured_at = %capture.captured_at, "persisted snapshot is stale");
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %err, "failed to load persisted snapshot");
                    self.count_persistence_error("load");
                }
            }
        }

        let snapshot = self.collector.collect();
        let capture = Capture {
            captured_at: self.clock.now(),
            snapshot,
        };
        match self.persistence.save(&capture).await {
            Ok(location) => debug!(location = %location, "snapshot persisted"),
            Err(err) => {
                warn!(error = %err, "failed to persist snapshot");
                self.count_persistence_error("save");
            }
        }
        self.count("collected");
        self.install(capture).await
    }

    fn is_fresh(&self, captured_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        // A capture from the future (clock step back) has zero age.
        let age = (now - captured_at).to_std().unwrap_or(Duration::ZERO);
        age < self.freshness
    }

    async fn install(&self, mut capture: Capture) -> Arc<Capture> {
        let mut guard = self.entry.write().await;
        if let Some(prev) = guard.as_ref() {
            capture.captured_at = capture.captured_at.max(prev.captured_at);
        }
        let entry = Arc::new(capture);
        *guard = Some(Arc::clone(&entry));
        drop(guard);

        if let Some(metrics) = &self.metrics {
            metrics.update_from_capture(&entry);
        }
        entry
    }

    fn count(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_store_request(outcome);
        }
    }

    fn count_persistence_error(&self, op: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_persistence_error(op);
        }
    }
}
