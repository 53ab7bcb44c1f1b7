use crate::store::MetricsStore;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(5000);

#[async_trait]
pub trait RefreshTarget: Send + Sync + 'static {
    async fn refresh(&self, force_refresh: bool);
}

#[async_trait]
impl RefreshTarget for MetricsStore {
    async fn refresh(&self, force_refresh: bool) {
        let capture = self.get(force_refresh).await;
        info!(captured_at = %capture.captured_at, "collected metrics");
    }
}

pub struct RefreshScheduler {
    target: Arc<dyn RefreshTarget>,
    interval: Duration,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub fn new(target: Arc<dyn RefreshTarget>, interval: Duration) -> Self {
        Self {
            target,
            interval,
            ticker: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn enable(&self) {
        let mut ticker = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        if ticker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let target = Arc::clone(&self.target);
        let period = self.interval;
        *ticker = Some(tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                timer.tick().await;
                // Not awaited: a slow refresh must not hold back the next tick.
                let target = Arc::clone(&target);
                tokio::spawn(async move {
                    target.refresh(true).await;
                });
            }
        }));
        info!(interval_ms = period.as_millis() as u64, "auto-refresh enabled");
    }

    pub fn disable(&self) {
        let handle = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            info!("auto-refresh disabled");
        }
    }

    pub fn toggle(&self) -> bool {
        if self.is_running() {
            self.disable();
            false
        } else {
            self.enable();
            true
        }
    }

    pub async fn manual_refresh(&self) {
        debug!("manual refresh");
        self.target.refresh(true).await;
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        let handle = self
            .ticker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

pub struct StopHandle {
    scheduler: RefreshScheduler,
}

impl StopHandle {
    pub fn stop(self) {
        self.scheduler.disable();
    }
}

pub fn start_periodic_collection(store: Arc<MetricsStore>, interval: Duration) -> StopHandle {
    let scheduler = RefreshScheduler::new(store, interval);
    scheduler.enable();
    StopHandle { scheduler }
}
