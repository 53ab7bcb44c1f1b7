use crate::collectors::Capture;
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub cpu_usage_percent: Gauge,
    pub cpu_temperature_celsius: Gauge,
    pub cpu_cores: Gauge,
    pub memory_used_gigabytes: Gauge,
    pub memory_total_gigabytes: Gauge,
    pub memory_usage_percent: Gauge,
    pub disk_used_gigabytes: Gauge,
    pub disk_total_gigabytes: Gauge,
    pub disk_usage_percent: Gauge,
    pub system_uptime_seconds: Gauge,
    pub system_process_count: Gauge,
    pub process_cpu_percent: GaugeVec,
    pub process_memory_percent: GaugeVec,
    pub last_capture_timestamp_seconds: Gauge,
    pub history_samples: Gauge,
    pub store_requests_total: CounterVec,
    pub persistence_errors_total: CounterVec,
    pub scrape_count_total: Counter,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let cpu_usage_percent = Gauge::with_opts(opts!(
            "sysdash_cpu_usage_percent",
            "CPU usage of the latest snapshot in percent (0..100)"
        ))?;
        let cpu_temperature_celsius = Gauge::with_opts(opts!(
            "sysdash_cpu_temperature_celsius",
            "CPU temperature of the latest snapshot in Celsius"
        ))?;
        let cpu_cores = Gauge::with_opts(opts!("sysdash_cpu_cores", "Number of CPU cores"))?;
        let memory_used_gigabytes = Gauge::with_opts(opts!(
            "sysdash_memory_used_gigabytes",
            "Used memory in gigabytes"
        ))?;
        let memory_total_gigabytes = Gauge::with_opts(opts!(
            "sysdash_memory_total_gigabytes",
            "Total memory in gigabytes"
        ))?;
        let memory_usage_percent = Gauge::with_opts(opts!(
            "sysdash_memory_usage_percent",
            "Memory usage in percent"
        ))?;
        let disk_used_gigabytes =
            Gauge::with_opts(opts!("sysdash_disk_used_gigabytes", "Used disk in gigabytes"))?;
        let disk_total_gigabytes = Gauge::with_opts(opts!(
            "sysdash_disk_total_gigabytes",
            "Total disk in gigabytes"
        ))?;
        let disk_usage_percent =
            Gauge::with_opts(opts!("sysdash_disk_usage_percent", "Disk usage in percent"))?;
        let system_uptime_seconds = Gauge::with_opts(opts!(
            "sysdash_system_uptime_seconds",
            "Reported system uptime in seconds"
        ))?;
        let system_process_count = Gauge::with_opts(opts!(
            "sysdash_system_process_count",
            "Reported number of running processes"
        ))?;
        let process_cpu_percent = GaugeVec::new(
            opts!(
                "sysdash_process_cpu_percent",
                "CPU usage by top process in percent"
            ),
            &["pid", "name"],
        )?;
        let process_memory_percent = GaugeVec::new(
            opts!(
                "sysdash_process_memory_percent",
                "Memory usage by top process in percent"
            ),
            &["pid", "name"],
        )?;
        let last_capture_timestamp_seconds = Gauge::with_opts(opts!(
            "sysdash_last_capture_timestamp_seconds",
            "Unix timestamp of the cached snapshot"
        ))?;
        let history_samples = Gauge::with_opts(opts!(
            "sysdash_history_samples",
            "Number of samples in the usage history"
        ))?;
        let store_requests_total = CounterVec::new(
            opts!(
                "sysdash_store_requests_total",
                "Store queries by how they were served"
            ),
            &["outcome"],
        )?;
        let persistence_errors_total = CounterVec::new(
            opts!(
                "sysdash_persistence_errors_total",
                "Failed persistence operations by operation"
            ),
            &["op"],
        )?;
        let scrape_count_total = Counter::with_opts(opts!(
            "sysdash_scrape_count_total",
            "Number of /metrics scrapes"
        ))?;

        register(&registry, &cpu_usage_percent)?;
        register(&registry, &cpu_temperature_celsius)?;
        register(&registry, &cpu_cores)?;
        register(&registry, &memory_used_gigabytes)?;
        register(&registry, &memory_total_gigabytes)?;
        register(&registry, &memory_usage_percent)?;
        register(&registry, &disk_used_gigabytes)?;
        register(&registry, &disk_total_gigabytes)?;
        register(&registry, &disk_usage_percent)?;
        register(&registry, &system_uptime_seconds)?;
        register(&registry, &system_process_count)?;
        register(&registry, &process_cpu_percent)?;
        register(&registry, &process_memory_percent)?;
        register(&registry, &last_capture_timestamp_seconds)?;
        register(&registry, &history_samples)?;
        register(&registry, &store_requests_total)?;
        register(&registry, &persistence_errors_total)?;
        register(&registry, &scrape_count_total)?;

        Ok(Arc::new(Self {
            registry,
            cpu_usage_percent,
            cpu_temperature_celsius,
            cpu_cores,
            memory_used_gigabytes,
            memory_total_gigabytes,
            memory_usage_percent,
            disk_used_gigabytes,
            disk_total_gigabytes,
            disk_usage_percent,
            system_uptime_seconds,
            system_process_count,
            process_cpu_percent,
            process_memory_percent,
            last_capture_timestamp_seconds,
            history_samples,
            store_requests_total,
            persistence_errors_total,
            scrape_count_total,
        }))
    }

    pub fn update_from_capture(&self, capture: &Capture) {
        let s = &capture.snapshot;
        self.cpu_usage_percent.set(s.cpu.usage_percent);
        self.cpu_temperature_celsius.set(s.cpu.temperature_celsius);
        self.cpu_cores.set(f64::from(s.cpu.cores));
        self.memory_used_gigabytes.set(s.memory.used_gb);
        self.memory_total_gigabytes.set(s.memory.total_gb);
        self.memory_usage_percent.set(s.memory.usage_percent);
        self.disk_used_gigabytes.set(s.disk.used_gb);
        self.disk_total_gigabytes.set(s.disk.total_gb);
        self.disk_usage_percent.set(s.disk.usage_percent);
        self.system_uptime_seconds.set(s.system.uptime_seconds as f64);
        self.system_process_count.set(s.system.process_count as f64);

        // Drop series of processes that left the list.
        self.process_cpu_percent.reset();
        self.process_memory_percent.reset();
        for p in &s.processes {
            let pid = p.pid.to_string();
            let labels: [&str; 2] = [&pid, &p.name];
            self.process_cpu_percent
                .with_label_values(&labels)
                .set(p.cpu_percent);
            self.process_memory_percent
                .with_label_values(&labels)
                .set(p.memory_percent);
        }

        self.last_capture_timestamp_seconds
            .set(capture.captured_at.timestamp() as f64);
    }

    pub fn set_history_len(&self, len: usize) {
        self.history_samples.set(len as f64);
    }

    pub fn inc_store_request(&self, outcome: &str) {
        self.store_requests_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn inc_persistence_error(&self, op: &str) {
        self.persistence_errors_total.with_label_values(&[op]).inc();
    }

    pub fn inc_scrape_count(&self) {
        self.scrape_count_total.inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::mock::MockCollector;
    use crate::collectors::Collector as _;
    use chrono::DateTime;

    fn encoded(metrics: &Metrics) -> String {
        String::from_utf8(metrics.encode_metrics().expect("encode")).expect("utf8")
    }

    #[test]
    fn capture_values_are_exported() {
        let metrics = Metrics::new().expect("metrics");
        let capture = Capture {
            captured_at: DateTime::from_timestamp(1_700_000_000, 0).expect("timestamp"),
            snapshot: MockCollector::seeded(1).collect(),
        };
        metrics.update_from_capture(&capture);

        assert_eq!(
            metrics.cpu_usage_percent.get(),
            capture.snapshot.cpu.usage_percent
        );
        assert_eq!(metrics.last_capture_timestamp_seconds.get(), 1_700_000_000.0);
        let text = encoded(&metrics);
        let chrome_line = text
            .lines()
            .find(|l| l.starts_with("sysdash_process_cpu_percent{") && l.contains("chrome"))
            .expect("chrome series");
        assert!(chrome_line.contains("pid=\"1234\""));
    }

    #[test]
    fn counters_are_labelled() {
        let metrics = Metrics::new().expect("metrics");
        metrics.inc_store_request("cache_hit");
        metrics.inc_store_request("cache_hit");
        metrics.inc_persistence_error("save");

        assert_eq!(
            metrics
                .store_requests_total
                .with_label_values(&["cache_hit"])
                .get(),
            2.0
        );
        let text = encoded(&metrics);
        assert!(text.contains("sysdash_persistence_errors_total{op=\"save\"} 1"));
    }
}
