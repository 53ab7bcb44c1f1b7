use crate::collectors::{
    Collector, CpuStats, DiskStats, MemoryStats, ProcessStat, Snapshot, SystemStats,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};

const CPU_CORES: u32 = 8;
const MEMORY_TOTAL_GB: f64 = 16.0;
const DISK_TOTAL_GB: f64 = 512.0;
const SECONDS_PER_DAY: u64 = 86_400;

// (pid, name, cpu floor, cpu span, memory ceiling)
const PROCESSES: [(u32, &str, u32, u32, f64); 5] = [
    (1234, "chrome", 5, 15, 1.5),
    (5678, "node", 3, 10, 1.2),
    (9012, "vscode", 2, 8, 0.8),
    (3456, "spotify", 1, 5, 0.5),
    (7890, "discord", 1, 4, 0.4),
];

pub struct MockCollector {
    rng: Mutex<StdRng>,
}

impl MockCollector {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    #[cfg(test)]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for MockCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for MockCollector {
    fn collect(&self) -> Snapshot {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        generate(&mut *rng)
    }
}

fn generate<R: Rng>(rng: &mut R) -> Snapshot {
    let cpu_usage: u32 = rng.gen_range(30..60);
    let memory_usage: u32 = rng.gen_range(40..60);
    let disk_usage: u32 = rng.gen_range(50..80);

    let processes = PROCESSES
        .iter()
        .map(|&(pid, name, cpu_floor, cpu_span, mem_ceiling)| ProcessStat {
            pid,
            name: name.to_string(),
            cpu_percent: f64::from(rng.gen_range(0..cpu_span) + cpu_floor),
            memory_percent: round_tenths(rng.gen::<f64>() * mem_ceiling),
        })
        .collect();

    Snapshot {
        cpu: CpuStats {
            usage_percent: f64::from(cpu_usage),
            cores: CPU_CORES,
            temperature_celsius: f64::from(rng.gen_range(40..50_u32)),
        },
        memory: MemoryStats {
            used_gb: round_tenths(MEMORY_TOTAL_GB * f64::from(memory_usage) / 100.0),
            total_gb: MEMORY_TOTAL_GB,
            usage_percent: f64::from(memory_usage),
        },
        disk: DiskStats {
            used_gb: (DISK_TOTAL_GB * f64::from(disk_usage) / 100.0).floor(),
            total_gb: DISK_TOTAL_GB,
            usage_percent: f64::from(disk_usage),
        },
        system: SystemStats {
            uptime_seconds: rng.gen_range(SECONDS_PER_DAY..2 * SECONDS_PER_DAY),
            process_count: rng.gen_range(100..150_u64),
        },
        processes,
    }
}

fn round_tenths(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_stay_within_plausible_ranges() {
        let collector = MockCollector::seeded(7);
        for _ in 0..500 {
            let s = collector.collect();
            assert!((30.0..60.0).contains(&s.cpu.usage_percent));
            assert_eq!(s.cpu.cores, 8);
            assert!((40.0..50.0).contains(&s.cpu.temperature_celsius));
            assert!((40.0..60.0).contains(&s.memory.usage_percent));
            assert!((50.0..80.0).contains(&s.disk.usage_percent));
            assert!((86_400..172_800).contains(&s.system.uptime_seconds));
            assert!((100..150).contains(&s.system.process_count));
            assert!(s.memory.used_gb <= s.memory.total_gb);
            assert!(s.disk.used_gb <= s.disk.total_gb);
        }
    }

    #[test]
    fn used_amounts_follow_usage_percent() {
        let s = MockCollector::seeded(42).collect();
        let expected_mem = round_tenths(16.0 * s.memory.usage_percent / 100.0);
        assert_eq!(s.memory.used_gb, expected_mem);
        let expected_disk = (512.0 * s.disk.usage_percent / 100.0).floor();
        assert_eq!(s.disk.used_gb, expected_disk);
    }

    #[test]
    fn process_list_has_fixed_shape() {
        let collector = MockCollector::seeded(3);
        for _ in 0..50 {
            let s = collector.collect();
            let names: Vec<_> = s.processes.iter().map(|p| p.name.as_str()).collect();
            assert_eq!(names, ["chrome", "node", "vscode", "spotify", "discord"]);
            let chrome = &s.processes[0];
            assert_eq!(chrome.pid, 1234);
            assert!((5.0..20.0).contains(&chrome.cpu_percent));
            assert!((0.0..=1.5).contains(&chrome.memory_percent));
            let discord = &s.processes[4];
            assert!((1.0..5.0).contains(&discord.cpu_percent));
            assert!((0.0..=0.4).contains(&discord.memory_percent));
        }
    }

    #[test]
    fn seeded_collectors_are_reproducible() {
        let a = MockCollector::seeded(99).collect();
        let b = MockCollector::seeded(99).collect();
        assert_eq!(a, b);
    }
}
