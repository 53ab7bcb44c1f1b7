use crate::collectors::{Capture, ProcessStat};
use crate::state::{HistorySample, TimeRange};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortColumn {
    Name,
    Pid,
    #[default]
    Cpu,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    format!("{days}d {hours}h {minutes}m")
}

pub fn sort_processes(
    processes: &[ProcessStat],
    column: SortColumn,
    direction: SortDirection,
) -> Vec<ProcessStat> {
    let mut sorted = processes.to_vec();
    sorted.sort_by(|a, b| {
        let ord = match column {
            SortColumn::Name => a.name.cmp(&b.name),
            SortColumn::Pid => a.pid.cmp(&b.pid),
            SortColumn::Cpu => a.cpu_percent.total_cmp(&b.cpu_percent),
            SortColumn::Memory => a.memory_percent.total_cmp(&b.memory_percent),
        };
        match direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });
    sorted
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentView {
    pub captured_at: DateTime<Utc>,
    pub cpu_usage_percent: f64,
    pub cpu_cores: u32,
    pub cpu_temperature_celsius: f64,
    pub memory_usage_percent: f64,
    pub memory_used_gb: f64,
    pub memory_total_gb: f64,
    pub disk_usage_percent: f64,
    pub disk_used_gb: f64,
    pub disk_total_gb: f64,
    pub uptime_seconds: u64,
    pub uptime_human: String,
    pub process_count: u64,
    pub processes: Vec<ProcessStat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub loading: bool,
    pub auto_refresh: bool,
    pub range: TimeRange,
    pub sort: SortColumn,
    pub order: SortDirection,
    pub current: Option<CurrentView>,
    pub history: Vec<HistorySample>,
}

impl CurrentView {
    pub fn from_capture(capture: &Capture, sort: SortColumn, order: SortDirection) -> Self {
        let s = &capture.snapshot;
        Self {
            captured_at: capture.captured_at,
            cpu_usage_percent: s.cpu.usage_percent,
            cpu_cores: s.cpu.cores,
            cpu_temperature_celsius: s.cpu.temperature_celsius,
            memory_usage_percent: s.memory.usage_percent,
            memory_used_gb: s.memory.used_gb,
            memory_total_gb: s.memory.total_gb,
            disk_usage_percent: s.disk.usage_percent,
            disk_used_gb: s.disk.used_gb,
            disk_total_gb: s.disk.total_gb,
            uptime_seconds: s.system.uptime_seconds,
            uptime_human: format_uptime(s.system.uptime_seconds),
            process_count: s.system.process_count,
            processes: sort_processes(&s.processes, sort, order),
        }
    }
}
