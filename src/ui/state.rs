use crate::collectors::{CpuStats, FilesystemStats, MemoryStats};
use crate::domain::{DiskMetrics, NetworkMetrics, PassReport};
use crate::query::LinkDetail;
use std::collections::{HashMap, VecDeque};
use std::time::Instant;

/// Minimum history size to ensure some data is always available
const MIN_HISTORY_SIZE: usize = 60;

#[derive(Clone, Debug)]
pub struct AppState {
    pub cpu_stats: Option<CpuStats>,
    pub memory_stats: Option<MemoryStats>,
    pub filesystem_stats: Option<FilesystemStats>,
    pub disk_report: Option<PassReport<DiskMetrics>>,
    pub network_report: Option<PassReport<NetworkMetrics>>,
    pub network_links: HashMap<String, LinkDetail>,
    pub last_update: Instant,
    pub should_quit: bool,

    // Dynamic history size based on terminal width
    history_size: usize,

    pub cpu_history: VecDeque<f64>,
    pub core_history: HashMap<String, VecDeque<f64>>,
    pub memory_history: VecDeque<f64>,
    pub disk_util_history: HashMap<String, VecDeque<f64>>,
    // Combined RX+TX bytes/sec per interface
    pub network_history: HashMap<String, VecDeque<f64>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            cpu_stats: None,
            memory_stats: None,
            filesystem_stats: None,
            disk_report: None,
            network_report: None,
            network_links: HashMap::new(),
            last_update: Instant::now(),
            should_quit: false,
            history_size: MIN_HISTORY_SIZE,
            cpu_history: VecDeque::new(),
            core_history: HashMap::new(),
            memory_history: VecDeque::new(),
            disk_util_history: HashMap::new(),
            network_history: HashMap::new(),
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update history size based on terminal width
    pub fn set_terminal_width(&mut self, width: u16) {
        self.history_size = (width as usize).max(MIN_HISTORY_SIZE);
    }

    fn trim_history<T>(history: &mut VecDeque<T>, max_size: usize) {
        while history.len() > max_size {
            history.pop_front();
        }
    }

    fn push_keyed<'a>(
        histories: &mut HashMap<String, VecDeque<f64>>,
        values: impl IntoIterator<Item = (&'a str, f64)>,
        max_size: usize,
    ) {
        let mut seen = Vec::new();
        for (key, value) in values {
            let history = histories.entry(key.to_string()).or_default();
            history.push_back(value);
            Self::trim_history(history, max_size);
            seen.push(key);
        }
        // Drop history for entities missing from this pass
        histories.retain(|key, _| seen.iter().any(|s| *s == key.as_str()));
    }

    pub fn update_cpu(&mut self, cpu_stats: CpuStats) {
        let history_size = self.history_size;

        self.cpu_history.push_back(cpu_stats.total.busy_pct);
        Self::trim_history(&mut self.cpu_history, history_size);

        Self::push_keyed(
            &mut self.core_history,
            cpu_stats.cores.iter().map(|(name, m)| (name.as_str(), m.busy_pct)),
            history_size,
        );

        self.cpu_stats = Some(cpu_stats);
        self.last_update = Instant::now();
    }

    pub fn update_memory(&mut self, memory_stats: MemoryStats) {
        self.memory_history.push_back(memory_stats.used_pct);
        Self::trim_history(&mut self.memory_history, self.history_size);
        self.memory_stats = Some(memory_stats);
    }

    pub fn update_filesystems(&mut self, filesystem_stats: FilesystemStats) {
        self.filesystem_stats = Some(filesystem_stats);
    }

    pub fn update_disks(&mut self, report: PassReport<DiskMetrics>) {
        Self::push_keyed(
            &mut self.disk_util_history,
            report.entities.iter().map(|e| (e.key.as_str(), e.metrics.utilization_pct)),
            self.history_size,
        );
        self.disk_report = Some(report);
        self.last_update = Instant::now();
    }

    pub fn update_network(&mut self, report: PassReport<NetworkMetrics>, links: Vec<LinkDetail>) {
        self.network_links = links.into_iter().map(|l| (l.key.clone(), l)).collect();
        Self::push_keyed(
            &mut self.network_history,
            report
                .entities
                .iter()
                .map(|e| (e.key.as_str(), e.metrics.rx_bytes_per_sec + e.metrics.tx_bytes_per_sec)),
            self.history_size,
        );
        self.network_report = Some(report);
        self.last_update = Instant::now();
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Disk, DiskCounters, RateEngine, Snapshot};
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn history_is_bounded_by_terminal_width() {
        let mut state = AppState::new();
        state.set_terminal_width(10);
        for i in 0..100 {
            state.update_cpu(CpuStats {
                total: crate::domain::CpuMetrics {
                    busy_pct: i as f64,
                    ..Default::default()
                },
                ..Default::default()
            });
        }
        assert_eq!(state.cpu_history.len(), MIN_HISTORY_SIZE);
        assert_eq!(state.cpu_history.back(), Some(&99.0));
    }

    #[test]
    fn disk_history_follows_the_current_pass() {
        let mut engine = RateEngine::<Disk>::default();
        let mut state = AppState::new();
        let at = |s| UNIX_EPOCH + Duration::from_secs(s);

        state.update_disks(
            engine
                .collect([
                    Snapshot::new("sda", at(0), DiskCounters::default()),
                    Snapshot::new("sdb", at(0), DiskCounters::default()),
                ])
                .clone(),
        );
        assert_eq!(state.disk_util_history.len(), 2);

        state.update_disks(engine.collect([Snapshot::new("sda", at(1), DiskCounters::default())]).clone());
        assert_eq!(state.disk_util_history.len(), 1);
        assert_eq!(state.disk_util_history["sda"].len(), 2);
    }
}
