use crate::domain::aggregate::MetricSet;
use crate::domain::engine::CounterDomain;
use crate::domain::rate::{ratio, sum, Interval};
use serde::Serialize;

/// Sectors are counted in 512-byte units regardless of the device.
const SECTORS_PER_KB: f64 = 2.0;
const MS_PER_SEC: f64 = 1000.0;

/// Cumulative per-partition I/O counters from `/proc/diskstats`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DiskCounters {
    pub read_ops: u64,
    pub read_merges: u64,
    pub read_sectors: u64,
    pub read_time_ms: u64,
    pub write_ops: u64,
    pub write_merges: u64,
    pub write_sectors: u64,
    pub write_time_ms: u64,
    pub io_time_ms: u64,
    pub weighted_io_time_ms: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DiskMetrics {
    pub read_ops_per_sec: f64,
    pub write_ops_per_sec: f64,
    pub read_merges_per_sec: f64,
    pub write_merges_per_sec: f64,
    pub read_sectors_per_sec: f64,
    pub write_sectors_per_sec: f64,
    pub read_kb_per_sec: f64,
    pub write_kb_per_sec: f64,
    /// Sectors per completed I/O.
    pub avg_request_size: f64,
    /// Busy milliseconds per completed I/O.
    pub avg_service_ms: f64,
    /// Read+write milliseconds per completed I/O.
    pub avg_wait_ms: f64,
    pub queue_depth: f64,
    pub utilization_pct: f64,
}

impl MetricSet for DiskMetrics {
    const NAMES: &'static [&'static str] = &[
        "read_ops_per_sec",
        "write_ops_per_sec",
        "read_merges_per_sec",
        "write_merges_per_sec",
        "read_sectors_per_sec",
        "write_sectors_per_sec",
        "read_kb_per_sec",
        "write_kb_per_sec",
        "avg_request_size",
        "avg_service_ms",
        "avg_wait_ms",
        "queue_depth",
        "utilization_pct",
    ];

    fn values(&self) -> Vec<f64> {
        vec![
            self.read_ops_per_sec,
            self.write_ops_per_sec,
            self.read_merges_per_sec,
            self.write_merges_per_sec,
            self.read_sectors_per_sec,
            self.write_sectors_per_sec,
            self.read_kb_per_sec,
            self.write_kb_per_sec,
            self.avg_request_size,
            self.avg_service_ms,
            self.avg_wait_ms,
            self.queue_depth,
            self.utilization_pct,
        ]
    }
}

pub struct Disk;

impl CounterDomain for Disk {
    const NAME: &'static str = "disk";
    const PEAKS: &'static [&'static str] = &["utilization_pct"];

    type Counters = DiskCounters;
    type Metrics = DiskMetrics;

    fn derive(interval: &Interval<'_, DiskCounters>) -> DiskMetrics {
        let read_ops = interval.delta(|c| c.read_ops);
        let write_ops = interval.delta(|c| c.write_ops);
        let read_sectors = interval.delta(|c| c.read_sectors);
        let write_sectors = interval.delta(|c| c.write_sectors);
        let io_time = interval.delta(|c| c.io_time_ms);
        let ios = sum(&[read_ops, write_ops]);

        let read_sectors_per_sec = interval.rate_of(read_sectors);
        let write_sectors_per_sec = interval.rate_of(write_sectors);

        DiskMetrics {
            read_ops_per_sec: interval.rate_of(read_ops),
            write_ops_per_sec: interval.rate_of(write_ops),
            read_merges_per_sec: interval.rate(|c| c.read_merges),
            write_merges_per_sec: interval.rate(|c| c.write_merges),
            read_sectors_per_sec,
            write_sectors_per_sec,
            read_kb_per_sec: read_sectors_per_sec / SECTORS_PER_KB,
            write_kb_per_sec: write_sectors_per_sec / SECTORS_PER_KB,
            avg_request_size: ratio(sum(&[read_sectors, write_sectors]), ios),
            avg_service_ms: ratio(io_time, ios),
            avg_wait_ms: ratio(
                sum(&[interval.delta(|c| c.read_time_ms), interval.delta(|c| c.write_time_ms)]),
                ios,
            ),
            queue_depth: interval.rate(|c| c.weighted_io_time_ms) / MS_PER_SEC,
            utilization_pct: interval.rate_of(io_time) * 100.0 / MS_PER_SEC,
        }
    }
}
