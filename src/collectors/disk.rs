use crate::domain::{Disk, DiskCounters, DiskMetrics, OwnerPolicy, PassReport, RateEngine, Snapshot};
use anyhow::{Context, Result};
use log::debug;
use std::collections::HashMap;
use std::time::SystemTime;

const PROC_PARTITIONS: &str = "/proc/partitions";
const PROC_DISKSTATS: &str = "/proc/diskstats";

/// Fields on a diskstats line up to and including `time_in_queue`. Newer
/// kernels append discard and flush counters which are ignored.
const DISKSTATS_FIELDS: usize = 14;

/// Partition names from `/proc/partitions`, in file order.
pub fn parse_partitions(contents: &str) -> Vec<String> {
    contents
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [major, _, _, name] if major.parse::<u32>().is_ok() => Some(name.to_string()),
                _ => None,
            }
        })
        .collect()
}

fn parse_diskstats_line(fields: &[&str]) -> Option<DiskCounters> {
    let num = |i: usize| fields.get(i).and_then(|v| v.parse::<u64>().ok());
    Some(DiskCounters {
        read_ops: num(3)?,
        read_merges: num(4)?,
        read_sectors: num(5)?,
        read_time_ms: num(6)?,
        write_ops: num(7)?,
        write_merges: num(8)?,
        write_sectors: num(9)?,
        write_time_ms: num(10)?,
        // 11 is I/Os currently in flight, a gauge
        io_time_ms: num(12)?,
        weighted_io_time_ms: num(13)?,
    })
}

/// Counters per device name from `/proc/diskstats`. Short or malformed
/// lines are skipped.
pub fn parse_diskstats(contents: &str) -> HashMap<String, DiskCounters> {
    let mut devices = HashMap::new();
    for line in contents.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < DISKSTATS_FIELDS {
            continue;
        }
        match parse_diskstats_line(&fields) {
            Some(counters) => {
                devices.insert(fields[2].to_string(), counters);
            }
            None => debug!("skipping malformed diskstats line: {}", line),
        }
    }
    devices
}

pub struct DiskCollector {
    engine: RateEngine<Disk>,
}

impl DiskCollector {
    pub fn new(policy: OwnerPolicy) -> Self {
        Self {
            engine: RateEngine::new(policy),
        }
    }

    pub fn collect(&mut self) -> Result<&PassReport<DiskMetrics>> {
        let partitions = std::fs::read_to_string(PROC_PARTITIONS)
            .with_context(|| format!("Failed to read {}", PROC_PARTITIONS))?;
        let diskstats = std::fs::read_to_string(PROC_DISKSTATS)
            .with_context(|| format!("Failed to read {}", PROC_DISKSTATS))?;

        Ok(self.update(&partitions, &diskstats, SystemTime::now()))
    }

    /// Only partitions listed in `/proc/partitions` are measured, in the
    /// order they are listed there.
    pub fn update(&mut self, partitions: &str, diskstats: &str, now: SystemTime) -> &PassReport<DiskMetrics> {
        let mut stats = parse_diskstats(diskstats);
        let snapshots: Vec<_> = parse_partitions(partitions)
            .into_iter()
            .filter_map(|name| {
                let counters = stats.remove(&name)?;
                Some(Snapshot::new(name, now, counters))
            })
            .collect();

        self.engine.collect(snapshots)
    }

    pub fn engine(&self) -> &RateEngine<Disk> {
        &self.engine
    }
}

impl Default for DiskCollector {
    fn default() -> Self {
        Self::new(OwnerPolicy::default())
    }
}
