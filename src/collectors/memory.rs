use anyhow::{Context, Result};
use serde::Serialize;

const PROC_MEMINFO: &str = "/proc/meminfo";

/// Memory usage in KiB, as `/proc/meminfo` reports it.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MemoryStats {
    pub total_kb: u64,
    /// Reclaimable memory: free plus buffers plus page cache.
    pub free_kb: u64,
    pub used_kb: u64,
    pub buffers_kb: u64,
    pub cached_kb: u64,
    pub used_pct: f64,
    pub swap_total_kb: u64,
    pub swap_used_kb: u64,
    pub swap_used_pct: f64,
}

fn pct(part: u64, whole: u64) -> f64 {
    if whole > 0 {
        (part as f64 / whole as f64) * 100.0
    } else {
        0.0
    }
}

pub fn parse_meminfo(contents: &str) -> Result<MemoryStats> {
    let mut total = None;
    let mut free = 0;
    let mut buffers = 0;
    let mut cached = 0;
    let mut swap_total = 0;
    let mut swap_free = 0;

    for line in contents.lines() {
        let mut fields = line.split_whitespace();
        let (Some(name), Some(value)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Ok(value) = value.parse::<u64>() else {
            continue;
        };
        match name {
            "MemTotal:" => total = Some(value),
            "MemFree:" => free = value,
            "Buffers:" => buffers = value,
            "Cached:" => cached = value,
            "SwapTotal:" => swap_total = value,
            "SwapFree:" => swap_free = value,
            _ => {}
        }
    }

    let total_kb = total.context("MemTotal missing from meminfo")?;
    let free_kb = (free + buffers + cached).min(total_kb);
    let used_kb = total_kb - free_kb;
    let swap_used_kb = swap_total.saturating_sub(swap_free);

    Ok(MemoryStats {
        total_kb,
        free_kb,
        used_kb,
        buffers_kb: buffers,
        cached_kb: cached,
        used_pct: pct(used_kb, total_kb),
        swap_total_kb: swap_total,
        swap_used_kb,
        swap_used_pct: pct(swap_used_kb, swap_total),
    })
}

pub struct MemoryCollector;

impl MemoryCollector {
    pub fn new() -> Self {
        Self
    }

    pub fn collect(&self) -> Result<MemoryStats> {
        let contents = std::fs::read_to_string(PROC_MEMINFO)
            .with_context(|| format!("Failed to read {}", PROC_MEMINFO))?;
        parse_meminfo(&contents)
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}
