use crate::domain::{Cpu, CpuCounters, CpuMetrics, OwnerPolicy, PassReport, RateEngine, Snapshot};
use anyhow::{Context, Result};
use log::debug;
use serde::Serialize;
use std::time::SystemTime;

const PROC_STAT: &str = "/proc/stat";
const PROC_LOADAVG: &str = "/proc/loadavg";

/// Raw contents of `/proc/stat` that the CPU domain cares about.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProcStat {
    pub total: CpuCounters,
    /// `cpu0`, `cpu1`, ... in file order.
    pub cores: Vec<(String, CpuCounters)>,
    pub procs_running: u64,
    pub procs_blocked: u64,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct CpuStats {
    pub total: CpuMetrics,
    pub cores: Vec<(String, CpuMetrics)>,
    pub procs_running: u64,
    pub procs_blocked: u64,
    pub load_1m: f64,
}

fn parse_cpu_line(fields: &[&str]) -> Option<CpuCounters> {
    // user nice system idle iowait irq softirq [steal guest ...]
    let mut values = fields.iter().skip(1).map(|f| f.parse::<u64>().ok());
    let mut next = || values.next().flatten();
    Some(CpuCounters {
        user: next()?,
        nice: next()?,
        system: next()?,
        idle: next()?,
        iowait: next().unwrap_or(0),
        irq: next().unwrap_or(0),
        softirq: next().unwrap_or(0),
    })
}

pub fn parse_proc_stat(contents: &str) -> Result<ProcStat> {
    let mut stat = ProcStat::default();
    let mut found_total = false;

    for line in contents.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(&tag) = fields.first() else {
            continue;
        };

        match tag {
            "cpu" => {
                stat.total = parse_cpu_line(&fields).context("malformed aggregate cpu line")?;
                found_total = true;
            }
            _ if tag.starts_with("cpu") => {
                if let Some(counters) = parse_cpu_line(&fields) {
                    stat.cores.push((tag.to_string(), counters));
                }
            }
            "procs_running" => {
                stat.procs_running = fields.get(1).and_then(|v| v.parse().ok()).unwrap_or(0);
            }
            "procs_blocked" => {
                stat.procs_blocked = fields.get(1).and_then(|v| v.parse().ok()).unwrap_or(0);
            }
            _ => {}
        }
    }

    if !found_total {
        anyhow::bail!("no aggregate cpu line");
    }
    Ok(stat)
}

/// First field of `/proc/loadavg`.
pub fn parse_loadavg(contents: &str) -> Result<f64> {
    contents
        .split_whitespace()
        .next()
        .context("empty loadavg")?
        .parse()
        .context("malformed loadavg")
}

pub struct CpuCollector {
    total: RateEngine<Cpu>,
    cores: Option<RateEngine<Cpu>>,
}

impl CpuCollector {
    pub fn new(policy: OwnerPolicy, per_core: bool) -> Self {
        Self {
            total: RateEngine::new(policy),
            cores: per_core.then(|| RateEngine::new(policy)),
        }
    }

    pub fn collect(&mut self) -> Result<CpuStats> {
        let contents = std::fs::read_to_string(PROC_STAT).with_context(|| format!("Failed to read {}", PROC_STAT))?;
        let stat = parse_proc_stat(&contents)?;
        let load_1m = std::fs::read_to_string(PROC_LOADAVG)
            .context("Failed to read /proc/loadavg")
            .and_then(|s| parse_loadavg(&s))?;

        Ok(self.update(stat, load_1m, SystemTime::now()))
    }

    /// Feed one parsed read through the engines.
    pub fn update(&mut self, stat: ProcStat, load_1m: f64, now: SystemTime) -> CpuStats {
        let total = self
            .total
            .collect([Snapshot::new("cpu", now, stat.total)])
            .entity("cpu")
            .cloned()
            .unwrap_or_default();

        let cores = match self.cores.as_mut() {
            Some(engine) => {
                let report = engine.collect(
                    stat.cores
                        .into_iter()
                        .map(|(name, counters)| Snapshot::new(name, now, counters)),
                );
                report.entities.iter().map(|e| (e.key.clone(), e.metrics.clone())).collect()
            }
            None => Vec::new(),
        };

        debug!(
            "cpu: busy {:.1}% running {} blocked {} load {:.2}",
            total.busy_pct, stat.procs_running, stat.procs_blocked, load_1m
        );

        CpuStats {
            total,
            cores,
            procs_running: stat.procs_running,
            procs_blocked: stat.procs_blocked,
            load_1m,
        }
    }

    pub fn engine(&self) -> &RateEngine<Cpu> {
        &self.total
    }

    pub fn core_engine(&self) -> Option<&RateEngine<Cpu>> {
        self.cores.as_ref()
    }

    /// Last per-core pass, when per-core tracking is enabled.
    pub fn core_report(&self) -> Option<&PassReport<CpuMetrics>> {
        self.cores.as_ref().map(|e| e.report())
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new(OwnerPolicy::default(), false)
    }
}
