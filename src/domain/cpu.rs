use crate::domain::aggregate::MetricSet;
use crate::domain::engine::CounterDomain;
use crate::domain::rate::{percent, sum, Interval};
use serde::Serialize;

/// Cumulative CPU time buckets in jiffies, as listed on a `/proc/stat` cpu line.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CpuCounters {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
}

/// Shares of the accounting total spent in each bucket over one interval.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CpuMetrics {
    pub user_pct: f64,
    pub system_pct: f64,
    pub idle_pct: f64,
    pub iowait_pct: f64,
    /// Everything but idle.
    pub busy_pct: f64,
}

impl MetricSet for CpuMetrics {
    const NAMES: &'static [&'static str] = &["user_pct", "system_pct", "idle_pct", "iowait_pct", "busy_pct"];

    fn values(&self) -> Vec<f64> {
        vec![self.user_pct, self.system_pct, self.idle_pct, self.iowait_pct, self.busy_pct]
    }
}

pub struct Cpu;

impl CounterDomain for Cpu {
    const NAME: &'static str = "cpu";
    const PEAKS: &'static [&'static str] = &["busy_pct"];

    type Counters = CpuCounters;
    type Metrics = CpuMetrics;

    /// The accounting total leaves out irq and softirq. It is built from
    /// per-bucket deltas, so one bucket going backward zeroes every share.
    fn derive(interval: &Interval<'_, CpuCounters>) -> CpuMetrics {
        let user = interval.delta(|c| c.user);
        let nice = interval.delta(|c| c.nice);
        let system = interval.delta(|c| c.system);
        let idle = interval.delta(|c| c.idle);
        let iowait = interval.delta(|c| c.iowait);
        let total = sum(&[user, nice, system, idle, iowait]);
        let busy = sum(&[user, nice, system, iowait]);

        CpuMetrics {
            user_pct: percent(user, total),
            system_pct: percent(system, total),
            idle_pct: percent(idle, total),
            iowait_pct: percent(iowait, total),
            busy_pct: percent(busy, total),
        }
    }
}
