pub mod aggregate;
pub mod cpu;
pub mod disk;
pub mod engine;
pub mod history;
pub mod network;
pub mod rate;
pub mod snapshot;

pub use aggregate::{AggregateResult, MetricSet, OwnerPolicy, Peak, Totals};
pub use cpu::{Cpu, CpuCounters, CpuMetrics};
pub use disk::{Disk, DiskCounters, DiskMetrics};
pub use engine::{CounterDomain, EntityMetrics, PassReport, RateEngine};
pub use history::HistoryStore;
pub use network::{Network, NetworkCounters, NetworkMetrics};
pub use rate::{HistoryEntry, Interval, Outcome};
pub use snapshot::Snapshot;
