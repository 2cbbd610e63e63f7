use crate::domain::aggregate::{aggregate, AggregateResult, MetricSet, OwnerPolicy};
use crate::domain::history::HistoryStore;
use crate::domain::rate::{compute, HistoryEntry, Interval, Outcome};
use crate::domain::snapshot::Snapshot;
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt::Debug;

/// Counter layout and derivation rules of one sampled domain (CPU, disk,
/// network).
pub trait CounterDomain {
    const NAME: &'static str;
    /// Metrics tracked with a max-with-owner scan. The first one is the
    /// domain's "busiest entity" metric.
    const PEAKS: &'static [&'static str];

    type Counters: Clone + Debug;
    type Metrics: MetricSet;

    fn derive(interval: &Interval<'_, Self::Counters>) -> Self::Metrics;

    /// Named class an entity is summed into, if the domain partitions its
    /// entities.
    fn class(_counters: &Self::Counters) -> Option<&'static str> {
        None
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct EntityMetrics<M> {
    pub key: String,
    pub outcome: Outcome,
    pub metrics: M,
}

/// Everything one collection pass produced. Held until the next pass
/// replaces it.
#[derive(Clone, Debug, Serialize)]
pub struct PassReport<M> {
    pub domain: &'static str,
    pub pass: u64,
    pub entities: Vec<EntityMetrics<M>>,
    pub aggregate: AggregateResult,
}

impl<M: MetricSet> PassReport<M> {
    fn empty(domain: &'static str) -> Self {
        Self {
            domain,
            pass: 0,
            entities: Vec::new(),
            aggregate: AggregateResult::empty::<M>(),
        }
    }

    pub fn entity(&self, key: &str) -> Option<&M> {
        self.entities.iter().find(|e| e.key == key).map(|e| &e.metrics)
    }
}

/// Stateful rate computation for one domain. Each engine owns its history
/// exclusively; passes must be serialized by the caller.
pub struct RateEngine<D: CounterDomain> {
    history: HistoryStore<HistoryEntry<D::Counters, D::Metrics>>,
    policy: OwnerPolicy,
    report: PassReport<D::Metrics>,
}

impl<D: CounterDomain> RateEngine<D> {
    pub fn new(policy: OwnerPolicy) -> Self {
        Self {
            history: HistoryStore::new(),
            policy,
            report: PassReport::empty(D::NAME),
        }
    }

    /// Run one collection pass over the current raw read. Entities missing
    /// from `snapshots` keep their stale history untouched.
    pub fn collect<I>(&mut self, snapshots: I) -> &PassReport<D::Metrics>
    where
        I: IntoIterator<Item = Snapshot<D::Counters>>,
    {
        let mut seen = HashSet::new();
        let mut entities = Vec::new();
        let mut classes = Vec::new();

        for snapshot in snapshots {
            if !seen.insert(snapshot.key.clone()) {
                warn!("{}: duplicate entity {} in one read, skipped", D::NAME, snapshot.key);
                continue;
            }

            let key = snapshot.key.clone();
            let class = D::class(&snapshot.counters);
            let (entry, outcome) = compute::<D>(self.history.get(&key), snapshot);

            entities.push(EntityMetrics {
                key: key.clone(),
                outcome,
                metrics: entry.metrics.clone(),
            });
            classes.push(class);
            self.history.put(&key, entry);
        }

        let aggregate = aggregate(
            entities
                .iter()
                .zip(&classes)
                .map(|(e, class)| (e.key.as_str(), &e.metrics, *class)),
            D::PEAKS,
            self.policy,
        );

        let pass = self.report.pass + 1;
        debug!(
            "{} pass {}: {} entities ({} known)",
            D::NAME,
            pass,
            entities.len(),
            self.history.len()
        );

        self.report = PassReport {
            domain: D::NAME,
            pass,
            entities,
            aggregate,
        };
        &self.report
    }

    pub fn report(&self) -> &PassReport<D::Metrics> {
        &self.report
    }

    pub fn entry(&self, key: &str) -> Option<&HistoryEntry<D::Counters, D::Metrics>> {
        self.history.get(key)
    }

    /// Entity keys in first-seen order, the basis of index addressing.
    pub fn keys(&self) -> &[String] {
        self.history.keys()
    }

    pub fn key_at(&self, index: usize) -> Option<&str> {
        self.history.key_at(index)
    }

    pub fn policy(&self) -> OwnerPolicy {
        self.policy
    }
}

impl<D: CounterDomain> Default for RateEngine<D> {
    fn default() -> Self {
        Self::new(OwnerPolicy::default())
    }
}
