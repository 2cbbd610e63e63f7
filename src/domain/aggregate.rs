use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// A per-entity set of derived values addressable by name.
///
/// `values()` must return one value per entry of `NAMES`, in the same order.
pub trait MetricSet: Clone + Debug + Default {
    const NAMES: &'static [&'static str];

    fn values(&self) -> Vec<f64>;

    fn get(&self, name: &str) -> Option<f64> {
        let idx = Self::NAMES.iter().position(|n| *n == name)?;
        self.values().get(idx).copied()
    }
}

/// How a linear max-scan picks the owner of a peak.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerPolicy {
    /// Greater-or-equal scan from zero: the last entity equal to the maximum
    /// wins, so an all-zero pass reports the last entity as owner.
    #[default]
    LastOnTie,
    /// Strictly-greater scan from zero: no owner until some entity reports a
    /// positive value.
    RequirePositive,
}

/// Highest value of one metric in a pass and the entity that reported it.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Peak {
    pub value: f64,
    pub owner: Option<String>,
}

impl Peak {
    pub fn scan<'a>(items: impl IntoIterator<Item = (&'a str, f64)>, policy: OwnerPolicy) -> Self {
        let mut peak = Peak::default();
        for (key, value) in items {
            let take = match policy {
                OwnerPolicy::LastOnTie => value >= peak.value,
                OwnerPolicy::RequirePositive => value > peak.value,
            };
            if take {
                peak.value = value;
                peak.owner = Some(key.to_string());
            }
        }
        peak
    }
}

/// Running sums over a set of entities.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Totals {
    pub count: usize,
    pub sums: Vec<f64>,
}

impl Totals {
    fn with_width(width: usize) -> Self {
        Self {
            count: 0,
            sums: vec![0.0; width],
        }
    }

    fn add(&mut self, values: &[f64]) {
        self.count += 1;
        for (sum, value) in self.sums.iter_mut().zip(values) {
            *sum += value;
        }
    }

    pub fn means(&self) -> Vec<f64> {
        if self.count == 0 {
            return vec![0.0; self.sums.len()];
        }
        let n = self.count as f64;
        self.sums.iter().map(|s| s / n).collect()
    }
}

/// Cross-entity rollup of one collection pass.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AggregateResult {
    pub names: &'static [&'static str],
    pub totals: Totals,
    pub classes: BTreeMap<&'static str, Totals>,
    pub peaks: Vec<(&'static str, Peak)>,
}

impl AggregateResult {
    pub fn empty<M: MetricSet>() -> Self {
        Self {
            names: M::NAMES,
            totals: Totals::with_width(M::NAMES.len()),
            classes: BTreeMap::new(),
            peaks: Vec::new(),
        }
    }

    /// Entities observed in the pass.
    pub fn count(&self) -> usize {
        self.totals.count
    }

    fn index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| *n == name)
    }

    pub fn sum(&self, name: &str) -> Option<f64> {
        self.index(name).map(|i| self.totals.sums[i])
    }

    pub fn mean(&self, name: &str) -> Option<f64> {
        self.index(name).map(|i| self.totals.means()[i])
    }

    pub fn class_sum(&self, class: &str, name: &str) -> Option<f64> {
        let idx = self.index(name)?;
        Some(self.classes.get(class).map(|t| t.sums[idx]).unwrap_or(0.0))
    }

    pub fn peak(&self, name: &str) -> Option<&Peak> {
        self.peaks.iter().find(|(n, _)| *n == name).map(|(_, p)| p)
    }

    /// The designated peak of the domain, the first one configured.
    pub fn busiest(&self) -> Option<&Peak> {
        self.peaks.first().map(|(_, p)| p)
    }
}

/// Fold one pass's per-entity metrics into a fresh rollup. Entities are
/// scanned in the order given, which decides tie-breaks.
pub fn aggregate<'a, M: MetricSet + 'a>(
    entities: impl IntoIterator<Item = (&'a str, &'a M, Option<&'static str>)>,
    peak_names: &[&'static str],
    policy: OwnerPolicy,
) -> AggregateResult {
    let mut result = AggregateResult::empty::<M>();
    let width = M::NAMES.len();

    let rows: Vec<(&str, Vec<f64>)> = entities
        .into_iter()
        .map(|(key, metrics, class)| {
            let values = metrics.values();
            result.totals.add(&values);
            if let Some(class) = class {
                result
                    .classes
                    .entry(class)
                    .or_insert_with(|| Totals::with_width(width))
                    .add(&values);
            }
            (key, values)
        })
        .collect();

    for name in peak_names {
        let Some(idx) = M::NAMES.iter().position(|n| n == name) else {
            continue;
        };
        let peak = Peak::scan(rows.iter().map(|(key, values)| (*key, values[idx])), policy);
        result.peaks.push((*name, peak));
    }

    result
}
