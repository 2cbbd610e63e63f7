//! Delta and rate arithmetic between two readings of the same entity.
//!
//! Every guard here resolves to zero instead of an error: a first sighting,
//! a clock that did not advance, a counter that went backward and an empty
//! denominator are all ordinary conditions for a sampler.

use crate::domain::engine::CounterDomain;
use crate::domain::snapshot::{elapsed_between, Snapshot};
use log::debug;
use serde::Serialize;
use std::cell::Cell;

/// Difference between two readings of a monotonic counter. `None` when the
/// counter went backward (reset, wrap, remount).
pub fn counter_delta(prev: u64, curr: u64) -> Option<u64> {
    curr.checked_sub(prev)
}

/// Sum of several deltas from the same pass; unusable if any part is.
pub fn sum(deltas: &[Option<u64>]) -> Option<u64> {
    deltas
        .iter()
        .try_fold(0u64, |acc, d| d.and_then(|d| acc.checked_add(d)))
}

/// `num / den`, zero when either side is unusable or the denominator is zero.
pub fn ratio(num: Option<u64>, den: Option<u64>) -> f64 {
    match (num, den) {
        (Some(n), Some(d)) if d > 0 => n as f64 / d as f64,
        _ => 0.0,
    }
}

pub fn percent(num: Option<u64>, den: Option<u64>) -> f64 {
    ratio(num, den) * 100.0
}

/// The previous and current counters of one entity over one interval.
/// `compute` only builds these for a strictly positive elapsed time.
pub struct Interval<'a, C> {
    pub previous: &'a C,
    pub current: &'a C,
    pub elapsed_secs: f64,
    resets: Cell<u32>,
}

impl<'a, C> Interval<'a, C> {
    pub fn new(previous: &'a C, current: &'a C, elapsed_secs: f64) -> Self {
        Self {
            previous,
            current,
            elapsed_secs,
            resets: Cell::new(0),
        }
    }

    pub fn delta(&self, field: impl Fn(&C) -> u64) -> Option<u64> {
        let delta = counter_delta(field(self.previous), field(self.current));
        if delta.is_none() {
            self.resets.set(self.resets.get() + 1);
        }
        delta
    }

    /// Per-second rate of one counter field.
    pub fn rate(&self, field: impl Fn(&C) -> u64) -> f64 {
        self.rate_of(self.delta(field))
    }

    /// `Interval::new` takes any elapsed time, so a non-positive one is
    /// guarded here as well as in `compute`.
    pub fn rate_of(&self, delta: Option<u64>) -> f64 {
        match delta {
            Some(d) if self.elapsed_secs > 0.0 => d as f64 / self.elapsed_secs,
            _ => 0.0,
        }
    }

    /// Number of fields seen going backward so far.
    pub fn resets(&self) -> u32 {
        self.resets.get()
    }
}

/// What a single `compute` call did with the new reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// First sighting; baseline stored, metrics are zero.
    Bootstrapped,
    /// Metrics derived from the interval since the previous reading.
    Measured,
    /// The clock did not advance; metrics are zero for this pass.
    Stalled,
}

/// Last-seen reading of an entity plus the metrics last derived for it.
#[derive(Clone, Debug)]
pub struct HistoryEntry<C, M> {
    pub baseline: Snapshot<C>,
    pub metrics: M,
    pub outcome: Outcome,
    /// Whether any pass has produced a measured interval for this entity.
    pub warmed: bool,
}

/// Fold a new reading into an entity's state. The returned entry always
/// carries `current` as its baseline, whatever the outcome.
pub fn compute<D: CounterDomain>(
    previous: Option<&HistoryEntry<D::Counters, D::Metrics>>,
    current: Snapshot<D::Counters>,
) -> (HistoryEntry<D::Counters, D::Metrics>, Outcome) {
    let Some(previous) = previous else {
        debug!("{} {}: first sample, baseline stored", D::NAME, current.key);
        return (
            HistoryEntry {
                baseline: current,
                metrics: D::Metrics::default(),
                outcome: Outcome::Bootstrapped,
                warmed: false,
            },
            Outcome::Bootstrapped,
        );
    };

    let Some(elapsed) = elapsed_between(previous.baseline.timestamp, current.timestamp) else {
        debug!("{} {}: clock did not advance, rates zeroed", D::NAME, current.key);
        return (
            HistoryEntry {
                baseline: current,
                metrics: D::Metrics::default(),
                outcome: Outcome::Stalled,
                warmed: previous.warmed,
            },
            Outcome::Stalled,
        );
    };

    let interval = Interval::new(&previous.baseline.counters, &current.counters, elapsed);
    let metrics = D::derive(&interval);
    if interval.resets() > 0 {
        debug!(
            "{} {}: {} counter(s) went backward, treated as zero this pass",
            D::NAME,
            current.key,
            interval.resets()
        );
    }

    (
        HistoryEntry {
            baseline: current,
            metrics,
            outcome: Outcome::Measured,
            warmed: true,
        },
        Outcome::Measured,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregate::MetricSet;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    #[derive(Clone, Debug)]
    struct Bytes(u64);

    #[derive(Clone, Debug, Default, PartialEq)]
    struct ByteRate {
        per_sec: f64,
    }

    impl MetricSet for ByteRate {
        const NAMES: &'static [&'static str] = &["per_sec"];

        fn values(&self) -> Vec<f64> {
            vec![self.per_sec]
        }
    }

    struct Probe;

    impl CounterDomain for Probe {
        const NAME: &'static str = "probe";
        const PEAKS: &'static [&'static str] = &["per_sec"];
        type Counters = Bytes;
        type Metrics = ByteRate;

        fn derive(interval: &Interval<'_, Bytes>) -> ByteRate {
            ByteRate {
                per_sec: interval.rate(|c| c.0),
            }
        }
    }

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn snap(secs: u64, value: u64) -> Snapshot<Bytes> {
        Snapshot::new("x", at(secs), Bytes(value))
    }

    #[test]
    fn first_sighting_bootstraps_with_zero_metrics() {
        let (entry, outcome) = compute::<Probe>(None, snap(0, 500));
        assert_eq!(outcome, Outcome::Bootstrapped);
        assert_eq!(entry.metrics, ByteRate::default());
        assert!(!entry.warmed);
        assert_eq!(entry.baseline.counters.0, 500);
    }

    #[test]
    fn second_sighting_is_delta_over_elapsed() {
        let (first, _) = compute::<Probe>(None, snap(0, 500));
        let (second, outcome) = compute::<Probe>(Some(&first), snap(4, 900));
        assert_eq!(outcome, Outcome::Measured);
        assert_eq!(second.metrics.per_sec, 100.0);
        assert!(second.warmed);
    }

    #[test]
    fn counter_going_backward_yields_zero_rate() {
        let (first, _) = compute::<Probe>(None, snap(0, 100));
        let (second, outcome) = compute::<Probe>(Some(&first), snap(10, 90));
        assert_eq!(outcome, Outcome::Measured);
        assert_eq!(second.metrics.per_sec, 0.0);
        // The reset reading becomes the new baseline.
        let (third, _) = compute::<Probe>(Some(&second), snap(20, 190));
        assert_eq!(third.metrics.per_sec, 10.0);
    }

    #[test]
    fn zero_elapsed_never_divides() {
        let (first, _) = compute::<Probe>(None, snap(5, 100));
        let (second, outcome) = compute::<Probe>(Some(&first), snap(5, 1_000_000));
        assert_eq!(outcome, Outcome::Stalled);
        assert_eq!(second.metrics.per_sec, 0.0);
        assert_eq!(second.baseline.counters.0, 1_000_000);
    }

    #[test]
    fn stalled_clock_zeroes_rates_after_a_measured_pass() {
        let (first, _) = compute::<Probe>(None, snap(0, 0));
        let (second, _) = compute::<Probe>(Some(&first), snap(2, 200));
        assert_eq!(second.metrics.per_sec, 100.0);

        let (third, outcome) = compute::<Probe>(Some(&second), snap(1, 400));
        assert_eq!(outcome, Outcome::Stalled);
        assert_eq!(third.metrics.per_sec, 0.0);
        assert!(third.warmed);
        assert_eq!(third.baseline.counters.0, 400);
    }

    #[test]
    fn interval_built_directly_guards_its_own_elapsed_time() {
        let (a, b) = (Bytes(0), Bytes(10));
        assert_eq!(Interval::new(&a, &b, 0.0).rate(|c| c.0), 0.0);
        assert_eq!(Interval::new(&a, &b, -1.0).rate_of(Some(10)), 0.0);
        assert_eq!(Interval::new(&a, &b, 0.5).rate(|c| c.0), 20.0);
    }

    #[test]
    fn ratio_guards_zero_and_unusable_denominators() {
        assert_eq!(ratio(Some(5), Some(0)), 0.0);
        assert_eq!(ratio(None, Some(10)), 0.0);
        assert_eq!(ratio(Some(5), None), 0.0);
        assert_eq!(percent(Some(1), Some(4)), 25.0);
        assert_eq!(sum(&[Some(1), Some(2)]), Some(3));
        assert_eq!(sum(&[Some(1), None]), None);
    }
}
