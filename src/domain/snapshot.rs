use std::time::SystemTime;

/// One timestamped reading of every counter for a single entity.
#[derive(Clone, Debug)]
pub struct Snapshot<C> {
    pub key: String,
    pub timestamp: SystemTime,
    pub counters: C,
}

impl<C> Snapshot<C> {
    pub fn new(key: impl Into<String>, timestamp: SystemTime, counters: C) -> Self {
        Self {
            key: key.into(),
            timestamp,
            counters,
        }
    }
}

/// Seconds from `prev` to `curr`, or `None` when the clock went backward or
/// both readings carry the same timestamp.
pub fn elapsed_between(prev: SystemTime, curr: SystemTime) -> Option<f64> {
    match curr.duration_since(prev) {
        Ok(d) if !d.is_zero() => Some(d.as_secs_f64()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn elapsed_is_none_for_equal_and_backward_clocks() {
        let t = UNIX_EPOCH + Duration::from_secs(100);
        assert_eq!(elapsed_between(t, t), None);
        assert_eq!(elapsed_between(t, t - Duration::from_secs(1)), None);
    }

    #[test]
    fn elapsed_tolerates_sub_second_intervals() {
        let t = UNIX_EPOCH + Duration::from_secs(100);
        let later = t + Duration::from_millis(250);
        assert_eq!(elapsed_between(t, later), Some(0.25));
    }
}
