use crate::domain::aggregate::MetricSet;
use crate::domain::engine::CounterDomain;
use crate::domain::rate::{ratio, Interval};
use serde::Serialize;
use std::net::Ipv4Addr;

pub const CLASS_INTERNAL: &str = "internal";
pub const CLASS_EXTERNAL: &str = "external";

/// Cumulative interface counters from `/proc/net/dev`, plus the link
/// attributes observed alongside them.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NetworkCounters {
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errors: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    /// First IPv4 address bound to the interface.
    pub address: Option<Ipv4Addr>,
    /// Negotiated link speed in Mb/s, when known.
    pub speed_mbps: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NetworkMetrics {
    pub rx_bytes_per_sec: f64,
    pub rx_packets_per_sec: f64,
    /// Errors per received packet (a fraction, not a percentage).
    pub rx_error_rate: f64,
    pub tx_bytes_per_sec: f64,
    pub tx_packets_per_sec: f64,
    pub tx_error_rate: f64,
    pub rx_util_pct: f64,
    pub tx_util_pct: f64,
}

impl MetricSet for NetworkMetrics {
    const NAMES: &'static [&'static str] = &[
        "rx_bytes_per_sec",
        "rx_packets_per_sec",
        "rx_error_rate",
        "tx_bytes_per_sec",
        "tx_packets_per_sec",
        "tx_error_rate",
        "rx_util_pct",
        "tx_util_pct",
    ];

    fn values(&self) -> Vec<f64> {
        vec![
            self.rx_bytes_per_sec,
            self.rx_packets_per_sec,
            self.rx_error_rate,
            self.tx_bytes_per_sec,
            self.tx_packets_per_sec,
            self.tx_error_rate,
            self.rx_util_pct,
            self.tx_util_pct,
        ]
    }
}

/// Share of the link consumed by `bytes_per_sec`, with 1 Mb = 1024*1024 bits.
pub fn link_utilization(bytes_per_sec: f64, speed_mbps: Option<f64>) -> f64 {
    match speed_mbps {
        Some(speed) if speed > 0.0 => bytes_per_sec * 8.0 * 100.0 / (speed * 1024.0 * 1024.0),
        _ => 0.0,
    }
}

/// Loopback and RFC 1918 addresses count as internal; no address at all
/// counts as external.
pub fn is_internal(address: Option<Ipv4Addr>) -> bool {
    address.is_some_and(|a| a.is_private() || a.is_loopback())
}

pub struct Network;

impl CounterDomain for Network {
    const NAME: &'static str = "network";
    const PEAKS: &'static [&'static str] = &["rx_error_rate", "tx_error_rate", "rx_util_pct", "tx_util_pct"];

    type Counters = NetworkCounters;
    type Metrics = NetworkMetrics;

    fn derive(interval: &Interval<'_, NetworkCounters>) -> NetworkMetrics {
        let rx_packets = interval.delta(|c| c.rx_packets);
        let tx_packets = interval.delta(|c| c.tx_packets);
        let rx_bytes_per_sec = interval.rate(|c| c.rx_bytes);
        let tx_bytes_per_sec = interval.rate(|c| c.tx_bytes);
        let speed = interval.current.speed_mbps;

        NetworkMetrics {
            rx_bytes_per_sec,
            rx_packets_per_sec: interval.rate_of(rx_packets),
            rx_error_rate: ratio(interval.delta(|c| c.rx_errors), rx_packets),
            tx_bytes_per_sec,
            tx_packets_per_sec: interval.rate_of(tx_packets),
            tx_error_rate: ratio(interval.delta(|c| c.tx_errors), tx_packets),
            rx_util_pct: link_utilization(rx_bytes_per_sec, speed),
            tx_util_pct: link_utilization(tx_bytes_per_sec, speed),
        }
    }

    fn class(counters: &NetworkCounters) -> Option<&'static str> {
        Some(if is_internal(counters.address) {
            CLASS_INTERNAL
        } else {
            CLASS_EXTERNAL
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::engine::RateEngine;
    use crate::domain::snapshot::Snapshot;
    use std::time::{Duration, UNIX_EPOCH};

    fn reading(key: &str, secs: u64, c: NetworkCounters) -> Snapshot<NetworkCounters> {
        Snapshot::new(key, UNIX_EPOCH + Duration::from_secs(secs), c)
    }

    #[test]
    fn eth0_inbound_scenario() {
        let mut engine = RateEngine::<Network>::default();
        let link = NetworkCounters {
            speed_mbps: Some(1000.0),
            ..Default::default()
        };
        engine.collect([reading("eth0", 0, link.clone())]);
        let report = engine.collect([reading(
            "eth0",
            1,
            NetworkCounters {
                rx_bytes: 125_000,
                rx_packets: 100,
                ..link
            },
        )]);

        let m = report.entity("eth0").unwrap();
        assert_eq!(m.rx_bytes_per_sec, 125_000.0);
        assert_eq!(m.rx_packets_per_sec, 100.0);
        assert!((m.rx_util_pct - 0.095367).abs() < 1e-6, "got {}", m.rx_util_pct);
        assert_eq!(m.tx_util_pct, 0.0);
    }

    #[test]
    fn error_rate_is_errors_per_packet_in_the_same_pass() {
        let prev = NetworkCounters {
            rx_packets: 1000,
            rx_errors: 5,
            tx_packets: 50,
            tx_errors: 1,
            ..Default::default()
        };
        let curr = NetworkCounters {
            rx_packets: 1200,
            rx_errors: 15,
            tx_packets: 50,
            tx_errors: 3,
            ..Default::default()
        };
        let m = Network::derive(&Interval::new(&prev, &curr, 1.0));
        assert_eq!(m.rx_error_rate, 0.05);
        // No transmitted packets: zero denominator.
        assert_eq!(m.tx_error_rate, 0.0);
    }

    #[test]
    fn receive_counters_reset_through_the_engine() {
        let mut engine = RateEngine::<Network>::default();
        engine.collect([reading(
            "eth0",
            0,
            NetworkCounters {
                rx_bytes: 1000,
                rx_packets: 10,
                rx_errors: 2,
                tx_bytes: 500,
                tx_packets: 5,
                ..Default::default()
            },
        )]);
        let report = engine.collect([reading(
            "eth0",
            1,
            NetworkCounters {
                rx_bytes: 200,
                rx_packets: 2,
                tx_bytes: 1500,
                tx_packets: 15,
                ..Default::default()
            },
        )]);

        let m = report.entity("eth0").unwrap();
        assert_eq!(m.rx_bytes_per_sec, 0.0);
        assert_eq!(m.rx_packets_per_sec, 0.0);
        assert_eq!(m.rx_error_rate, 0.0);
        assert_eq!(m.tx_bytes_per_sec, 1000.0);
        assert_eq!(m.tx_packets_per_sec, 10.0);

        let report = engine.collect([reading(
            "eth0",
            2,
            NetworkCounters {
                rx_bytes: 1200,
                rx_packets: 12,
                tx_bytes: 1500,
                tx_packets: 15,
                ..Default::default()
            },
        )]);
        let m = report.entity("eth0").unwrap();
        assert_eq!(m.rx_bytes_per_sec, 1000.0);
        assert_eq!(m.rx_packets_per_sec, 10.0);
    }

    #[test]
    fn unknown_link_speed_has_no_utilization() {
        assert_eq!(link_utilization(1e6, None), 0.0);
        assert_eq!(link_utilization(1e6, Some(0.0)), 0.0);
    }

    #[test]
    fn classification_by_bound_address() {
        assert!(is_internal(Some(Ipv4Addr::new(10, 1, 2, 3))));
        assert!(is_internal(Some(Ipv4Addr::new(172, 20, 0, 1))));
        assert!(is_internal(Some(Ipv4Addr::new(192, 168, 1, 9))));
        assert!(is_internal(Some(Ipv4Addr::new(127, 0, 0, 1))));
        assert!(!is_internal(Some(Ipv4Addr::new(8, 8, 8, 8))));
        assert!(!is_internal(Some(Ipv4Addr::new(172, 32, 0, 1))));
        assert!(!is_internal(None));
    }

    #[test]
    fn outbound_errors_are_summed_into_their_own_class() {
        let mut engine = RateEngine::<Network>::default();
        let public = Some(Ipv4Addr::new(203, 0, 113, 7));
        let private = Some(Ipv4Addr::new(10, 0, 0, 7));
        engine.collect([
            reading("eth0", 0, NetworkCounters { address: public, ..Default::default() }),
            reading("eth1", 0, NetworkCounters { address: private, ..Default::default() }),
        ]);
        let report = engine.collect([
            reading(
                "eth0",
                10,
                NetworkCounters {
                    address: public,
                    tx_packets: 100,
                    tx_errors: 10,
                    ..Default::default()
                },
            ),
            reading("eth1", 10, NetworkCounters { address: private, ..Default::default() }),
        ]);

        let agg = &report.aggregate;
        assert_eq!(agg.class_sum(CLASS_EXTERNAL, "tx_error_rate"), Some(0.1));
        assert_eq!(agg.class_sum(CLASS_INTERNAL, "tx_error_rate"), Some(0.0));
        assert_eq!(agg.peak("tx_error_rate").unwrap().owner.as_deref(), Some("eth0"));
    }
}
