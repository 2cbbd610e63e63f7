use crate::domain::{Network, NetworkCounters, NetworkMetrics, OwnerPolicy, PassReport, RateEngine, Snapshot};
use anyhow::{Context, Result};
use log::{debug, warn};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::process::Command;
use std::time::{Duration, Instant, SystemTime};

const PROC_NET_DEV: &str = "/proc/net/dev";

/// Link speeds rarely change; re-probing them every pass would fork
/// `ethtool` once per interface.
const CACHE_DURATION: Duration = Duration::from_secs(30);

/// Per-interface counters from `/proc/net/dev`, in file order. Address and
/// link speed are filled in later.
pub fn parse_net_dev(contents: &str) -> Vec<(String, NetworkCounters)> {
    let mut interfaces = Vec::new();

    for line in contents.lines() {
        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        let fields = match rest.split_whitespace().map(str::parse::<u64>).collect::<Result<Vec<_>, _>>() {
            Ok(fields) => fields,
            Err(_) => continue,
        };
        if fields.len() != 16 {
            continue;
        }

        interfaces.push((
            name.trim().to_string(),
            NetworkCounters {
                rx_bytes: fields[0],
                rx_packets: fields[1],
                rx_errors: fields[2],
                tx_bytes: fields[8],
                tx_packets: fields[9],
                tx_errors: fields[10],
                address: None,
                speed_mbps: None,
            },
        ));
    }

    interfaces
}

/// Picks the address an interface is monitored under. Interfaces with no
/// IPv4 address, or bound to the wildcard or loopback address, are not
/// monitored.
pub fn monitored_address(addresses: &[Ipv4Addr]) -> Option<Ipv4Addr> {
    if addresses
        .iter()
        .any(|a| a.is_unspecified() || *a == Ipv4Addr::LOCALHOST)
    {
        return None;
    }
    addresses.first().copied()
}

/// `Speed: 1000Mb/s` line of `ethtool <if>` output.
pub fn parse_ethtool_speed(output: &str) -> Option<f64> {
    output.lines().find_map(|line| {
        let value = line.trim().strip_prefix("Speed:")?;
        value.trim().trim_end_matches("Mb/s").parse::<f64>().ok()
    })
}

/// Contents of `/sys/class/net/<if>/speed`; `-1` means unknown.
pub fn parse_sysfs_speed(contents: &str) -> Option<f64> {
    let speed: f64 = contents.trim().parse().ok()?;
    (speed > 0.0).then_some(speed)
}

fn interface_addresses() -> Result<HashMap<String, Vec<Ipv4Addr>>> {
    let mut addresses: HashMap<String, Vec<Ipv4Addr>> = HashMap::new();
    for ifaddr in nix::ifaddrs::getifaddrs().context("getifaddrs failed")? {
        let Some(sin) = ifaddr.address.as_ref().and_then(|a| a.as_sockaddr_in()) else {
            continue;
        };
        addresses
            .entry(ifaddr.interface_name.clone())
            .or_default()
            .push(sin.ip());
    }
    Ok(addresses)
}

fn probe_speed(name: &str) -> Option<f64> {
    let sysfs = format!("/sys/class/net/{}/speed", name);
    if let Some(speed) = std::fs::read_to_string(&sysfs).ok().as_deref().and_then(parse_sysfs_speed) {
        return Some(speed);
    }

    let output = Command::new("ethtool").arg(name).output().ok()?;
    parse_ethtool_speed(&String::from_utf8_lossy(&output.stdout))
}

pub struct NetworkCollector {
    engine: RateEngine<Network>,
    speeds: HashMap<String, Option<f64>>,
    last_speed_probe: Option<Instant>,
}

impl NetworkCollector {
    pub fn new(policy: OwnerPolicy) -> Self {
        Self {
            engine: RateEngine::new(policy),
            speeds: HashMap::new(),
            last_speed_probe: None,
        }
    }

    pub fn collect(&mut self) -> Result<&PassReport<NetworkMetrics>> {
        let contents = std::fs::read_to_string(PROC_NET_DEV)
            .with_context(|| format!("Failed to read {}", PROC_NET_DEV))?;
        let addresses = interface_addresses()?;

        let stale = self
            .last_speed_probe
            .map_or(true, |t| t.elapsed() >= CACHE_DURATION);
        if stale {
            self.speeds.clear();
            self.last_speed_probe = Some(Instant::now());
        }

        let mut speeds = std::mem::take(&mut self.speeds);
        self.update(&contents, &addresses, SystemTime::now(), |name| {
            *speeds.entry(name.to_string()).or_insert_with(|| {
                let speed = probe_speed(name);
                if speed.is_none() {
                    debug!("{}: link speed unknown", name);
                }
                speed
            })
        });
        self.speeds = speeds;

        Ok(self.engine.report())
    }

    /// Run one pass over `/proc/net/dev` contents, with bound addresses and
    /// a link speed lookup supplied by the caller.
    pub fn update(
        &mut self,
        net_dev: &str,
        addresses: &HashMap<String, Vec<Ipv4Addr>>,
        now: SystemTime,
        mut speed_of: impl FnMut(&str) -> Option<f64>,
    ) -> &PassReport<NetworkMetrics> {
        let interfaces = parse_net_dev(net_dev);
        if interfaces.is_empty() {
            warn!("{} listed no interfaces", PROC_NET_DEV);
        }

        let snapshots: Vec<_> = interfaces
            .into_iter()
            .filter_map(|(name, mut counters)| {
                let bound = addresses.get(&name).map(Vec::as_slice).unwrap_or_default();
                let Some(address) = monitored_address(bound) else {
                    debug!("{}: not monitored (addresses {:?})", name, bound);
                    return None;
                };
                counters.address = Some(address);
                counters.speed_mbps = speed_of(&name);
                Some(Snapshot::new(name, now, counters))
            })
            .collect();

        self.engine.collect(snapshots)
    }

    pub fn engine(&self) -> &RateEngine<Network> {
        &self.engine
    }
}

impl Default for NetworkCollector {
    fn default() -> Self {
        Self::new(OwnerPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::network::{CLASS_EXTERNAL, CLASS_INTERNAL};
    use std::time::UNIX_EPOCH;

    const NET_DEV_A: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 5000 50 0 0 0 0 0 0 5000 50 0 0 0 0 0 0
  eth0: 1000000 1000 0 0 0 0 0 0 2000000 2000 0 0 0 0 0 0
  eth1: 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0
 dummy0: 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0
";

    const NET_DEV_B: &str = "\
    lo: 9000 90 0 0 0 0 0 0 9000 90 0 0 0 0 0 0
  eth0: 1125000 1100 10 0 0 0 0 0 2000000 2000 0 0 0 0 0 0
  eth1: 500 10 0 0 0 0 0 0 500 10 1 0 0 0 0 0
 dummy0: 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0
";

    fn bound() -> HashMap<String, Vec<Ipv4Addr>> {
        HashMap::from([
            ("lo".to_string(), vec![Ipv4Addr::LOCALHOST]),
            ("eth0".to_string(), vec![Ipv4Addr::new(203, 0, 113, 10)]),
            ("eth1".to_string(), vec![Ipv4Addr::new(10, 0, 0, 2)]),
        ])
    }

    #[test]
    fn net_dev_lines_need_sixteen_counters() {
        let interfaces = parse_net_dev(NET_DEV_A);
        let names: Vec<&str> = interfaces.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["lo", "eth0", "eth1", "dummy0"]);
        assert_eq!(interfaces[1].1.tx_bytes, 2_000_000);
        assert!(parse_net_dev("eth9: 1 2 3\n").is_empty());
    }

    #[test]
    fn wildcard_loopback_and_unbound_interfaces_are_skipped() {
        assert_eq!(monitored_address(&[]), None);
        assert_eq!(monitored_address(&[Ipv4Addr::LOCALHOST]), None);
        assert_eq!(monitored_address(&[Ipv4Addr::UNSPECIFIED]), None);
        let a = Ipv4Addr::new(192, 168, 0, 4);
        assert_eq!(monitored_address(&[a, Ipv4Addr::new(192, 168, 0, 5)]), Some(a));
    }

    #[test]
    fn speed_sources() {
        assert_eq!(parse_sysfs_speed("10000\n"), Some(10000.0));
        assert_eq!(parse_sysfs_speed("-1\n"), None);
        let ethtool = "Settings for eth0:\n\tSupported ports: [ TP ]\n\tSpeed: 1000Mb/s\n\tDuplex: Full\n";
        assert_eq!(parse_ethtool_speed(ethtool), Some(1000.0));
        assert_eq!(parse_ethtool_speed("\tSpeed: Unknown!\n"), None);
    }

    #[test]
    fn pass_over_monitored_interfaces() {
        let mut collector = NetworkCollector::default();
        let speed = |name: &str| (name == "eth0").then_some(1000.0);
        collector.update(NET_DEV_A, &bound(), UNIX_EPOCH, speed);
        let report = collector.update(NET_DEV_B, &bound(), UNIX_EPOCH + Duration::from_secs(1), speed);

        let eth0 = report.entity("eth0").unwrap();
        assert_eq!(eth0.rx_bytes_per_sec, 125_000.0);
        assert_eq!(eth0.rx_error_rate, 0.1);
        assert!((eth0.rx_util_pct - 0.095367).abs() < 1e-6);

        let agg = &report.aggregate;
        assert_eq!(agg.class_sum(CLASS_EXTERNAL, "rx_bytes_per_sec"), Some(125_000.0));
        assert_eq!(agg.class_sum(CLASS_INTERNAL, "tx_error_rate"), Some(0.1));
        assert_eq!(agg.class_sum(CLASS_EXTERNAL, "tx_error_rate"), Some(0.0));
        assert_eq!(agg.peak("rx_util_pct").unwrap().owner.as_deref(), Some("eth0"));

        assert_eq!(collector.engine().keys(), &["eth0", "eth1"]);
    }
}
