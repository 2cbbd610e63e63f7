//! Read-only, by-name and by-index access to the results of the last pass.
//!
//! Entity indexes follow first-seen order and never shift, so an agent that
//! polls "disk 2" keeps addressing the same partition for the lifetime of
//! the process.

use crate::domain::{AggregateResult, CounterDomain, MetricSet, Network, Peak, RateEngine};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::net::Ipv4Addr;
use thiserror::Error;

pub type MetricMap = BTreeMap<String, f64>;

#[derive(Debug, Error, PartialEq)]
pub enum LookupError {
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("entity index {index} out of range ({len} known)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("entity '{0}' has no rate yet")]
    WarmingUp(String),

    #[error("unknown metric '{0}'")]
    UnknownMetric(String),
}

pub fn metric_map<M: MetricSet>(metrics: &M) -> MetricMap {
    M::NAMES
        .iter()
        .zip(metrics.values())
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

fn named(names: &[&str], values: &[f64]) -> MetricMap {
    names
        .iter()
        .zip(values)
        .map(|(name, value)| (name.to_string(), *value))
        .collect()
}

pub struct QueryView<'a, D: CounterDomain> {
    engine: &'a RateEngine<D>,
}

impl<'a, D: CounterDomain> QueryView<'a, D> {
    pub fn new(engine: &'a RateEngine<D>) -> Self {
        Self { engine }
    }

    pub fn keys(&self) -> &'a [String] {
        self.engine.keys()
    }

    /// Last metrics computed for `key`. Entities that dropped out of the
    /// raw read report their stale values.
    pub fn entity(&self, key: &str) -> Result<MetricMap, LookupError> {
        let entry = self
            .engine
            .entry(key)
            .ok_or_else(|| LookupError::UnknownEntity(key.to_string()))?;
        if !entry.warmed {
            return Err(LookupError::WarmingUp(key.to_string()));
        }
        Ok(metric_map(&entry.metrics))
    }

    pub fn entity_at(&self, index: usize) -> Result<MetricMap, LookupError> {
        let key = self.engine.key_at(index).ok_or(LookupError::IndexOutOfRange {
            index,
            len: self.engine.keys().len(),
        })?;
        self.entity(key)
    }

    pub fn metric(&self, key: &str, name: &str) -> Result<f64, LookupError> {
        self.entity(key)?
            .get(name)
            .copied()
            .ok_or_else(|| LookupError::UnknownMetric(name.to_string()))
    }

    /// One metric across every known entity, in index order. Entities still
    /// warming up report zero.
    pub fn column(&self, name: &str) -> Result<Vec<(String, f64)>, LookupError> {
        if !D::Metrics::NAMES.contains(&name) {
            return Err(LookupError::UnknownMetric(name.to_string()));
        }
        Ok(self
            .keys()
            .iter()
            .filter_map(|key| {
                let entry = self.engine.entry(key)?;
                Some((key.clone(), entry.metrics.get(name).unwrap_or(0.0)))
            })
            .collect())
    }

    pub fn aggregate(&self) -> &'a AggregateResult {
        &self.engine.report().aggregate
    }

    pub fn sums(&self) -> MetricMap {
        let agg = &self.engine.report().aggregate;
        named(agg.names, &agg.totals.sums)
    }

    pub fn means(&self) -> MetricMap {
        let agg = &self.engine.report().aggregate;
        named(agg.names, &agg.totals.means())
    }

    /// Sums over one class of entities; a class with no members this pass
    /// sums to zero.
    pub fn class(&self, class: &str) -> MetricMap {
        let agg = &self.engine.report().aggregate;
        match agg.classes.get(class) {
            Some(totals) => named(agg.names, &totals.sums),
            None => named(agg.names, &vec![0.0; agg.names.len()]),
        }
    }

    pub fn peak(&self, name: &str) -> Result<&'a Peak, LookupError> {
        self.engine
            .report()
            .aggregate
            .peak(name)
            .ok_or_else(|| LookupError::UnknownMetric(name.to_string()))
    }

    pub fn busiest(&self) -> Option<&'a Peak> {
        self.engine.report().aggregate.busiest()
    }
}

/// Bound address and link speed of one interface as last read, with the
/// byte rates last derived for it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LinkDetail {
    pub key: String,
    pub address: Option<Ipv4Addr>,
    pub speed_mbps: Option<f64>,
    pub rx_bytes_per_sec: f64,
    pub tx_bytes_per_sec: f64,
}

impl<'a> QueryView<'a, Network> {
    pub fn link(&self, key: &str) -> Result<LinkDetail, LookupError> {
        let entry = self
            .engine
            .entry(key)
            .ok_or_else(|| LookupError::UnknownEntity(key.to_string()))?;
        let counters = &entry.baseline.counters;
        Ok(LinkDetail {
            key: key.to_string(),
            address: counters.address,
            speed_mbps: counters.speed_mbps,
            rx_bytes_per_sec: entry.metrics.rx_bytes_per_sec,
            tx_bytes_per_sec: entry.metrics.tx_bytes_per_sec,
        })
    }

    pub fn link_at(&self, index: usize) -> Result<LinkDetail, LookupError> {
        let key = self.engine.key_at(index).ok_or(LookupError::IndexOutOfRange {
            index,
            len: self.engine.keys().len(),
        })?;
        self.link(key)
    }

    /// Every known interface in index order, warming ones included.
    pub fn links(&self) -> Vec<LinkDetail> {
        self.keys().iter().filter_map(|key| self.link(key).ok()).collect()
    }
}

/// Exactly zero is sent as `"0"` to keep agent payloads small; everything
/// else carries two decimals.
pub fn format_value(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else {
        format!("{:.2}", value)
    }
}

/// `key|value$key|value$` as consumed by existing agents.
pub fn format_set(items: &[(String, f64)]) -> String {
    let mut out = String::new();
    for (key, value) in items {
        let _ = write!(out, "{}|{:.2}$", key, value);
    }
    if out.is_empty() {
        out.push('$');
    }
    out
}

/// `value,owner`, with an empty owner when none has been reported.
pub fn format_peak(peak: &Peak) -> String {
    format!("{},{}", format_value(peak.value), peak.owner.as_deref().unwrap_or(""))
}

/// `name|address|speed$` per interface. Unknown parts are left empty.
pub fn format_model_set(links: &[LinkDetail]) -> String {
    let mut out = String::new();
    for link in links {
        let address = link.address.map(|a| a.to_string()).unwrap_or_default();
        let speed = link.speed_mbps.map(format_value).unwrap_or_default();
        let _ = write!(out, "{}|{}|{}$", link.key, address, speed);
    }
    out
}

/// `address=name=(rx|tx)$` per interface, byte rates rounded to whole bytes.
pub fn format_byte_set(links: &[LinkDetail]) -> String {
    let mut out = String::new();
    for link in links {
        let address = link.address.map(|a| a.to_string()).unwrap_or_default();
        let _ = write!(
            out,
            "{}={}=({:.0}|{:.0})$",
            address, link.key, link.rx_bytes_per_sec, link.tx_bytes_per_sec
        );
    }
    out
}

/// Per-interface address and speed lines plus the model and byte sets.
pub fn render_links(engine: &RateEngine<Network>) -> String {
    let links = QueryView::new(engine).links();
    let mut out = String::new();

    for (index, link) in links.iter().enumerate() {
        let address = link.address.map(|a| a.to_string()).unwrap_or_default();
        let speed = link.speed_mbps.map(format_value).unwrap_or_default();
        let _ = writeln!(out, "network[{}:{}].address {}", index, link.key, address);
        let _ = writeln!(out, "network[{}:{}].speed_mbps {}", index, link.key, speed);
    }
    let _ = writeln!(out, "network.model_set {}", format_model_set(&links));
    let _ = writeln!(out, "network.byte_set {}", format_byte_set(&links));
    out
}

/// Flat `name value` lines describing one domain's last pass.
pub fn render_text<D: CounterDomain>(engine: &RateEngine<D>) -> String {
    let view = QueryView::new(engine);
    let report = engine.report();
    let mut out = String::new();

    for (name, value) in view.sums() {
        let _ = writeln!(out, "{}.sum.{} {}", D::NAME, name, format_value(value));
    }
    for (name, value) in view.means() {
        let _ = writeln!(out, "{}.avg.{} {}", D::NAME, name, format_value(value));
    }
    for class in report.aggregate.classes.keys() {
        for (name, value) in view.class(class) {
            let _ = writeln!(out, "{}.{}.{} {}", D::NAME, class, name, format_value(value));
        }
    }
    for (name, peak) in &report.aggregate.peaks {
        let _ = writeln!(out, "{}.max.{} {}", D::NAME, name, format_peak(peak));
    }
    for (index, key) in view.keys().iter().enumerate() {
        match view.entity(key) {
            Ok(metrics) => {
                for (name, value) in metrics {
                    let _ = writeln!(out, "{}[{}:{}].{} {}", D::NAME, index, key, name, format_value(value));
                }
            }
            Err(e) => {
                let _ = writeln!(out, "{}[{}:{}] {}", D::NAME, index, key, e);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Disk, DiskCounters, NetworkCounters, OwnerPolicy, Snapshot};
    use std::time::{Duration, UNIX_EPOCH};

    fn reading(key: &str, secs: u64, read_ops: u64) -> Snapshot<DiskCounters> {
        Snapshot::new(
            key,
            UNIX_EPOCH + Duration::from_secs(secs),
            DiskCounters {
                read_ops,
                ..Default::default()
            },
        )
    }

    fn warmed_engine() -> RateEngine<Disk> {
        let mut engine = RateEngine::<Disk>::new(OwnerPolicy::LastOnTie);
        engine.collect([reading("sda", 0, 0), reading("sdb", 0, 0)]);
        engine.collect([reading("sda", 10, 50), reading("sdb", 10, 150)]);
        engine.collect([reading("sda", 20, 100), reading("sdc", 20, 7)]);
        engine
    }

    #[test]
    fn unknown_and_warming_entities_are_distinct() {
        let engine = warmed_engine();
        let view = QueryView::new(&engine);

        assert_eq!(view.entity("sdz"), Err(LookupError::UnknownEntity("sdz".into())));
        assert_eq!(view.entity("sdc"), Err(LookupError::WarmingUp("sdc".into())));
        assert_eq!(view.metric("sda", "read_ops_per_sec"), Ok(5.0));
        assert_eq!(
            view.metric("sda", "bogus"),
            Err(LookupError::UnknownMetric("bogus".into()))
        );
    }

    #[test]
    fn index_addressing_follows_first_seen_order() {
        let engine = warmed_engine();
        let view = QueryView::new(&engine);

        assert_eq!(view.keys(), &["sda".to_string(), "sdb".to_string(), "sdc".to_string()]);
        // sdb left the raw read but keeps its slot and its last values.
        assert_eq!(view.entity_at(1).unwrap()["read_ops_per_sec"], 15.0);
        assert_eq!(
            view.entity_at(3),
            Err(LookupError::IndexOutOfRange { index: 3, len: 3 })
        );
    }

    #[test]
    fn aggregates_use_the_current_pass_only() {
        let engine = warmed_engine();
        let view = QueryView::new(&engine);

        assert_eq!(view.sums()["read_ops_per_sec"], 5.0);
        assert_eq!(view.means()["read_ops_per_sec"], 2.5);
        assert_eq!(view.busiest().unwrap().owner.as_deref(), Some("sdc"));
        assert!(view.peak("read_ops_per_sec").is_err());
    }

    #[test]
    fn column_lists_every_known_entity() {
        let engine = warmed_engine();
        let view = QueryView::new(&engine);
        let column = view.column("read_ops_per_sec").unwrap();
        assert_eq!(
            column,
            vec![("sda".to_string(), 5.0), ("sdb".to_string(), 15.0), ("sdc".to_string(), 0.0)]
        );
        assert_eq!(format_set(&column), "sda|5.00$sdb|15.00$sdc|0.00$");
    }

    #[test]
    fn zero_is_rendered_as_a_single_character() {
        assert_eq!(format_value(0.0), "0");
        assert_eq!(format_value(0.004), "0.00");
        assert_eq!(format_value(12.346), "12.35");
        assert_eq!(
            format_peak(&Peak {
                value: 1.0,
                owner: Some("sda1".into())
            }),
            "1.00,sda1"
        );
        assert_eq!(format_peak(&Peak::default()), "0,");
        assert_eq!(format_set(&[]), "$");
    }

    #[test]
    fn text_report_names_entities_by_index() {
        let engine = warmed_engine();
        let text = render_text(&engine);
        assert!(text.contains("disk.sum.read_ops_per_sec 5.00\n"));
        assert!(text.contains("disk.max.utilization_pct 0,sdc\n"));
        assert!(text.contains("disk[0:sda].read_ops_per_sec 5.00\n"));
        assert!(text.contains("disk[2:sdc] entity 'sdc' has no rate yet\n"));
    }

    fn link_engine() -> RateEngine<Network> {
        let eth = |secs: u64, rx_bytes: u64| {
            Snapshot::new(
                "eth0",
                UNIX_EPOCH + Duration::from_secs(secs),
                NetworkCounters {
                    rx_bytes,
                    tx_bytes: rx_bytes / 2,
                    address: Some(Ipv4Addr::new(10, 0, 0, 5)),
                    speed_mbps: Some(1000.0),
                    ..Default::default()
                },
            )
        };
        let wan = |secs: u64| {
            Snapshot::new(
                "wan0",
                UNIX_EPOCH + Duration::from_secs(secs),
                NetworkCounters {
                    address: Some(Ipv4Addr::new(203, 0, 113, 9)),
                    ..Default::default()
                },
            )
        };
        let mut engine = RateEngine::<Network>::default();
        engine.collect([eth(0, 0), wan(0)]);
        engine.collect([eth(1, 2000), wan(1)]);
        engine
    }

    #[test]
    fn links_report_address_and_speed_in_index_order() {
        let engine = link_engine();
        let view = QueryView::new(&engine);

        let eth0 = view.link_at(0).unwrap();
        assert_eq!(eth0.key, "eth0");
        assert_eq!(eth0.address, Some(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(eth0.speed_mbps, Some(1000.0));
        assert_eq!(view.link("wan0").unwrap().speed_mbps, None);
        assert_eq!(view.link("eth9"), Err(LookupError::UnknownEntity("eth9".into())));

        let links = view.links();
        assert_eq!(
            format_model_set(&links),
            "eth0|10.0.0.5|1000.00$wan0|203.0.113.9|$"
        );
        assert_eq!(
            format_byte_set(&links),
            "10.0.0.5=eth0=(2000|1000)$203.0.113.9=wan0=(0|0)$"
        );
    }

    #[test]
    fn link_lines_appear_in_the_text_report() {
        let text = render_links(&link_engine());
        assert!(text.contains("network[0:eth0].address 10.0.0.5\n"));
        assert!(text.contains("network[0:eth0].speed_mbps 1000.00\n"));
        assert!(text.contains("network[1:wan0].speed_mbps \n"));
        assert!(text.contains("network.model_set eth0|10.0.0.5|1000.00$wan0|203.0.113.9|$\n"));
    }
}
