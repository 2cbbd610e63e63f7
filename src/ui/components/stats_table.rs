use crate::domain::{DiskMetrics, NetworkMetrics, Outcome, PassReport, Peak};
use crate::domain::network::{CLASS_EXTERNAL, CLASS_INTERNAL};
use crate::query::LinkDetail;
use std::collections::HashMap;
use crate::ui::components::system_overview::load_color;
use ratatui::{
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Row, Table},
    Frame,
};

fn header(titles: &[&'static str]) -> Row<'static> {
    Row::new(
        titles
            .iter()
            .map(|t| Cell::from(*t).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))),
    )
}

fn peak_label(peak: Option<&Peak>) -> String {
    match peak.and_then(|p| p.owner.as_deref().map(|owner| (owner, p.value))) {
        Some((owner, value)) => format!("{} {:.1}", owner, value),
        None => "-".to_string(),
    }
}

fn format_bw(bytes_per_sec: f64) -> String {
    if bytes_per_sec >= 1_000_000_000.0 {
        format!("{:.1}G", bytes_per_sec / 1_000_000_000.0)
    } else if bytes_per_sec >= 1_000_000.0 {
        format!("{:.1}M", bytes_per_sec / 1_000_000.0)
    } else if bytes_per_sec >= 1_000.0 {
        format!("{:.1}K", bytes_per_sec / 1_000.0)
    } else {
        format!("{:.0}B", bytes_per_sec)
    }
}

fn table_block(title: String) -> Block<'static> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
}

pub fn render_disk_table(frame: &mut Frame, area: Rect, report: Option<&PassReport<DiskMetrics>>) {
    let Some(report) = report else {
        frame.render_widget(table_block(" Disks ".to_string()), area);
        return;
    };

    let agg = &report.aggregate;
    let title = format!(
        " Disks ({})  r/s {:.1}  w/s {:.1}  avg util {:.1}%  busiest {} ",
        agg.count(),
        agg.sum("read_ops_per_sec").unwrap_or(0.0),
        agg.sum("write_ops_per_sec").unwrap_or(0.0),
        agg.mean("utilization_pct").unwrap_or(0.0),
        peak_label(agg.busiest()),
    );

    let rows: Vec<Row> = report
        .entities
        .iter()
        .map(|e| {
            let m = &e.metrics;
            let name_style = if e.outcome == Outcome::Bootstrapped {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from(e.key.clone()).style(name_style),
                Cell::from(format!("{:.1}", m.read_ops_per_sec)),
                Cell::from(format!("{:.1}", m.write_ops_per_sec)),
                Cell::from(format!("{:.1}", m.read_kb_per_sec)),
                Cell::from(format!("{:.1}", m.write_kb_per_sec)),
                Cell::from(format!("{:.1}", m.avg_request_size)),
                Cell::from(format!("{:.2}", m.queue_depth)),
                Cell::from(format!("{:.2}", m.avg_wait_ms)),
                Cell::from(format!("{:.2}", m.avg_service_ms)),
                Cell::from(format!("{:.1}", m.utilization_pct)).style(Style::default().fg(load_color(m.utilization_pct))),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        vec![
            Constraint::Length(14), // Device
            Constraint::Length(8),  // r/s
            Constraint::Length(8),  // w/s
            Constraint::Length(10), // rKB/s
            Constraint::Length(10), // wKB/s
            Constraint::Length(8),  // avgrq
            Constraint::Length(7),  // avgqu
            Constraint::Length(8),  // await
            Constraint::Length(8),  // svctm
            Constraint::Length(6),  // util
        ],
    )
    .header(header(&["Device", "r/s", "w/s", "rKB/s", "wKB/s", "avgrq", "avgqu", "await", "svctm", "%util"]))
    .block(table_block(title))
    .column_spacing(1);

    frame.render_widget(table, area);
}

fn link_speed(link: Option<&LinkDetail>) -> String {
    match link.and_then(|l| l.speed_mbps) {
        Some(speed) if speed >= 1000.0 => format!("{:.0}G", speed / 1000.0),
        Some(speed) => format!("{:.0}M", speed),
        None => "-".to_string(),
    }
}

pub fn render_network_table(
    frame: &mut Frame,
    area: Rect,
    report: Option<&PassReport<NetworkMetrics>>,
    links: &HashMap<String, LinkDetail>,
) {
    let Some(report) = report else {
        frame.render_widget(table_block(" Network ".to_string()), area);
        return;
    };

    let agg = &report.aggregate;
    let class_bw = |class: &str| {
        agg.class_sum(class, "rx_bytes_per_sec").unwrap_or(0.0) + agg.class_sum(class, "tx_bytes_per_sec").unwrap_or(0.0)
    };
    let title = format!(
        " Network ({})  internal {}/s  external {}/s  max rx util {} ",
        agg.count(),
        format_bw(class_bw(CLASS_INTERNAL)),
        format_bw(class_bw(CLASS_EXTERNAL)),
        peak_label(agg.peak("rx_util_pct")),
    );

    let rows: Vec<Row> = report
        .entities
        .iter()
        .map(|e| {
            let m = &e.metrics;
            let errors = m.rx_error_rate > 0.0 || m.tx_error_rate > 0.0;
            let err_style = if errors {
                Style::default().fg(Color::Red)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            let link = links.get(&e.key);
            let address = link
                .and_then(|l| l.address)
                .map(|a| a.to_string())
                .unwrap_or_else(|| "-".to_string());
            Row::new(vec![
                Cell::from(e.key.clone()),
                Cell::from(address).style(Style::default().fg(Color::DarkGray)),
                Cell::from(link_speed(link)),
                Cell::from(format_bw(m.rx_bytes_per_sec)).style(Style::default().fg(Color::Green)),
                Cell::from(format_bw(m.tx_bytes_per_sec)).style(Style::default().fg(Color::Yellow)),
                Cell::from(format!("{:.0}", m.rx_packets_per_sec)),
                Cell::from(format!("{:.0}", m.tx_packets_per_sec)),
                Cell::from(format!("{:.4}", m.rx_error_rate)).style(err_style),
                Cell::from(format!("{:.4}", m.tx_error_rate)).style(err_style),
                Cell::from(format!("{:.1}", m.rx_util_pct)).style(Style::default().fg(load_color(m.rx_util_pct))),
                Cell::from(format!("{:.1}", m.tx_util_pct)).style(Style::default().fg(load_color(m.tx_util_pct))),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        vec![
            Constraint::Length(12), // Iface
            Constraint::Length(15), // Address
            Constraint::Length(6),  // Speed
            Constraint::Length(8),  // RX
            Constraint::Length(8),  // TX
            Constraint::Length(8),  // rx pkt
            Constraint::Length(8),  // tx pkt
            Constraint::Length(8),  // rx err
            Constraint::Length(8),  // tx err
            Constraint::Length(7),  // rx util
            Constraint::Length(7),  // tx util
        ],
    )
    .header(header(&["Iface", "Address", "Speed", "RX/s", "TX/s", "rxpkt/s", "txpkt/s", "rxerr", "txerr", "rx%", "tx%"]))
    .block(table_block(title))
    .column_spacing(1);

    frame.render_widget(table, area);
}
