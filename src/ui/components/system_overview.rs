use crate::collectors::{CpuStats, FilesystemStats, MemoryStats};
use crate::domain::CpuMetrics;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Sparkline},
    Frame,
};
use std::collections::{HashMap, VecDeque};

pub(crate) fn load_color(pct: f64) -> Color {
    if pct > 80.0 {
        Color::Red
    } else if pct > 50.0 {
        Color::Yellow
    } else if pct > 5.0 {
        Color::Green
    } else {
        Color::DarkGray
    }
}

fn fmt_gb(kb: u64) -> String {
    let gb = kb as f64 / 1024.0 / 1024.0;
    if gb >= 10.0 {
        format!("{:.0}G", gb)
    } else {
        format!("{:.1}G", gb)
    }
}

fn panel(title: String) -> Block<'static> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
}

pub fn render_system_overview(
    frame: &mut Frame,
    area: Rect,
    cpu_stats: Option<&CpuStats>,
    memory_stats: Option<&MemoryStats>,
    filesystem_stats: Option<&FilesystemStats>,
    cpu_history: &VecDeque<f64>,
    core_history: &HashMap<String, VecDeque<f64>>,
) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(40), // CPU
            Constraint::Percentage(30), // Memory
            Constraint::Percentage(30), // Filesystems
        ])
        .split(area);

    render_cpu_stats(frame, chunks[0], cpu_stats, cpu_history, core_history);
    render_memory_stats(frame, chunks[1], memory_stats);
    render_filesystem_stats(frame, chunks[2], filesystem_stats);
}

fn cpu_label(name: &str, metrics: &CpuMetrics) -> Line<'static> {
    let indicator = if metrics.busy_pct > 5.0 { "●" } else { "○" };
    Line::from(vec![
        Span::styled(indicator, Style::default().fg(load_color(metrics.busy_pct))),
        Span::raw(format!(" {:<6}{:>3.0}%", name, metrics.busy_pct)),
    ])
}

fn render_history_line(frame: &mut Frame, area: Rect, label: Line<'static>, history: Option<&VecDeque<f64>>) {
    // Label takes ~12 chars: "● cpu12  100%"
    let label_width = 13u16;
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(label_width), Constraint::Min(0)])
        .split(area);

    frame.render_widget(Paragraph::new(label), chunks[0]);

    if let Some(hist) = history.filter(|h| !h.is_empty() && chunks[1].width >= 5) {
        let width = chunks[1].width as usize;
        let start = hist.len().saturating_sub(width);
        let data: Vec<u64> = hist.iter().skip(start).map(|&v| v as u64).collect();
        let sparkline = Sparkline::default()
            .data(&data)
            .max(100)
            .style(Style::default().fg(Color::Cyan))
            .bar_set(ratatui::symbols::bar::NINE_LEVELS);
        frame.render_widget(sparkline, chunks[1]);
    }
}

fn render_cpu_stats(
    frame: &mut Frame,
    area: Rect,
    cpu_stats: Option<&CpuStats>,
    cpu_history: &VecDeque<f64>,
    core_history: &HashMap<String, VecDeque<f64>>,
) {
    let Some(cpu) = cpu_stats else {
        let block = panel(" CPU ".to_string());
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(
            Paragraph::new("Collecting CPU stats...").style(Style::default().fg(Color::DarkGray)),
            inner,
        );
        return;
    };

    let block = panel(format!(
        " CPU  load {:.2}  run {}  blk {} ",
        cpu.load_1m, cpu.procs_running, cpu.procs_blocked
    ));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = 1 + cpu.cores.len();
    let constraints: Vec<Constraint> = (0..rows.min(inner.height as usize)).map(|_| Constraint::Length(1)).collect();
    let lines = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(inner);

    if let Some(first) = lines.first() {
        render_history_line(frame, *first, cpu_label("all", &cpu.total), Some(cpu_history));
    }
    for (line, (name, metrics)) in lines.iter().skip(1).zip(&cpu.cores) {
        render_history_line(frame, *line, cpu_label(name, metrics), core_history.get(name));
    }
}

fn render_memory_stats(frame: &mut Frame, area: Rect, mem_stats: Option<&MemoryStats>) {
    let block = panel(" Memory ".to_string());
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(mem) = mem_stats.filter(|m| m.total_kb > 0) else {
        return;
    };

    let total = mem.total_kb as f64;
    let cache = (mem.buffers_kb + mem.cached_kb).min(mem.free_kb);
    let bar_width = inner.width as usize;
    let used_chars = (mem.used_kb as f64 / total * bar_width as f64) as usize;
    let cache_chars = ((cache as f64 / total * bar_width as f64) as usize).min(bar_width - used_chars.min(bar_width));
    let free_chars = bar_width.saturating_sub(used_chars + cache_chars);

    let mut bar_spans: Vec<Span> = Vec::new();
    if used_chars > 0 {
        bar_spans.push(Span::styled("█".repeat(used_chars), Style::default().fg(load_color(mem.used_pct))));
    }
    if cache_chars > 0 {
        bar_spans.push(Span::styled("█".repeat(cache_chars), Style::default().fg(Color::Blue)));
    }
    if free_chars > 0 {
        bar_spans.push(Span::styled("░".repeat(free_chars), Style::default().fg(Color::DarkGray)));
    }

    let mut lines = vec![
        Line::from(bar_spans),
        Line::from(vec![
            Span::styled(format!("U:{} ", fmt_gb(mem.used_kb)), Style::default().fg(Color::DarkGray)),
            Span::styled("█", Style::default().fg(Color::Blue)),
            Span::styled(format!("C:{} ", fmt_gb(cache)), Style::default().fg(Color::DarkGray)),
            Span::styled(format!("F:{} ", fmt_gb(mem.free_kb - cache)), Style::default().fg(Color::DarkGray)),
            Span::styled(format!("/{} ({:.0}%)", fmt_gb(mem.total_kb), mem.used_pct), Style::default().fg(Color::White)),
        ]),
    ];

    if mem.swap_total_kb > 0 {
        let swap_color = if mem.swap_used_pct > 50.0 {
            Color::Yellow
        } else {
            Color::DarkGray
        };
        lines.push(Line::from(Span::styled(
            format!(
                "Swap: {}/{} ({:.0}%)",
                fmt_gb(mem.swap_used_kb),
                fmt_gb(mem.swap_total_kb),
                mem.swap_used_pct
            ),
            Style::default().fg(swap_color),
        )));
    }

    frame.render_widget(Paragraph::new(lines), inner);
}

fn render_filesystem_stats(frame: &mut Frame, area: Rect, fs_stats: Option<&FilesystemStats>) {
    let Some(fs) = fs_stats else {
        frame.render_widget(panel(" Filesystems ".to_string()), area);
        return;
    };

    let block = panel(format!(" Filesystems {:.0}% ", fs.used_pct));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let fullest = fs.fullest.owner.as_deref();
    let lines: Vec<Line> = fs
        .mounts
        .iter()
        .take(inner.height as usize)
        .map(|m| {
            let marker = if Some(m.mount.as_str()) == fullest { "▶" } else { " " };
            Line::from(vec![
                Span::styled(marker, Style::default().fg(Color::Yellow)),
                Span::raw(format!("{:<14}", m.mount)),
                Span::styled(format!("{:>4.0}%", m.used_pct), Style::default().fg(load_color(m.used_pct))),
                Span::styled(format!(" {}", fmt_gb(m.total_kb)), Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();

    frame.render_widget(Paragraph::new(lines), inner);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_thresholds() {
        assert_eq!(load_color(95.0), Color::Red);
        assert_eq!(load_color(60.0), Color::Yellow);
        assert_eq!(load_color(10.0), Color::Green);
        assert_eq!(load_color(0.0), Color::DarkGray);
    }

    #[test]
    fn sizes_are_rendered_from_kib() {
        assert_eq!(fmt_gb(1024 * 1024), "1.0G");
        assert_eq!(fmt_gb(16 * 1024 * 1024), "16G");
    }
}
