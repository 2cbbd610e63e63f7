use crate::ui::components::{render_disk_table, render_network_table, render_system_overview};
use crate::ui::state::AppState;
use anyhow::{anyhow, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Terminal,
};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub fn lock_state(state: &Mutex<AppState>) -> Result<MutexGuard<'_, AppState>> {
    state.lock().map_err(|_| anyhow!("application state lock poisoned"))
}

pub fn run_tui(state: Arc<Mutex<AppState>>) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &state);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    // Let the collection loop notice an error exit as well as a key press
    if let Ok(mut guard) = state.lock() {
        guard.quit();
    }

    result
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, state: &Mutex<AppState>) -> Result<()> {
    loop {
        // Clone state for rendering
        let current_state = {
            let mut guard = lock_state(state)?;
            guard.set_terminal_width(terminal.size()?.width);
            guard.clone()
        };

        terminal.draw(|frame| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3),      // Header
                    Constraint::Length(9),      // CPU, memory, filesystems
                    Constraint::Percentage(50), // Disks
                    Constraint::Min(6),         // Network
                    Constraint::Length(3),      // Footer
                ])
                .split(frame.size());

            render_header(frame, chunks[0], &current_state);
            render_system_overview(
                frame,
                chunks[1],
                current_state.cpu_stats.as_ref(),
                current_state.memory_stats.as_ref(),
                current_state.filesystem_stats.as_ref(),
                &current_state.cpu_history,
                &current_state.core_history,
            );
            render_disk_table(frame, chunks[2], current_state.disk_report.as_ref());
            render_network_table(
                frame,
                chunks[3],
                current_state.network_report.as_ref(),
                &current_state.network_links,
            );
            render_footer(frame, chunks[4], &current_state);
        })?;

        // Handle input with timeout to allow for periodic updates
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if handle_key_event(key, state)? {
                    break;
                }
            }
        }

        if lock_state(state)?.should_quit {
            break;
        }
    }

    Ok(())
}

fn render_header(frame: &mut ratatui::Frame, area: ratatui::layout::Rect, state: &AppState) {
    let elapsed = state.last_update.elapsed();
    let header_text = Line::from(vec![
        Span::styled(
            "RATEWATCH",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" - Linux host rate monitor  "),
        Span::styled(
            format!("Updated: {:.1}s ago", elapsed.as_secs_f64()),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(header_text).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    frame.render_widget(header, area);
}

fn render_footer(frame: &mut ratatui::Frame, area: ratatui::layout::Rect, state: &AppState) {
    let pass = state.disk_report.as_ref().map_or(0, |r| r.pass);
    let footer_text = Line::from(vec![
        Span::raw("[Q]uit / [Esc]  "),
        Span::styled(
            format!(
                "pass {}, {} disks, {} interfaces",
                pass,
                state.disk_report.as_ref().map_or(0, |r| r.entities.len()),
                state.network_report.as_ref().map_or(0, |r| r.entities.len()),
            ),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let footer = Paragraph::new(footer_text).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    frame.render_widget(footer, area);
}

fn handle_key_event(key: KeyEvent, state: &Mutex<AppState>) -> Result<bool> {
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
            lock_state(state)?.quit();
            Ok(true)
        }
        _ => Ok(false),
    }
}
