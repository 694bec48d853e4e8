//! Terminal surface
//!
//! Features:
//! - Fixed text container fed by the live stream
//! - Context / temperature readouts driven by the mouse
//! - Click anywhere (or r / Space) to restart
//! - Print the surface to the label printer (p)
//! - Log tab

use anyhow::Result;
use crossterm::{
    event::{
        DisableMouseCapture, EnableMouseCapture, Event, EventStream, KeyCode, KeyEvent,
        KeyEventKind, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, Tabs},
};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::client::HttpSource;
use crate::config::Config;
use crate::controller::{ContainerSize, Controller, Phase};
use crate::params::LiveParams;
use crate::printer::PrintClient;

const TICK: Duration = Duration::from_millis(25);

// ═══════════════════════════════════════════════════════════════
// LAYOUT
// ═══════════════════════════════════════════════════════════════

/// Tab selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Surface,
    Log,
}

impl Tab {
    fn all() -> &'static [Tab] {
        &[Tab::Surface, Tab::Log]
    }

    fn name(&self) -> &'static str {
        match self {
            Tab::Surface => "Surface",
            Tab::Log => "Log",
        }
    }
}

struct Regions {
    header: Rect,
    body: Rect,
    status: Rect,
}

fn regions(area: Rect) -> Regions {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header + readouts
            Constraint::Min(3),    // Container
            Constraint::Length(1), // Status
        ])
        .split(area);

    Regions {
        header: chunks[0],
        body: chunks[1],
        status: chunks[2],
    }
}

fn surface_block(phase: Phase) -> Block<'static> {
    let border = match phase {
        Phase::Overflow => Style::default().fg(Color::Yellow),
        Phase::Error => Style::default().fg(Color::Red),
        _ => Style::default(),
    };
    Block::default().borders(Borders::ALL).border_style(border)
}

/// Text area inside the container border for a terminal of `size`
pub fn container_size(size: Rect) -> ContainerSize {
    let inner = surface_block(Phase::Idle).inner(regions(size).body);
    ContainerSize {
        width: inner.width,
        height: inner.height,
    }
}

// ═══════════════════════════════════════════════════════════════
// MAIN TUI
// ═══════════════════════════════════════════════════════════════

struct TuiState {
    tab: Tab,
    viewport: Rect,
    tick: usize,
}

/// Run the interactive surface until the user quits
pub async fn run_tui(config: &Config) -> Result<()> {
    let mut terminal = setup_terminal()?;
    let result = run_tui_loop(&mut terminal, config).await;
    restore_terminal(terminal)?;
    result
}

async fn run_tui_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    config: &Config,
) -> Result<()> {
    let source = Arc::new(HttpSource::new(&config.api_url)?);
    let printer = PrintClient::new(&config.print_url);

    let (tx, mut deliveries) = mpsc::channel(256);
    let (notice_tx, mut notices) = mpsc::channel::<String>(16);

    let now = Instant::now();
    let mut controller = Controller::new(source, tx, LiveParams::default(), config.debounce(), now);
    let mut state = TuiState {
        tab: Tab::Surface,
        viewport: terminal.size()?,
        tick: 0,
    };

    controller.note(format!("Backend: {}", config.api_url));
    controller.resize(container_size(state.viewport), now);
    controller.boot(now);

    let mut events = EventStream::new();
    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        terminal.draw(|f| render_tui(f, &controller, &state))?;

        tokio::select! {
            maybe_event = events.next() => {
                let event = match maybe_event {
                    Some(event) => event?,
                    None => break,
                };
                let now = Instant::now();
                match event {
                    Event::Key(key) => {
                        if !handle_key(key, &mut controller, &mut state, &printer, &notice_tx, now) {
                            break;
                        }
                    }
                    Event::Mouse(mouse) => handle_mouse(mouse, &mut controller, &state, now),
                    Event::Resize(cols, rows) => {
                        state.viewport = Rect::new(0, 0, cols, rows);
                        controller.resize(container_size(state.viewport), now);
                    }
                    _ => {}
                }
            }
            Some(delivery) = deliveries.recv() => {
                controller.deliver(delivery, Instant::now());
            }
            Some(notice) = notices.recv() => {
                controller.note(notice);
            }
            _ = ticker.tick() => {
                state.tick += 1;
                controller.tick(Instant::now());
            }
        }
    }

    controller.shutdown();
    Ok(())
}

/// Returns false when the user asked to quit
fn handle_key(
    key: KeyEvent,
    controller: &mut Controller,
    state: &mut TuiState,
    printer: &PrintClient,
    notices: &mpsc::Sender<String>,
    now: Instant,
) -> bool {
    if key.kind != KeyEventKind::Press {
        return true;
    }

    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => return false,
        KeyCode::Tab => {
            let tabs = Tab::all();
            let idx = tabs.iter().position(|t| *t == state.tab).unwrap_or(0);
            state.tab = tabs[(idx + 1) % tabs.len()];
        }
        KeyCode::Char('r') | KeyCode::Char(' ') => controller.pointer_down(now),
        KeyCode::Left => controller.nudge_params(-1, 0),
        KeyCode::Right => controller.nudge_params(1, 0),
        KeyCode::Up => controller.nudge_params(0, 1),
        KeyCode::Down => controller.nudge_params(0, -1),
        KeyCode::Char('p') => {
            let text = controller.text().to_string();
            let printer = printer.clone();
            let notices = notices.clone();
            controller.note(format!("Printing {} chars", text.chars().count()));
            tokio::spawn(async move {
                let msg = match printer.print(&text).await {
                    Ok(chars) => format!("Printed {} chars", chars),
                    Err(e) => format!("Print failed: {:#}", e),
                };
                let _ = notices.send(msg).await;
            });
        }
        _ => {}
    }
    true
}

fn handle_mouse(mouse: MouseEvent, controller: &mut Controller, state: &TuiState, now: Instant) {
    // last cell maps to the far end of each range
    let width = state.viewport.width.saturating_sub(1) as f32;
    let height = state.viewport.height.saturating_sub(1) as f32;
    let (x, y) = (mouse.column as f32, mouse.row as f32);

    match mouse.kind {
        MouseEventKind::Moved | MouseEventKind::Drag(_) => {
            controller.pointer_moved(x, y, width, height)
        }
        MouseEventKind::Down(_) => {
            controller.pointer_moved(x, y, width, height);
            controller.pointer_down(now);
        }
        _ => {}
    }
}

// ═══════════════════════════════════════════════════════════════
// RENDER
// ═══════════════════════════════════════════════════════════════

fn render_tui(f: &mut Frame, controller: &Controller, state: &TuiState) {
    let r = regions(f.size());

    // Header: tabs on the left, live readouts in the title
    let live = controller.live_params();
    let tabs = Tabs::new(Tab::all().iter().map(|t| t.name()))
        .select(Tab::all().iter().position(|t| *t == state.tab).unwrap_or(0))
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("overspill | ctx {:>2} | temp {:.2}", live.context_window, live.temperature)),
        );
    f.render_widget(tabs, r.header);

    match state.tab {
        Tab::Surface => render_surface(f, controller, r.body),
        Tab::Log => render_log(f, controller, r.body),
    }

    render_status(f, controller, state, r.status);
}

fn render_surface(f: &mut Frame, controller: &Controller, area: Rect) {
    let block = surface_block(controller.phase());
    let inner = block.inner(area);

    let lines: Vec<Line> = controller
        .rows()
        .iter()
        .skip(controller.scroll())
        .take(inner.height as usize)
        .map(|row| Line::from(row.as_str()))
        .collect();

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_log(f: &mut Frame, controller: &Controller, area: Rect) {
    let width = area.width.saturating_sub(4) as usize;
    let mut lines: Vec<String> = controller.traces().render(width);
    lines.push(String::new());
    lines.extend(controller.log_lines().rev().take(50).cloned());

    let para = Paragraph::new(lines.join("\n"))
        .block(Block::default().borders(Borders::ALL).title("Log"));
    f.render_widget(para, area);
}

fn render_status(f: &mut Frame, controller: &Controller, state: &TuiState, area: Rect) {
    let phase = controller.phase();
    let session = controller
        .current_session()
        .map(|id| format!("#{}", id))
        .unwrap_or_else(|| "-".into());
    let count = controller
        .last_count()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".into());
    let metrics = controller.metrics();

    let status = format!(
        " {} {} | session {} | count {} | rows {}/{} | {:.1} frag/s | click/r:restart arrows:params p:print Tab:switch q:quit",
        if phase == Phase::Streaming { spinner_char(state.tick) } else { ' ' },
        phase.name(),
        session,
        count,
        metrics.content_extent,
        metrics.container_extent,
        controller.traces().fragments.rate.last().unwrap_or(0.0),
    );
    let style = match phase {
        Phase::Error => Style::default().fg(Color::Red),
        Phase::Overflow => Style::default().fg(Color::Yellow),
        _ => Style::default().fg(Color::DarkGray),
    };
    f.render_widget(Paragraph::new(status).style(style), area);
}

fn spinner_char(tick: usize) -> char {
    const SPINNER: &[char] = &['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
    SPINNER[tick % SPINNER.len()]
}

// ═══════════════════════════════════════════════════════════════
// TERMINAL SETUP
// ═══════════════════════════════════════════════════════════════

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableMouseCapture, LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
