use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};

use grid_forecaster::config::{Config, DEFAULT_FORECAST_DAYS, HTTP_TIMEOUT_SECS};
use grid_forecaster::dashboard::{
    format_mw, format_value, ConnectionStatus, DashboardState, MAX_DAYS, MIN_DAYS,
};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .map_err(io::Error::other)?;

    let mut app = DashboardState::new(cfg.dashboard_api_url, DEFAULT_FORECAST_DAYS);

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut table_state = TableState::default();

    let result = run_loop(&mut terminal, &mut app, &client, &mut table_state).await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut DashboardState,
    client: &reqwest::Client,
    table_state: &mut TableState,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| render(f, app, table_state))?;

        if !event::poll(Duration::from_millis(250))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => return Ok(()),
            KeyCode::Left | KeyCode::Char('-') => app.adjust_days(-1),
            KeyCode::Right | KeyCode::Char('+') | KeyCode::Char('=') => app.adjust_days(1),
            KeyCode::Char('g') | KeyCode::Char('G') | KeyCode::Enter => {
                app.status = ConnectionStatus::Loading;
                terminal.draw(|f| render(f, app, table_state))?;
                app.generate(client).await;
                table_state.select(None);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let max = app.points.len().saturating_sub(1);
                let next = table_state.selected().map_or(0, |i| (i + 1).min(max));
                table_state.select(Some(next));
            }
            KeyCode::Up | KeyCode::Char('k') => {
                let prev = table_state.selected().map_or(0, |i| i.saturating_sub(1));
                table_state.select(Some(prev));
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &DashboardState, table_state: &mut TableState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(0),    // body
            Constraint::Length(2), // footer
        ])
        .split(f.area());

    render_header(f, app, chunks[0]);
    render_body(f, app, table_state, chunks[1]);
    render_footer(f, app, chunks[2]);
}

fn render_header(f: &mut Frame, app: &DashboardState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        ConnectionStatus::Idle => ("press [g] to generate".to_string(), Color::DarkGray),
        ConnectionStatus::Loading => ("◌ fetching predictions…".to_string(), Color::Yellow),
        ConnectionStatus::Ready => ("● forecast ready".to_string(), Color::Green),
        ConnectionStatus::Error(e) => (format!("✗ {e}"), Color::Red),
    };

    let line = Line::from(vec![
        Span::styled(
            " ⚡ Energy Demand Forecaster  ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
    ]);
    let paragraph = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(paragraph, area);
}

fn render_body(f: &mut Frame, app: &DashboardState, table_state: &mut TableState, area: Rect) {
    // Horizontal split: settings sidebar | metrics + table
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(30), Constraint::Min(0)])
        .split(area);

    render_sidebar(f, app, halves[0]);

    let main = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(0)])
        .split(halves[1]);

    render_metrics(f, app, main[0]);
    render_table(f, app, table_state, main[1]);
}

fn render_sidebar(f: &mut Frame, app: &DashboardState, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            " FORECAST SETTINGS ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(inner);

    f.render_widget(Paragraph::new(format!("Days to Forecast: {}", app.days)), rows[0]);

    let ratio = (app.days - MIN_DAYS) as f64 / (MAX_DAYS - MIN_DAYS) as f64;
    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio.clamp(0.0, 1.0))
        .label(format!("{MIN_DAYS} … {MAX_DAYS}"));
    f.render_widget(gauge, rows[1]);

    let hint = Line::from(vec![
        Span::styled("[g] ", Style::default().fg(Color::Yellow)),
        Span::raw("Generate Forecast"),
    ]);
    f.render_widget(Paragraph::new(hint), rows[3]);
}

fn render_metrics(f: &mut Frame, app: &DashboardState, area: Rect) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let m = app.metrics();
    let cards = [
        ("Final Forecasted Demand", m.and_then(|m| m.final_demand)),
        ("Average Demand", m.and_then(|m| m.average_demand)),
    ];
    for ((title, value), col) in cards.into_iter().zip(cols.iter()) {
        let paragraph = Paragraph::new(Line::from(Span::styled(
            format_mw(value),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        )))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(Span::styled(
                    format!(" {title} "),
                    Style::default().fg(Color::Yellow),
                )),
        );
        f.render_widget(paragraph, *col);
    }
}

fn render_table(f: &mut Frame, app: &DashboardState, state: &mut TableState, area: Rect) {
    let header_cells = ["ds", "yhat", "yhat_lower", "yhat_upper"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = app
        .points
        .iter()
        .map(|p| {
            Row::new(vec![
                Cell::from(p.raw_ds.clone()).style(Style::default().fg(Color::DarkGray)),
                Cell::from(format_value(p.yhat)).style(Style::default().fg(Color::Green)),
                Cell::from(format_value(p.yhat_lower)),
                Cell::from(format_value(p.yhat_upper)),
            ])
        })
        .collect();

    let title = match app.generated_days {
        Some(d) => format!(" RAW DATA ({d} days, {} rows) ", app.points.len()),
        None => " RAW DATA ".to_string(),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(21),
            Constraint::Length(14),
            Constraint::Length(14),
            Constraint::Length(14),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                title,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    )
    .row_highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    );

    f.render_stateful_widget(table, area, state);
}

fn render_footer(f: &mut Frame, app: &DashboardState, area: Rect) {
    let lines = vec![
        Line::from(Span::styled(
            format!(" Connected to API: `{}`", app.api_url),
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(vec![
            Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
            Span::raw("quit  "),
            Span::styled("[←→ / - +] ", Style::default().fg(Color::Yellow)),
            Span::raw("days  "),
            Span::styled("[g] ", Style::default().fg(Color::Yellow)),
            Span::raw("generate  "),
            Span::styled("[↑↓ / j k] ", Style::default().fg(Color::Yellow)),
            Span::raw("scroll"),
        ]),
    ];
    f.render_widget(Paragraph::new(lines), area);
}
