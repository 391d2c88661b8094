use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Local;
use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Bar, BarChart, BarGroup, Block, Borders, Paragraph, Row as TableRow, Table as TableWidget,
    TableState, Wrap,
};

use crate::api::DatasetApi;
use crate::app::{App, ProgressEvent, ProgressSink, ReportResult, UploadResult};
use crate::domain::{Dataset, DatasetId, DatasetSummary};
use crate::error::VizError;
use crate::presentation::{format_value, summary_cards, to_chart_series, to_table};
use crate::view::{FetchToken, View, ViewState, spawn_fetch};

const EVENTS_MAX: usize = 50;
const SPINNER: &[&str] = &["|", "/", "-", "\\"];
const NEGATIVE_COLOR: Color = Color::Magenta;
const PIE_COLORS: &[Color] = &[
    Color::Blue,
    Color::Red,
    Color::Yellow,
    Color::Green,
    Color::Cyan,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    List,
    Detail(DatasetId),
}

type Outcome<T> = (FetchToken, Result<T, VizError>);

struct Pending<T> {
    token: FetchToken,
    rx: Receiver<Outcome<T>>,
}

/// Applies a finished fetch to its view. Returns true once the pending slot
/// is cleared.
fn poll_pending<T>(view: &mut View<T>, pending: &mut Option<Pending<T>>) -> bool {
    let Some(current) = pending.as_ref() else {
        return false;
    };
    match current.rx.try_recv() {
        Ok((token, result)) => {
            view.complete(&token, result);
            *pending = None;
            true
        }
        Err(TryRecvError::Empty) => false,
        Err(TryRecvError::Disconnected) => {
            view.complete(
                &current.token,
                Err(VizError::Transport("request aborted".to_string())),
            );
            *pending = None;
            true
        }
    }
}

struct TuiProgress {
    events: Arc<Mutex<VecDeque<String>>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            let message = match event.elapsed {
                Some(elapsed) => format!("{} latency_ms={}", event.message, elapsed.as_millis()),
                None => event.message,
            };
            events.push_back(format!("[{}] {message}", Local::now().format("%H:%M:%S")));
            while events.len() > EVENTS_MAX {
                events.pop_front();
            }
        }
    }
}

pub struct Dashboard<A: DatasetApi + 'static> {
    app: Arc<App<A>>,
    screen: Screen,
    list: View<Vec<DatasetSummary>>,
    list_pending: Option<Pending<Vec<DatasetSummary>>>,
    detail: View<Dataset>,
    detail_pending: Option<Pending<Dataset>>,
    report: View<ReportResult>,
    report_pending: Option<Pending<ReportResult>>,
    upload: View<UploadResult>,
    upload_pending: Option<Pending<UploadResult>>,
    /// Path being typed for an upload, while the prompt is open.
    input: Option<String>,
    selected: usize,
    table_state: TableState,
    events: Arc<Mutex<VecDeque<String>>>,
}

impl<A: DatasetApi + 'static> Dashboard<A> {
    pub fn new(app: Arc<App<A>>) -> Self {
        Self {
            app,
            screen: Screen::List,
            list: View::new("history"),
            list_pending: None,
            detail: View::new("detail"),
            detail_pending: None,
            report: View::new("report"),
            report_pending: None,
            upload: View::new("upload"),
            upload_pending: None,
            input: None,
            selected: 0,
            table_state: TableState::default(),
            events: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Takes over the terminal until the user quits.
    pub fn run(mut self) -> miette::Result<()> {
        self.load_list();

        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let result = self.event_loop();

        disable_raw_mode().into_diagnostic()?;
        let mut stdout = io::stdout();
        stdout.execute(LeaveAlternateScreen).into_diagnostic()?;
        result
    }

    fn event_loop(&mut self) -> miette::Result<()> {
        let backend = CrosstermBackend::new(io::stdout());
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let mut tick = 0usize;
        loop {
            self.poll();
            terminal
                .draw(|frame| self.draw(frame, tick))
                .into_diagnostic()?;

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if self.handle_key(key) {
                        break;
                    }
                }
            }
            tick = tick.wrapping_add(1);
        }
        self.list.reset();
        self.detail.reset();
        self.report.reset();
        self.upload.reset();
        Ok(())
    }

    fn sink(&self) -> TuiProgress {
        TuiProgress {
            events: Arc::clone(&self.events),
        }
    }

    fn poll(&mut self) {
        poll_pending(&mut self.list, &mut self.list_pending);
        if poll_pending(&mut self.upload, &mut self.upload_pending) {
            let uploaded = self.upload.state().ready().map(|result| result.dataset.id);
            if let Some(id) = uploaded {
                // History is stale now; it reloads when the list is shown again.
                self.list.reset();
                self.list_pending = None;
                self.selected = 0;
                self.open_detail(id);
            }
        }
        if poll_pending(&mut self.detail, &mut self.detail_pending) {
            self.table_state = TableState::default();
        }
        if poll_pending(&mut self.report, &mut self.report_pending) {
            let message = match self.report.state() {
                ViewState::Ready(result) => format!("report saved to {}", result.path),
                ViewState::Error(message) => format!("report failed: {message}"),
                _ => return,
            };
            self.sink().event(ProgressEvent {
                message,
                elapsed: None,
            });
        }
    }

    fn load_list(&mut self) {
        let token = self.list.begin();
        let app = Arc::clone(&self.app);
        let sink = self.sink();
        let rx = spawn_fetch(token.clone(), move || {
            app.list(&sink).map(|result| result.datasets)
        });
        self.list_pending = Some(Pending { token, rx });
    }

    fn start_upload(&mut self, path: String) {
        if self.upload.state().is_loading() {
            return;
        }
        let path = path.trim().to_string();
        let token = self.upload.begin();
        let app = Arc::clone(&self.app);
        let sink = self.sink();
        let rx = spawn_fetch(token.clone(), move || {
            let path = (!path.is_empty()).then(|| PathBuf::from(path));
            app.upload(path.as_deref(), &sink)
        });
        self.upload_pending = Some(Pending { token, rx });
    }

    fn open_detail(&mut self, id: DatasetId) {
        self.screen = Screen::Detail(id);
        self.report.reset();
        self.report_pending = None;
        let token = self.detail.begin();
        let app = Arc::clone(&self.app);
        let sink = self.sink();
        let rx = spawn_fetch(token.clone(), move || {
            sink.event(ProgressEvent {
                message: format!("phase=Fetch; loading dataset {id}"),
                elapsed: None,
            });
            app.dataset(id)
        });
        self.detail_pending = Some(Pending { token, rx });
    }

    fn leave_detail(&mut self) {
        self.detail.reset();
        self.detail_pending = None;
        self.report.cancel();
        self.report_pending = None;
        self.screen = Screen::List;
        if matches!(self.list.state(), ViewState::Idle) {
            self.load_list();
        }
    }

    fn request_report(&mut self) {
        if self.report.state().is_loading() {
            return;
        }
        let Some(dataset) = self.detail.state().ready() else {
            return;
        };
        let id = dataset.id();
        let name = dataset.name().to_string();
        let token = self.report.begin();
        let app = Arc::clone(&self.app);
        let sink = self.sink();
        let rx = spawn_fetch(token.clone(), move || {
            app.report(id, Some(name.as_str()), None, &sink)
        });
        self.report_pending = Some(Pending { token, rx });
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        if let Some(input) = self.input.as_mut() {
            match key.code {
                KeyCode::Esc => self.input = None,
                KeyCode::Enter => {
                    let path = self.input.take().unwrap_or_default();
                    self.start_upload(path);
                }
                KeyCode::Backspace => {
                    input.pop();
                }
                KeyCode::Char(ch) => input.push(ch),
                _ => {}
            }
            return false;
        }
        match (self.screen, key.code) {
            (_, KeyCode::Char('q')) => return true,
            (Screen::List, KeyCode::Esc) => return true,
            (Screen::List, KeyCode::Up) => {
                self.selected = self.selected.saturating_sub(1);
            }
            (Screen::List, KeyCode::Down) => {
                let len = self.list.state().ready().map(Vec::len).unwrap_or(0);
                if self.selected + 1 < len {
                    self.selected += 1;
                }
            }
            (Screen::List, KeyCode::Enter) => {
                let id = self
                    .list
                    .state()
                    .ready()
                    .and_then(|datasets| datasets.get(self.selected))
                    .map(|summary| summary.id);
                if let Some(id) = id {
                    self.open_detail(id);
                }
            }
            (Screen::List, KeyCode::Char('u')) => {
                if !self.upload.state().is_loading() {
                    self.input = Some(String::new());
                }
            }
            (Screen::List, KeyCode::Char('r')) => {
                self.selected = 0;
                self.load_list();
            }
            (Screen::Detail(_), KeyCode::Esc | KeyCode::Backspace) => self.leave_detail(),
            (Screen::Detail(id), KeyCode::Char('r')) => self.open_detail(id),
            (Screen::Detail(_), KeyCode::Char('p')) => self.request_report(),
            (Screen::Detail(_), KeyCode::Up) => self.table_state.select_previous(),
            (Screen::Detail(_), KeyCode::Down) => self.table_state.select_next(),
            _ => {}
        }
        false
    }

    fn draw(&mut self, frame: &mut ratatui::Frame, tick: usize) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2),
                Constraint::Min(8),
                Constraint::Length(3),
            ])
            .split(frame.area());

        frame.render_widget(self.header(), chunks[0]);
        match self.screen {
            Screen::List => self.draw_list(frame, chunks[1], tick),
            Screen::Detail(_) => self.draw_detail(frame, chunks[1], tick),
        }
        frame.render_widget(self.footer(), chunks[2]);
    }

    fn header(&self) -> Paragraph<'static> {
        let title = match self.screen {
            Screen::List => "Upload History (Last 5 Datasets)".to_string(),
            Screen::Detail(id) => format!("Dataset {id}"),
        };
        Paragraph::new(Line::from(vec![
            Span::styled(
                "EQVIZ",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" "),
            Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
            Span::raw(" :: "),
            Span::raw(title),
        ]))
        .block(Block::default().borders(Borders::BOTTOM))
    }

    fn footer(&self) -> Paragraph<'static> {
        let keys = match (self.screen, &self.input) {
            (_, Some(_)) => "type a CSV path  Enter upload  Esc cancel",
            (Screen::List, None) => "Up/Down select  Enter open  u upload  r refresh  q quit",
            (Screen::Detail(_), None) => {
                "Up/Down rows  p save PDF report  r reload  Esc back  q quit"
            }
        };
        let last = self
            .events
            .lock()
            .ok()
            .and_then(|events| events.back().cloned())
            .unwrap_or_default();
        Paragraph::new(vec![
            Line::from(Span::styled(keys, Style::default().fg(Color::Gray))),
            Line::from(last),
        ])
        .block(Block::default().borders(Borders::TOP))
    }

    /// Upload prompt or the state of the last upload, if there is one.
    fn upload_line(&self, tick: usize) -> Option<Line<'static>> {
        if let Some(input) = &self.input {
            return Some(Line::from(vec![
                Span::styled("Upload CSV: ", Style::default().fg(Color::Cyan)),
                Span::raw(format!("{input}_")),
            ]));
        }
        match self.upload.state() {
            ViewState::Loading => Some(Line::from(format!(
                "{} Uploading...",
                SPINNER[tick % SPINNER.len()]
            ))),
            ViewState::Error(message) => Some(Line::from(Span::styled(
                format!("Upload failed: {message}"),
                Style::default().fg(Color::Red),
            ))),
            _ => None,
        }
    }

    fn draw_list(&self, frame: &mut ratatui::Frame, area: Rect, tick: usize) {
        let area = match self.upload_line(tick) {
            Some(line) => {
                let chunks = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints([Constraint::Length(2), Constraint::Min(1)])
                    .split(area);
                frame.render_widget(Paragraph::new(line), chunks[0]);
                chunks[1]
            }
            None => area,
        };
        let datasets = match self.list.state() {
            ViewState::Ready(datasets) => datasets,
            other => {
                frame.render_widget(status_paragraph(other, tick), area);
                return;
            }
        };
        if datasets.is_empty() {
            let empty = Paragraph::new("No datasets uploaded yet").alignment(Alignment::Center);
            frame.render_widget(empty, area);
            return;
        }

        let mut lines = Vec::new();
        for (index, summary) in datasets.iter().enumerate() {
            let marker = if index == self.selected { "> " } else { "  " };
            let style = if index == self.selected {
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            lines.push(Line::from(vec![
                Span::styled(format!("{marker}{}", summary.name), style),
                Span::styled(
                    format!(
                        "  {}",
                        summary
                            .uploaded_at
                            .with_timezone(&Local)
                            .format("%Y-%m-%d %H:%M")
                    ),
                    Style::default().fg(Color::Gray),
                ),
            ]));
            let stats = &summary.aggregates;
            lines.push(Line::from(format!(
                "    Count: {}  Avg Flowrate: {}  Avg Pressure: {}  Avg Temp: {}",
                stats.total_count,
                format_value(stats.avg_flowrate),
                format_value(stats.avg_pressure),
                format_value(stats.avg_temperature),
            )));
        }
        frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), area);
    }

    fn draw_detail(&mut self, frame: &mut ratatui::Frame, area: Rect, tick: usize) {
        let dataset = match self.detail.state() {
            ViewState::Ready(dataset) => dataset.clone(),
            other => {
                frame.render_widget(status_paragraph(other, tick), area);
                return;
            }
        };

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(3),
                Constraint::Length(10),
                Constraint::Min(4),
            ])
            .split(area);

        let report_status = match self.report.state() {
            ViewState::Loading => format!("  {} generating report", SPINNER[tick % SPINNER.len()]),
            _ => String::new(),
        };
        let title = Line::from(vec![
            Span::styled(
                dataset.name().to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!(
                    "  uploaded {}",
                    dataset
                        .summary
                        .uploaded_at
                        .with_timezone(&Local)
                        .format("%Y-%m-%d %H:%M:%S")
                ),
                Style::default().fg(Color::Gray),
            ),
            Span::styled(report_status, Style::default().fg(Color::Yellow)),
        ]);
        frame.render_widget(Paragraph::new(title), chunks[0]);

        let aggregates = &dataset.summary.aggregates;
        let cards = summary_cards(aggregates);
        let card_areas = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(vec![Constraint::Ratio(1, cards.len() as u32); cards.len()])
            .split(chunks[1]);
        for (card, card_area) in cards.iter().zip(card_areas.iter()) {
            let widget = Paragraph::new(Line::from(Span::styled(
                card.value.clone(),
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title(card.title));
            frame.render_widget(widget, *card_area);
        }

        let charts = to_chart_series(aggregates);
        let chart_areas = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[2]);

        let bars: Vec<Bar> = charts
            .averages
            .points()
            .zip([Color::Blue, Color::Red, Color::Yellow])
            .map(|((category, value), color)| {
                let color = if value < 0.0 { NEGATIVE_COLOR } else { color };
                Bar::default()
                    .label(Line::from(category.to_string()))
                    .value(bar_height(value))
                    .text_value(format_value(value))
                    .style(Style::default().fg(color))
            })
            .collect();
        let mut averages_title = "Average Values by Parameter".to_string();
        if charts.averages.values.iter().any(|value| *value < 0.0) {
            averages_title.push_str(" (magenta bars are below zero)");
        }
        let averages = BarChart::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(averages_title),
            )
            .data(BarGroup::default().bars(&bars))
            .bar_width(11)
            .bar_gap(2);
        frame.render_widget(averages, chart_areas[0]);

        let shares = charts.type_distribution.shares();
        let mut distribution = Vec::new();
        for (index, ((category, count), share)) in charts
            .type_distribution
            .points()
            .zip(shares)
            .enumerate()
        {
            let color = PIE_COLORS[index % PIE_COLORS.len()];
            let width = (share / 100.0 * 20.0).round() as usize;
            distribution.push(Line::from(vec![
                Span::styled(format!("{:<20} ", "█".repeat(width)), Style::default().fg(color)),
                Span::raw(format!("{category} {count:.0} ({share:.1}%)")),
            ]));
        }
        if distribution.is_empty() {
            distribution.push(Line::from("no equipment"));
        }
        let distribution = Paragraph::new(distribution).block(
            Block::default()
                .borders(Borders::ALL)
                .title("Equipment Type Distribution"),
        );
        frame.render_widget(distribution, chart_areas[1]);

        let table = to_table(&dataset.rows);
        let header = TableRow::new(table.headers.clone()).style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        );
        let rows = table.rows.into_iter().map(TableRow::new);
        let widget = TableWidget::new(
            rows,
            [
                Constraint::Percentage(30),
                Constraint::Percentage(22),
                Constraint::Percentage(16),
                Constraint::Percentage(16),
                Constraint::Percentage(16),
            ],
        )
        .header(header)
        .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Equipment Details"),
        );
        frame.render_stateful_widget(widget, chunks[3], &mut self.table_state);
    }
}

fn status_paragraph<T>(state: &ViewState<T>, tick: usize) -> Paragraph<'static> {
    match state {
        ViewState::Error(message) => Paragraph::new(Line::from(Span::styled(
            message.clone(),
            Style::default().fg(Color::Red),
        )))
        .wrap(Wrap { trim: true }),
        _ => Paragraph::new(format!("{} Loading...", SPINNER[tick % SPINNER.len()])),
    }
}

/// Bar heights are integers; keep two decimals of resolution. Negative
/// averages are drawn by magnitude in [`NEGATIVE_COLOR`].
fn bar_height(value: f64) -> u64 {
    if value.is_finite() {
        (value.abs() * 100.0).round() as u64
    } else {
        0
    }
}
