//! TUI for proxy checking with live progress and run control
//!
//! The checker runs in a background task; its progress snapshots arrive
//! over a channel and the UI stays responsive to pause/resume/stop keys
//! throughout the run.

use crate::proxy::{
    CheckerSettings, Proxy, ProxyChecker, ProxyStatus, ProxyVerifier, VerifyClient,
};
use crate::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver};
use tokio::time::Duration;

/// Maximum number of proxies shown per result list
const MAX_RECENT_PROXIES: usize = 100;

/// Events emitted by the background checking task
enum RunEvent {
    Progress(Vec<Proxy>, f64),
    Finished,
}

/// Proxy checker TUI application state
pub struct ProxyCheckerApp {
    /// Latest snapshot of all records
    snapshot: Vec<Proxy>,
    /// Percent of records tested
    progress: f64,
    /// Checker configuration, reused for retest runs
    settings: CheckerSettings,
    /// Verification endpoint URL
    api_url: String,
    /// Handle to the running checker, if a run was launched
    checker: Option<ProxyChecker>,
    /// Events from the background task
    events: Option<UnboundedReceiver<RunEvent>>,
    /// Whether the current run is paused
    paused: bool,
    /// Whether the run has finished (completed or stopped)
    is_complete: bool,
    /// Selected list (0 = valid, 1 = invalid)
    selected_list: usize,
    /// Selected item in current list
    list_state: ListState,
    /// Status message
    status_message: String,
    /// Whether the user wants to quit
    should_quit: bool,
}

impl ProxyCheckerApp {
    /// Create a new proxy checker TUI application
    pub fn new(proxies: Vec<Proxy>, settings: CheckerSettings, api_url: String) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            snapshot: proxies,
            progress: 0.0,
            settings,
            api_url,
            checker: None,
            events: None,
            paused: false,
            is_complete: false,
            selected_list: 0,
            list_state,
            status_message: "Starting proxy check...".to_string(),
            should_quit: false,
        }
    }

    /// Run the TUI application
    pub async fn run(&mut self) -> Result<()> {
        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal).await;

        // Restore terminal
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result
    }

    /// Start a checker over the current records in a background task
    fn launch(&mut self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let progress_tx = tx.clone();

        let verifier: Arc<dyn ProxyVerifier> = Arc::new(VerifyClient::new(self.api_url.clone()));
        let checker = ProxyChecker::new(
            self.snapshot.clone(),
            self.settings.clone(),
            verifier,
            move |proxies, progress| {
                let _ = progress_tx.send(RunEvent::Progress(proxies, progress));
            },
        );

        let runner = checker.clone();
        tokio::spawn(async move {
            runner.start().await;
            let _ = tx.send(RunEvent::Finished);
        });

        self.checker = Some(checker);
        self.events = Some(rx);
        self.paused = false;
        self.is_complete = false;
        self.status_message =
            "Checking... 'p' pause | 'r' resume | 's' stop | 'q' quit".to_string();
    }

    async fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        self.launch();

        loop {
            // Draw UI
            terminal.draw(|f| self.ui(f))?;

            // Handle key events with a short timeout
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_input(key.code);
                        if self.should_quit {
                            break;
                        }
                    }
                }
            }

            self.drain_events();
        }

        Ok(())
    }

    /// Apply all pending events from the background task
    fn drain_events(&mut self) {
        let mut received = Vec::new();
        if let Some(events) = self.events.as_mut() {
            loop {
                match events.try_recv() {
                    Ok(event) => received.push(event),
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }
        }
        for event in received {
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: RunEvent) {
        match event {
            RunEvent::Progress(proxies, progress) => {
                self.snapshot = proxies;
                self.progress = progress;
                if !self.paused {
                    self.status_message = format!(
                        "Checking... {:.0}% ({}/{}) | Valid: {} | Invalid: {}",
                        self.progress,
                        self.tested_count(),
                        self.snapshot.len(),
                        self.valid_count(),
                        self.invalid_count()
                    );
                }
            }
            RunEvent::Finished => {
                self.is_complete = true;
                let stopped = self.snapshot.iter().any(|p| !p.status.is_settled());
                self.status_message = format!(
                    "{} Valid: {} | Invalid: {} | 't' retest invalid, 'q' quit",
                    if stopped { "Stopped." } else { "Complete!" },
                    self.valid_count(),
                    self.invalid_count()
                );
                if self.settings.sound_notification {
                    // Terminal bell
                    print!("\x07");
                    let _ = io::stdout().flush();
                }
            }
        }
    }

    fn run_is_active(&self) -> bool {
        self.checker.as_ref().is_some_and(ProxyChecker::is_active)
    }

    fn tested_count(&self) -> usize {
        self.snapshot.iter().filter(|p| p.status.is_settled()).count()
    }

    fn valid_count(&self) -> usize {
        self.snapshot
            .iter()
            .filter(|p| p.status == ProxyStatus::Valid)
            .count()
    }

    fn invalid_count(&self) -> usize {
        self.snapshot
            .iter()
            .filter(|p| p.status == ProxyStatus::Invalid)
            .count()
    }

    fn handle_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => {
                if let Some(checker) = &self.checker {
                    checker.stop();
                }
                self.should_quit = true;
            }
            KeyCode::Char('p') => {
                if let Some(checker) = &self.checker {
                    if checker.is_active() && !self.paused {
                        checker.pause();
                        self.paused = true;
                        self.status_message =
                            "Paused. 'r' resume | 's' stop | 'q' quit".to_string();
                    }
                }
            }
            KeyCode::Char('r') => {
                if let Some(checker) = &self.checker {
                    if self.paused {
                        checker.resume();
                        self.paused = false;
                        self.status_message = "Resumed.".to_string();
                    }
                }
            }
            KeyCode::Char('s') => {
                if let Some(checker) = &self.checker {
                    checker.stop();
                    self.paused = false;
                }
            }
            KeyCode::Char('t') => {
                // Retest every invalid record with a fresh run
                if !self.run_is_active() {
                    let mut any_reset = false;
                    for proxy in &mut self.snapshot {
                        if proxy.status == ProxyStatus::Invalid {
                            proxy.reset();
                            any_reset = true;
                        }
                    }
                    if any_reset {
                        self.launch();
                    }
                }
            }
            KeyCode::Tab => {
                // Switch between valid and invalid lists
                self.selected_list = (self.selected_list + 1) % 2;
                self.list_state.select(Some(0));
            }
            KeyCode::Down => {
                let len = self.selected_list_len();
                let i = match self.list_state.selected() {
                    Some(i) => {
                        if i >= len.saturating_sub(1) {
                            0
                        } else {
                            i + 1
                        }
                    }
                    None => 0,
                };
                self.list_state.select(Some(i));
            }
            KeyCode::Up => {
                let len = self.selected_list_len();
                let i = match self.list_state.selected() {
                    Some(i) => {
                        if i == 0 {
                            len.saturating_sub(1)
                        } else {
                            i - 1
                        }
                    }
                    None => 0,
                };
                self.list_state.select(Some(i));
            }
            _ => {}
        }
    }

    fn selected_list_len(&self) -> usize {
        let count = if self.selected_list == 0 {
            self.valid_count()
        } else {
            self.invalid_count()
        };
        count.min(MAX_RECENT_PROXIES)
    }

    fn ui(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3), // Title
                Constraint::Length(3), // Progress bar
                Constraint::Min(0),    // Proxy lists
                Constraint::Length(3), // Status bar
            ])
            .split(f.size());

        // Title
        let title = Paragraph::new("Proxy Checker")
            .style(Style::default().fg(Color::Cyan))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(title, chunks[0]);

        // Progress bar
        let progress_label = format!(
            "{}/{} ({:.0}%)",
            self.tested_count(),
            self.snapshot.len(),
            self.progress
        );
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Progress"))
            .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
            .percent(self.progress.round() as u16)
            .label(progress_label);
        f.render_widget(gauge, chunks[1]);

        // Split the main area into two columns for valid and invalid proxies
        let proxy_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[2]);

        let valid_entries = Self::entries(&self.snapshot, ProxyStatus::Valid);
        let invalid_entries = Self::entries(&self.snapshot, ProxyStatus::Invalid);

        Self::render_proxy_list(
            f,
            proxy_chunks[0],
            "Valid Proxies",
            valid_entries,
            self.valid_count(),
            self.selected_list == 0,
            Color::Green,
            if self.selected_list == 0 {
                Some(&mut self.list_state)
            } else {
                None
            },
        );

        Self::render_proxy_list(
            f,
            proxy_chunks[1],
            "Invalid Proxies",
            invalid_entries,
            self.invalid_count(),
            self.selected_list == 1,
            Color::Red,
            if self.selected_list == 1 {
                Some(&mut self.list_state)
            } else {
                None
            },
        );

        // Status bar
        let status = Paragraph::new(self.status_message.clone())
            .style(if self.is_complete {
                Style::default().fg(Color::Green)
            } else if self.paused {
                Style::default().fg(Color::Magenta)
            } else {
                Style::default().fg(Color::Yellow)
            })
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(status, chunks[3]);
    }

    /// Display lines for all records in the given status, newest first
    fn entries(snapshot: &[Proxy], status: ProxyStatus) -> Vec<String> {
        snapshot
            .iter()
            .filter(|p| p.status == status)
            .rev()
            .take(MAX_RECENT_PROXIES)
            .map(Self::format_entry)
            .collect()
    }

    fn format_entry(proxy: &Proxy) -> String {
        let mut entry = proxy.to_simple_string();
        if let Some(speed) = proxy.speed_ms {
            entry.push_str(&format!(" ({}ms)", speed));
        }
        if let Some(rating) = proxy.rating {
            entry.push_str(&format!(" {}/5", rating));
        }
        if let Some(code) = &proxy.country_code {
            entry.push_str(&format!(" {}", code));
        }
        if let Some(error) = &proxy.error {
            entry.push_str(&format!(" - {}", error));
        }
        entry
    }

    #[allow(clippy::too_many_arguments)]
    fn render_proxy_list(
        f: &mut Frame,
        area: Rect,
        title: &str,
        entries: Vec<String>,
        total_count: usize,
        is_selected: bool,
        color: Color,
        list_state: Option<&mut ListState>,
    ) {
        let items: Vec<ListItem> = entries
            .into_iter()
            .map(|entry| ListItem::new(entry).style(Style::default().fg(color)))
            .collect();

        let block_title = format!("{} ({})", title, total_count);
        let border_style = if is_selected {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(block_title)
                    .border_style(border_style),
            )
            .highlight_style(Style::default().bg(Color::DarkGray))
            .highlight_symbol(">> ");

        if let Some(state) = list_state {
            f.render_stateful_widget(list, area, state);
        } else {
            f.render_widget(list, area);
        }
    }
}
