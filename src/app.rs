// The central application controller and event loop.

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::{Terminal, backend::Backend, widgets::ListState};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{info, warn};

pub mod brew;
pub mod coordinator;
pub mod model;
pub mod shortcuts;
pub mod ui;

use coordinator::{Submission, SyncCoordinator};
use model::{BatchOperation, ServiceName, ServiceStatus};
use shortcuts::Opener;

pub type Observer = Box<dyn FnMut(&ServiceStatus, bool)>;

/// What the UI last heard from the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: ServiceStatus,
    pub busy: bool,
}

/// Builds an observer that forwards every notification over a channel.
pub fn channel_observer() -> (Observer, mpsc::Receiver<StatusUpdate>) {
    let (tx, rx) = mpsc::channel();
    let observer: Observer = Box::new(move |status: &ServiceStatus, busy: bool| {
        let _ = tx.send(StatusUpdate {
            status: *status,
            busy,
        });
    });
    (observer, rx)
}

pub struct Shortcuts {
    pub opener: Opener,
    pub phpmyadmin_url: String,
    pub webroot: PathBuf,
}

pub struct App {
    coordinator: SyncCoordinator<Observer>,
    updates: mpsc::Receiver<StatusUpdate>,
    view: StatusUpdate,
    shortcuts: Shortcuts,
    stop_on_quit: bool,
    list_state: ListState,
    message: Option<String>,
    spinner: usize,
    should_quit: bool,
}

impl App {
    pub fn new(
        coordinator: SyncCoordinator<Observer>,
        updates: mpsc::Receiver<StatusUpdate>,
        shortcuts: Shortcuts,
        stop_on_quit: bool,
    ) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0)); // Start with first item selected

        Self {
            view: StatusUpdate {
                status: coordinator.current_status(),
                busy: coordinator.is_busy(),
            },
            coordinator,
            updates,
            shortcuts,
            stop_on_quit,
            list_state,
            message: None,
            spinner: 0,
            should_quit: false,
        }
    }

    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        // Initial fetch
        self.coordinator.refresh();

        let tick_rate = Duration::from_millis(100);

        loop {
            terminal.draw(|f| self.render(f, false))?;

            if event::poll(tick_rate)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code);
                    }
                }
            }

            self.coordinator.pump();
            self.apply_updates();
            if self.view.busy {
                self.spinner = self.spinner.wrapping_add(1);
            }

            if self.should_quit {
                terminal.draw(|f| self.render(f, true))?;
                self.quit();
                return Ok(());
            }
        }
    }

    /// Runs the clean-shutdown stop-all unless `--keep-running` turned it off.
    fn quit(&mut self) {
        if self.stop_on_quit {
            self.coordinator.shutdown();
        } else {
            info!("Leaving services running");
        }
        info!("Exiting");
    }

    fn render(&mut self, f: &mut ratatui::Frame, quitting: bool) {
        let rows: Vec<ui::ServiceRow> = ServiceName::ALL
            .iter()
            .map(|&name| ui::ServiceRow {
                label: name.label(),
                formula: self.coordinator.formula(name),
                running: self.view.status.is_running(name),
            })
            .collect();

        ui::render(
            f,
            &rows,
            &mut self.list_state,
            self.view.busy,
            quitting,
            self.spinner,
            self.message.as_deref(),
        );
    }

    fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('j') | KeyCode::Down => self.next(),
            KeyCode::Char('k') | KeyCode::Up => self.previous(),
            KeyCode::Enter | KeyCode::Char(' ') => {
                if let Some(name) = self.selected() {
                    self.toggle(name);
                }
            }
            KeyCode::Char('w') => self.toggle(ServiceName::Web),
            KeyCode::Char('d') => self.toggle(ServiceName::Database),
            KeyCode::Char('a') => self.submit(BatchOperation::start_all(), "Starting all services"),
            KeyCode::Char('x') => self.submit(BatchOperation::stop_all(), "Stopping all services"),
            KeyCode::Char('r') => {
                self.coordinator.refresh();
                self.message = Some("Refreshing status".to_string());
            }
            KeyCode::Char('p') => {
                let result = self.shortcuts.opener.open_url(&self.shortcuts.phpmyadmin_url);
                self.report(result, "Opened phpMyAdmin");
            }
            KeyCode::Char('o') => {
                let result = self.shortcuts.opener.open_path(&self.shortcuts.webroot);
                self.report(result, "Opened webroot");
            }
            _ => {}
        }
    }

    fn toggle(&mut self, name: ServiceName) {
        let batch = BatchOperation::toggle(name, &self.coordinator.current_status());
        let verb = if self.coordinator.current_status().is_running(name) {
            "Stopping"
        } else {
            "Starting"
        };
        self.submit(batch, &format!("{} {}", verb, name.label().to_lowercase()));
    }

    fn submit(&mut self, batch: BatchOperation, description: &str) {
        // Controls are disabled while a batch runs, same as greyed-out buttons.
        if self.view.busy {
            self.message = Some("Busy, wait for the current operation".to_string());
            return;
        }
        self.message = match self.coordinator.submit(batch) {
            Submission::Accepted => Some(format!("{}...", description)),
            Submission::Rejected => Some("Another operation is still running".to_string()),
        };
    }

    fn report(&mut self, result: Result<()>, success: &str) {
        self.message = Some(match result {
            Ok(()) => success.to_string(),
            Err(e) => {
                warn!("{:#}", e);
                format!("{:#}", e)
            }
        });
    }

    fn apply_updates(&mut self) {
        while let Ok(update) = self.updates.try_recv() {
            let finished = self.view.busy && !update.busy;
            self.view = update;
            if finished {
                self.message = Some("Done".to_string());
            }
        }
    }

    fn selected(&self) -> Option<ServiceName> {
        self.list_state
            .selected()
            .and_then(|i| ServiceName::ALL.get(i).copied())
    }

    fn next(&mut self) {
        let len = ServiceName::ALL.len();
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

    fn previous(&mut self) {
        let len = ServiceName::ALL.len();
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
}
