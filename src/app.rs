use crate::settings::{Settings, SettingsField};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use speedbridge::{ResultSnapshot, SessionEvent, TestStatus};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppView {
    Main,
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Download,
    Upload,
    Ping,
}

impl Panel {
    pub fn next(self) -> Self {
        match self {
            Panel::Download => Panel::Upload,
            Panel::Upload => Panel::Ping,
            Panel::Ping => Panel::Download,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Panel::Download => Panel::Ping,
            Panel::Upload => Panel::Download,
            Panel::Ping => Panel::Upload,
        }
    }
}

const MAX_SAMPLES: usize = 200;

/// Terminal subscriber state, rebuilt from the snapshots it receives.
pub struct App {
    pub snapshot: ResultSnapshot,
    pub error: Option<String>,
    pub should_quit: bool,

    // UI state
    pub view: AppView,
    pub selected_panel: Panel,
    pub expanded: bool,

    pub settings: Settings,
    pub selected_setting: SettingsField,

    // Speed samples for charts
    pub download_samples: Vec<f64>,
    pub upload_samples: Vec<f64>,
    pub ping_samples: Vec<f64>,
}

impl App {
    pub fn new() -> Self {
        Self {
            snapshot: ResultSnapshot::baseline(),
            error: None,
            should_quit: false,
            view: AppView::Main,
            selected_panel: Panel::Download,
            expanded: false,
            settings: Settings::default(),
            selected_setting: SettingsField::DownloadTime,
            download_samples: Vec::new(),
            upload_samples: Vec::new(),
            ping_samples: Vec::new(),
        }
    }

    pub fn status(&self) -> TestStatus {
        self.snapshot.status
    }

    pub fn is_running(&self) -> bool {
        self.error.is_none()
            && matches!(
                self.snapshot.status,
                TestStatus::Started
                    | TestStatus::Pinging
                    | TestStatus::Downloading
                    | TestStatus::Uploading
            )
    }

    pub fn handle_key_event(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        if key.kind != KeyEventKind::Press {
            return None;
        }

        match self.view {
            AppView::Main => self.handle_main_key(key),
            AppView::Settings => self.handle_settings_key(key),
        }
    }

    fn handle_main_key(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                Some(AppAction::Quit)
            }
            KeyCode::Char('s') => {
                if !self.is_running() {
                    self.view = AppView::Settings;
                }
                None
            }
            KeyCode::Enter => {
                if self.expanded {
                    self.expanded = false;
                    None
                } else if !self.is_running() {
                    Some(AppAction::StartTest)
                } else {
                    self.expanded = true;
                    None
                }
            }
            KeyCode::Esc => {
                if self.expanded {
                    self.expanded = false;
                    None
                } else if self.is_running() {
                    Some(AppAction::StopTest)
                } else {
                    None
                }
            }
            KeyCode::Tab | KeyCode::Right | KeyCode::Char('j') => {
                if !self.expanded {
                    self.selected_panel = self.selected_panel.next();
                }
                None
            }
            KeyCode::BackTab | KeyCode::Left | KeyCode::Char('k') => {
                if !self.expanded {
                    self.selected_panel = self.selected_panel.prev();
                }
                None
            }
            KeyCode::Char(' ') => {
                self.expanded = !self.expanded;
                None
            }
            _ => None,
        }
    }

    fn handle_settings_key(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc | KeyCode::Enter => {
                self.view = AppView::Main;
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected_setting = self.selected_setting.prev();
            }
            KeyCode::Down | KeyCode::Char('j') | KeyCode::Tab => {
                self.selected_setting = self.selected_setting.next();
            }
            KeyCode::Left | KeyCode::Char('h') => self.settings.decrease(self.selected_setting),
            KeyCode::Right | KeyCode::Char('l') => self.settings.increase(self.selected_setting),
            _ => {}
        }
        None
    }

    pub fn reset_for_new_test(&mut self) {
        self.snapshot = ResultSnapshot::baseline();
        self.error = None;
        self.download_samples.clear();
        self.upload_samples.clear();
        self.ping_samples.clear();
        self.expanded = false;
    }

    pub fn apply_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Snapshot(snapshot) => {
                match snapshot.status {
                    TestStatus::Downloading if snapshot.current_speed_mbps > 0.0 => {
                        push_sample(&mut self.download_samples, snapshot.current_speed_mbps)
                    }
                    TestStatus::Uploading if snapshot.current_speed_mbps > 0.0 => {
                        push_sample(&mut self.upload_samples, snapshot.current_speed_mbps)
                    }
                    TestStatus::Pinging if snapshot.ping > 0 => {
                        push_sample(&mut self.ping_samples, snapshot.ping as f64)
                    }
                    _ => {}
                }
                self.snapshot = snapshot;
            }
            SessionEvent::Error { message } => self.error = Some(message),
        }
    }

    /// Fraction of the given phase that is done, for progress bars.
    pub fn phase_progress(&self, phase: TestStatus) -> f64 {
        let status = self.snapshot.status;
        if status == phase {
            f64::from(self.snapshot.percent) / 100.0
        } else if status == TestStatus::Finished
            || (status != TestStatus::Stopped && status.rank() > phase.rank())
        {
            1.0
        } else {
            0.0
        }
    }
}

fn push_sample(samples: &mut Vec<f64>, value: f64) {
    samples.push(value);
    if samples.len() > MAX_SAMPLES {
        samples.remove(0);
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AppAction {
    Quit,
    StartTest,
    StopTest,
}

pub fn poll_event(timeout: Duration) -> Result<Option<Event>> {
    if event::poll(timeout)? {
        Ok(Some(event::read()?))
    } else {
        Ok(None)
    }
}
