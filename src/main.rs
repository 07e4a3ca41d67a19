mod app;
mod settings;
mod ui;

use anyhow::{Context, Result};
use app::{poll_event, App, AppAction};
use crossterm::event::Event;
use ratatui::DefaultTerminal;
use serde_json::{json, Value};
use speedbridge::speedtest::simulated::SimulatedEngine;
use speedbridge::{ControlSurface, EventStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use ui::draw_ui;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let control = ControlSurface::new(Arc::new(SimulatedEngine::default()));
    if let Ok(key) = std::env::var("SPEEDBRIDGE_LICENSE_KEY") {
        control.handle("set-license-key", &json!({ "licenseKey": key }))?;
    }

    let mut terminal = ratatui::init();
    terminal.clear()?;

    let result = run_app(&mut terminal, &control).await;

    ratatui::restore();
    result
}

/// Logs go to the file named by `SPEEDBRIDGE_LOG` so they never draw over the UI.
fn init_tracing() -> Result<()> {
    let Ok(path) = std::env::var("SPEEDBRIDGE_LOG") else {
        return Ok(());
    };
    let file = std::fs::File::create(&path)
        .with_context(|| format!("Failed to create log file {}", path))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

async fn run_app(terminal: &mut DefaultTerminal, control: &ControlSurface) -> Result<()> {
    let mut app = App::new();
    let mut events: Option<EventStream> = None;

    loop {
        terminal.draw(|frame| draw_ui(frame, &app))?;

        // Drain everything the session emitted since the last frame
        while let Some(stream) = events.as_mut() {
            match stream.try_next() {
                Ok(event) => app.apply_event(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => events = None,
            }
        }

        if let Some(Event::Key(key)) = poll_event(Duration::from_millis(30))? {
            if let Some(action) = app.handle_key_event(key) {
                match action {
                    AppAction::Quit => break,
                    AppAction::StartTest => {
                        // Options are cleared after every run. Untouched settings
                        // leave the free or licensed start in effect.
                        if app.settings.is_customized() {
                            control.handle("set-options", &app.settings.to_payload())?;
                        }
                        app.reset_for_new_test();
                        events = Some(control.listen());
                        info!("Test requested from terminal");
                    }
                    AppAction::StopTest => {
                        if let Err(e) = control.handle("stop-test", &Value::Null) {
                            warn!(code = e.code(), error = %e, "Stop request failed");
                            app.error = Some(e.to_string());
                        }
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    if app.is_running() {
        if let Err(e) = control.handle("stop-test", &Value::Null) {
            warn!(code = e.code(), error = %e, "Stop on exit failed");
        }
    }
    control.cancel();
    Ok(())
}
