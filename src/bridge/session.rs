//! Test session state machine.
//!
//! Engine callbacks can arrive concurrently from the engine's own threads.
//! Every snapshot mutation and emission happens while holding the session's
//! state lock, which is the single sequence point for a run. Whoever takes
//! the lock first decides a race between a terminal callback and
//! [`TestSession::force_stop`]; the loser sees a terminated run and does
//! nothing.

use super::config::{SharedConfig, StartRequest};
use super::error::{ControlError, SessionError};
use super::location::{LocationProvider, LocationStatus};
use super::sink::{EventSink, EventStream, SessionEvent};
use crate::bridge::config::ServerDescriptor;
use crate::speedtest::engine::{Engine, EngineError, EngineListener, EngineResult, EngineRun, Speed};
use crate::speedtest::{progress_percent, ResultSnapshot, TestStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Coarse lifecycle of the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    /// Waiting for the location check before the engine is started.
    Preparing,
    Running,
    /// Finished, stopped or errored.
    Terminated,
}

enum Phase {
    Idle,
    Preparing,
    Running(Box<dyn EngineRun>),
    Terminated,
}

impl Phase {
    fn public(&self) -> SessionPhase {
        match self {
            Phase::Idle => SessionPhase::Idle,
            Phase::Preparing => SessionPhase::Preparing,
            Phase::Running(_) => SessionPhase::Running,
            Phase::Terminated => SessionPhase::Terminated,
        }
    }
}

struct RunState {
    run_id: u64,
    phase: Phase,
    snapshot: ResultSnapshot,
}

struct Shared {
    config: SharedConfig,
    sink: EventSink,
    state: Mutex<RunState>,
}

impl Shared {
    fn emit_snapshot(&self, state: &RunState) {
        let delivered = self.sink.emit(SessionEvent::Snapshot(state.snapshot.clone()));
        debug!(
            run_id = state.run_id,
            status = state.snapshot.status.label(),
            delivered,
            "Snapshot emitted"
        );
    }

    fn clear_config(&self) {
        lock(&self.config).clear();
    }

    /// Launches the engine once the location check has resolved.
    fn launch(
        self: &Arc<Self>,
        run_id: u64,
        request: StartRequest,
        check: Result<(), LocationStatus>,
        engine: &dyn Engine,
    ) {
        let mut state = lock(&self.state);
        if state.run_id != run_id || !matches!(state.phase, Phase::Preparing) {
            debug!(run_id, "Start cancelled before engine launch");
            return;
        }

        if let Err(status) = check {
            let error = match status {
                LocationStatus::Denied => SessionError::PermissionDenied,
                LocationStatus::Undefined => SessionError::LocationUndefined,
            };
            self.fail(&mut state, error);
            return;
        }

        let kind = request.kind();
        let listener = Arc::new(SessionListener {
            shared: Arc::clone(self),
            run_id,
        });
        match engine.start(request, listener) {
            Ok(run) => {
                info!(run_id, mode = kind, "Speed test started");
                state.phase = Phase::Running(run);
                state.snapshot.status = TestStatus::Started;
                self.emit_snapshot(&state);
            }
            Err(e) => {
                let run = self.fail(&mut state, e.into());
                drop(state);
                drop(run);
            }
        }
    }

    /// Terminates the run with an error event. Returns the released handle so
    /// the caller can drop it after unlocking.
    fn fail(&self, state: &mut RunState, error: SessionError) -> Option<Box<dyn EngineRun>> {
        warn!(run_id = state.run_id, error = %error, "Speed test failed");
        let previous = std::mem::replace(&mut state.phase, Phase::Terminated);
        self.clear_config();
        self.sink.emit(SessionEvent::error(error.to_string()));
        match previous {
            Phase::Running(run) => Some(run),
            _ => None,
        }
    }

    /// Applies a phase callback if it belongs to the live run and does not
    /// move the run backwards. `status` of `None` keeps the current status.
    fn update<F>(&self, run_id: u64, status: Option<TestStatus>, apply: F)
    where
        F: FnOnce(&mut ResultSnapshot),
    {
        let mut state = lock(&self.state);
        if state.run_id != run_id || !matches!(state.phase, Phase::Running(_)) {
            debug!(run_id, "Ignoring callback for inactive run");
            return;
        }
        if let Some(status) = status {
            if status.rank() < state.snapshot.status.rank() {
                debug!(
                    run_id,
                    late = status.label(),
                    current = state.snapshot.status.label(),
                    "Dropping late callback"
                );
                return;
            }
            state.snapshot.status = status;
        }
        apply(&mut state.snapshot);
        self.emit_snapshot(&state);
    }

    /// Like [`Shared::update`] for a phase's final figure: when the run has
    /// already moved past `status`, the figure is still recorded and the
    /// current status is kept.
    fn settle<F>(&self, run_id: u64, status: TestStatus, apply: F)
    where
        F: FnOnce(&mut ResultSnapshot),
    {
        let mut state = lock(&self.state);
        if state.run_id != run_id || !matches!(state.phase, Phase::Running(_)) {
            debug!(run_id, "Ignoring callback for inactive run");
            return;
        }
        if status.rank() >= state.snapshot.status.rank() {
            state.snapshot.status = status;
        }
        apply(&mut state.snapshot);
        self.emit_snapshot(&state);
    }

    fn finish(&self, run_id: u64, result: EngineResult) {
        let mut state = lock(&self.state);
        if state.run_id != run_id || !matches!(state.phase, Phase::Running(_)) {
            debug!(run_id, "Ignoring finish for inactive run");
            return;
        }
        let snapshot = &mut state.snapshot;
        snapshot.status = TestStatus::Finished;
        snapshot.server = result.server.domain_or_empty().to_string();
        snapshot.server_info = result.server.describe();
        snapshot.ping = result.latency_ms;
        snapshot.jitter = result.jitter_ms;
        snapshot.download_speed_mbps = result.download.mbps;
        snapshot.upload_speed_mbps = result.upload.mbps;
        snapshot.current_speed_mbps = 0.0;
        snapshot.percent = 100;
        snapshot.download_transferred_mb = result.download_transferred_mb;
        snapshot.upload_transferred_mb = result.upload_transferred_mb;
        snapshot.connection_type = result.connection_type;
        snapshot.device_info = result.device_info;
        snapshot.ip = result.ip;
        snapshot.isp = result.isp;
        snapshot.packet_loss_percent = result.packet_loss_percent;

        info!(
            run_id,
            download_mbps = state.snapshot.download_speed_mbps,
            upload_mbps = state.snapshot.upload_speed_mbps,
            ping_ms = state.snapshot.ping,
            "Speed test finished"
        );
        self.clear_config();
        self.emit_snapshot(&state);
        let run = std::mem::replace(&mut state.phase, Phase::Terminated);
        drop(state);
        drop(run);
    }

    fn error(&self, run_id: u64, error: EngineError) {
        let mut state = lock(&self.state);
        if state.run_id != run_id || !matches!(state.phase, Phase::Running(_)) {
            debug!(run_id, error = %error, "Ignoring error for inactive run");
            return;
        }
        let run = self.fail(&mut state, error.into());
        drop(state);
        drop(run);
    }
}

/// Receives engine callbacks for one run.
struct SessionListener {
    shared: Arc<Shared>,
    run_id: u64,
}

impl EngineListener for SessionListener {
    fn on_servers_received(&self, servers: &[ServerDescriptor]) {
        debug!(run_id = self.run_id, count = servers.len(), "Servers received");
        self.shared.update(self.run_id, Some(TestStatus::Pinging), |_| {});
    }

    fn on_server_selected(&self, server: &ServerDescriptor, latency_ms: i64, jitter_ms: i64) {
        self.shared.update(self.run_id, Some(TestStatus::Pinging), |s| {
            s.server = server.domain_or_empty().to_string();
            s.server_info = server.describe();
            s.ping = latency_ms;
            s.jitter = jitter_ms;
        });
    }

    fn on_download_started(&self) {
        self.shared.update(self.run_id, Some(TestStatus::Downloading), |_| {});
    }

    fn on_download_progress(&self, progress: f64, speed: Speed, transferred_mb: f64) {
        self.shared.update(self.run_id, Some(TestStatus::Downloading), |s| {
            s.percent = progress_percent(progress);
            s.current_speed_mbps = speed.mbps;
            s.download_speed_mbps = speed.mbps;
            s.download_transferred_mb = transferred_mb;
        });
    }

    fn on_download_finished(&self, speed: Speed) {
        self.shared.settle(self.run_id, TestStatus::Downloading, |s| {
            s.download_speed_mbps = speed.mbps;
        });
    }

    fn on_upload_started(&self) {
        self.shared.update(self.run_id, Some(TestStatus::Uploading), |s| {
            s.current_speed_mbps = 0.0;
            s.percent = 0;
        });
    }

    fn on_upload_progress(&self, progress: f64, speed: Speed, transferred_mb: f64) {
        self.shared.update(self.run_id, Some(TestStatus::Uploading), |s| {
            s.percent = progress_percent(progress);
            s.current_speed_mbps = speed.mbps;
            s.upload_speed_mbps = speed.mbps;
            s.upload_transferred_mb = transferred_mb;
        });
    }

    fn on_upload_finished(&self, speed: Speed) {
        self.shared.settle(self.run_id, TestStatus::Uploading, |s| {
            s.upload_speed_mbps = speed.mbps;
        });
    }

    fn on_finished(&self, result: EngineResult) {
        self.shared.finish(self.run_id, result);
    }

    fn on_warning(&self, message: &str) {
        warn!(run_id = self.run_id, warning = message, "Engine warning");
        self.shared.update(self.run_id, None, |s| {
            s.warning = Some(message.to_string());
        });
    }

    fn on_error(&self, error: EngineError) {
        self.shared.error(self.run_id, error);
    }
}

/// Owns one engine run at a time and the snapshot it produces.
pub struct TestSession {
    engine: Arc<dyn Engine>,
    location: Arc<dyn LocationProvider>,
    shared: Arc<Shared>,
}

impl TestSession {
    pub fn new(
        engine: Arc<dyn Engine>,
        location: Arc<dyn LocationProvider>,
        config: SharedConfig,
        sink: EventSink,
    ) -> Self {
        Self {
            engine,
            location,
            shared: Arc::new(Shared {
                config,
                sink,
                state: Mutex::new(RunState {
                    run_id: 0,
                    phase: Phase::Idle,
                    snapshot: ResultSnapshot::baseline(),
                }),
            }),
        }
    }

    /// Installs a new subscriber and begins a run with a copy of the current
    /// configuration.
    ///
    /// Any previous run is stopped silently. The subscriber is swapped under
    /// the state lock after the run id moves on, so nothing from the
    /// superseded run reaches the new stream. The location check and engine
    /// launch happen on a spawned task, so this must be called from within a
    /// tokio runtime.
    pub fn start(&self) -> (u64, EventStream) {
        let request = lock(&self.shared.config).start_request();

        let (run_id, previous, stream) = {
            let mut state = lock(&self.shared.state);
            state.run_id += 1;
            state.snapshot.reset();
            let previous = std::mem::replace(&mut state.phase, Phase::Preparing);
            let stream = self.shared.sink.attach();
            (state.run_id, previous, stream)
        };

        if let Phase::Running(mut run) = previous {
            debug!(run_id = run_id - 1, "Stopping superseded run");
            if let Err(e) = run.stop() {
                warn!(error = %e, "Superseded run did not stop cleanly");
            }
        }

        debug!(run_id, mode = request.kind(), "Preparing speed test");
        let engine = Arc::clone(&self.engine);
        let location = Arc::clone(&self.location);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let check = location.check().await;
            shared.launch(run_id, request, check, engine.as_ref());
        });

        (run_id, stream)
    }

    /// Halts the current run and reports it as stopped.
    ///
    /// Succeeds without emitting when nothing is running. A start still
    /// waiting on the location check is cancelled silently. The engine's own
    /// stop failure is returned as [`ControlError::Native`] after the run has
    /// already been reported as stopped.
    pub fn force_stop(&self) -> Result<(), ControlError> {
        let mut run = {
            let mut state = lock(&self.shared.state);
            let previous = std::mem::replace(&mut state.phase, Phase::Terminated);
            match previous {
                Phase::Running(run) => {
                    state.snapshot.status = TestStatus::Stopped;
                    info!(run_id = state.run_id, "Speed test stopped");
                    self.shared.clear_config();
                    self.shared.emit_snapshot(&state);
                    run
                }
                Phase::Preparing => {
                    debug!(run_id = state.run_id, "Cancelling pending start");
                    state.phase = Phase::Idle;
                    return Ok(());
                }
                other => {
                    state.phase = other;
                    debug!("Stop requested with no active run");
                    return Ok(());
                }
            }
        };

        run.stop().map_err(|e| {
            warn!(error = %e, "Engine failed to stop");
            ControlError::Native(e.to_string())
        })
    }

    pub fn phase(&self) -> SessionPhase {
        lock(&self.shared.state).phase.public()
    }

    pub fn snapshot(&self) -> ResultSnapshot {
        lock(&self.shared.state).snapshot.clone()
    }
}
