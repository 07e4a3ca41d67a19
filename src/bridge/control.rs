//! Request/response entry point plus the event-stream handler.

use super::config::{SessionConfig, SharedConfig};
use super::error::ControlError;
use super::location::{AlwaysAvailable, LocationProvider};
use super::session::TestSession;
use super::sink::{EventSink, EventStream};
use crate::speedtest::engine::Engine;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use std::sync::{Arc, PoisonError};
use tracing::{debug, info};

/// Operations understood by the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    SetCustomServer,
    SetOptions,
    SetLicenseKey,
    StopTest,
}

impl Method {
    pub fn name(self) -> &'static str {
        match self {
            Method::SetCustomServer => "set-custom-server",
            Method::SetOptions => "set-options",
            Method::SetLicenseKey => "set-license-key",
            Method::StopTest => "stop-test",
        }
    }
}

impl FromStr for Method {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "set-custom-server" => Ok(Method::SetCustomServer),
            "set-options" => Ok(Method::SetOptions),
            "set-license-key" => Ok(Method::SetLicenseKey),
            "stop-test" => Ok(Method::StopTest),
            other => Err(ControlError::NotImplemented(other.to_string())),
        }
    }
}

/// A control request as it arrives from the application layer.
#[derive(Debug, Clone, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Front door of the bridge: configuration calls, stop requests, and the
/// single event-stream subscription.
pub struct ControlSurface {
    config: SharedConfig,
    sink: EventSink,
    session: TestSession,
}

impl ControlSurface {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self::with_location(engine, Arc::new(AlwaysAvailable))
    }

    pub fn with_location(engine: Arc<dyn Engine>, location: Arc<dyn LocationProvider>) -> Self {
        let config = SessionConfig::shared();
        let sink = EventSink::new();
        let session = TestSession::new(engine, location, Arc::clone(&config), sink.clone());
        Self {
            config,
            sink,
            session,
        }
    }

    /// Dispatches one named operation.
    pub fn handle(&self, method: &str, arguments: &Value) -> Result<Value, ControlError> {
        let method: Method = method.parse().inspect_err(|_| {
            debug!(method, "Unknown control method");
        })?;
        debug!(method = method.name(), "Control call");

        match method {
            Method::SetCustomServer => self.configure(|c| c.set_custom_server(arguments)),
            Method::SetOptions => self.configure(|c| c.set_options(arguments)),
            Method::SetLicenseKey => self.configure(|c| c.set_license_key(arguments)),
            Method::StopTest => {
                self.session.force_stop()?;
                Ok(Value::Null)
            }
        }
    }

    pub fn handle_call(&self, call: &MethodCall) -> Result<Value, ControlError> {
        self.handle(&call.method, &call.arguments)
    }

    fn configure<F>(&self, apply: F) -> Result<Value, ControlError>
    where
        F: FnOnce(&mut SessionConfig) -> Result<&'static str, ControlError>,
    {
        let mut config = self.config.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut config).map(|msg| Value::String(msg.to_string()))
    }

    /// Subscribes to the event stream and starts a run with the current
    /// configuration. A previous subscriber is replaced and its run stopped.
    ///
    /// The run is launched on a spawned task, so this must be called from
    /// within a tokio runtime. It panics otherwise.
    pub fn listen(&self) -> EventStream {
        let (run_id, stream) = self.session.start();
        info!(run_id, "Subscriber attached");
        stream
    }

    /// Drops the subscriber. An in-flight run keeps going until stopped.
    pub fn cancel(&self) {
        self.sink.detach();
    }

    /// Copy of the stored configuration.
    pub fn config(&self) -> SessionConfig {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn session(&self) -> &TestSession {
        &self.session
    }
}
