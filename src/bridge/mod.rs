//! Bridge between an application layer and a speed-test engine.

pub mod config;
pub mod control;
pub mod error;
pub mod location;
pub mod session;
pub mod sink;

pub use config::{ServerDescriptor, SessionConfig, StartRequest, TuningOptions};
pub use control::{ControlSurface, Method, MethodCall};
pub use error::{ControlError, SessionError};
pub use location::{AlwaysAvailable, LocationProvider, LocationStatus};
pub use session::{SessionPhase, TestSession};
pub use sink::{EventSink, EventStream, SessionEvent};
