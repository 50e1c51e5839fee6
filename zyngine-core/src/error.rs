//! Error values for engine operations.
//!
//! Public engine operations log these and degrade (unset handle, empty result);
//! the `try_*` variants hand them to callers that want to observe degradation.

use std::fmt;
use std::io;

pub type EngineResult<T = ()> = Result<T, EngineError>;

#[derive(Debug)]
pub enum EngineError {
    /// The external process could not be started.
    Spawn(io::Error),
    /// The OSC target could not be resolved or the listening endpoint bound.
    TransportBind(String),
    /// A command could not be written to or flushed into the process input.
    Write(io::Error),
    /// The process would not stop cleanly.
    Termination(String),
    /// An operation needed a live process and there was none.
    NotRunning,
    OscSend(String),
    Listing(String),
    Snapshot(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Spawn(e) => write!(f, "spawn failed: {}", e),
            EngineError::TransportBind(e) => write!(f, "OSC transport unavailable: {}", e),
            EngineError::Write(e) => write!(f, "command write failed: {}", e),
            EngineError::Termination(e) => write!(f, "termination failed: {}", e),
            EngineError::NotRunning => write!(f, "engine process is not running"),
            EngineError::OscSend(e) => write!(f, "OSC send failed: {}", e),
            EngineError::Listing(e) => write!(f, "listing failed: {}", e),
            EngineError::Snapshot(e) => write!(f, "snapshot failed: {}", e),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Spawn(e) | EngineError::Write(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Snapshot(e.to_string())
    }
}

impl From<rosc::OscError> for EngineError {
    fn from(e: rosc::OscError) -> Self {
        EngineError::OscSend(e.to_string())
    }
}
