//! # zyngine-core
//!
//! Supervises one external sound engine process: starts and stops it, talks
//! to it over a line-oriented pipe protocol, opens an OSC channel to it, and
//! keeps per-MIDI-channel controller state that can be replayed over OSC or
//! MIDI CC.

pub mod busy;
pub mod config;
pub mod controllers;
pub mod display;
pub mod engine;
pub mod error;
pub mod listing;
pub mod midi;
pub mod osc;
pub mod process;

pub use busy::{BusyGuard, BusySignal, LoadingObserver, NullObserver};
pub use config::Config;
pub use controllers::{BroadcastReport, ControllerSnapshot, ControllerStore};
pub use engine::{Engine, EngineDriver, EngineOptions, GenericEngine};
pub use error::{EngineError, EngineResult};
pub use listing::ListRoot;
pub use midi::{MidiRouter, MidirOutput, NullMidi, RecordingMidi};
pub use osc::{OscProtocol, OscTransport};
pub use process::{CommandSpec, ProcessSupervisor, ProcessTimings};
