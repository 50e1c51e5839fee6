//! # zyngine-types
//!
//! Shared type definitions for the zyngine engine supervisor: controller
//! descriptors and screens, and the bank/preset listing types.

mod bank;
mod controller;

pub use bank::{Bank, ListEntry, Preset};
pub use controller::{
    ControllerAddress, ControllerConfig, ControllerDescriptor, ControllerRoute, ControllerScreen,
    ControllerValue, ValueRange, MIDI_CC_MAX,
};

/// MIDI channel number, always in `0..16`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct MidiChannel(u8);

/// Number of MIDI channels an engine keeps controller state for.
pub const MIDI_CHANNELS: usize = 16;

impl MidiChannel {
    /// Returns `None` if `channel` is not a valid MIDI channel.
    pub fn new(channel: u8) -> Option<Self> {
        ((channel as usize) < MIDI_CHANNELS).then_some(Self(channel))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn all() -> impl Iterator<Item = MidiChannel> {
        (0..MIDI_CHANNELS as u8).map(MidiChannel)
    }
}

impl TryFrom<u8> for MidiChannel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        MidiChannel::new(value).ok_or_else(|| format!("invalid MIDI channel: {}", value))
    }
}

impl From<MidiChannel> for u8 {
    fn from(channel: MidiChannel) -> Self {
        channel.0
    }
}

impl std::fmt::Display for MidiChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
