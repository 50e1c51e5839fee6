use std::sync::Mutex;

use midir::{MidiOutput, MidiOutputConnection};
use zyngine_types::MidiChannel;

const CC_BANK_SELECT_MSB: u8 = 0;
const CC_BANK_SELECT_LSB: u8 = 32;

/// The MIDI-dispatch collaborator engines send controller, bank and program
/// messages through. Implementations log their own failures.
pub trait MidiRouter: Send + Sync {
    fn set_midi_control(&self, channel: MidiChannel, controller: u8, value: u8);

    fn set_midi_bank_msb(&self, channel: MidiChannel, msb: u8);

    /// Bank select (MSB and LSB) followed by a program change.
    fn set_midi_preset(&self, channel: MidiChannel, msb: u8, lsb: u8, program: u8);
}

/// Encode a Control Change message.
pub fn control_change(channel: MidiChannel, controller: u8, value: u8) -> [u8; 3] {
    [0xB0 | channel.get(), controller & 0x7F, value & 0x7F]
}

/// Encode a Program Change message.
pub fn program_change(channel: MidiChannel, program: u8) -> [u8; 2] {
    [0xC0 | channel.get(), program & 0x7F]
}

/// Router that drops everything. Used when no MIDI output is configured.
pub struct NullMidi;

impl MidiRouter for NullMidi {
    fn set_midi_control(&self, _: MidiChannel, _: u8, _: u8) {}
    fn set_midi_bank_msb(&self, _: MidiChannel, _: u8) {}
    fn set_midi_preset(&self, _: MidiChannel, _: u8, _: u8, _: u8) {}
}

/// Information about an available MIDI port
#[derive(Debug, Clone)]
pub struct MidiPortInfo {
    pub index: usize,
    pub name: String,
}

/// Router writing raw messages to a system MIDI output port.
pub struct MidirOutput {
    port_name: String,
    connection: Mutex<MidiOutputConnection>,
}

impl MidirOutput {
    pub fn list_ports() -> Vec<MidiPortInfo> {
        let Ok(midi_out) = MidiOutput::new("zyngine") else {
            return Vec::new();
        };
        midi_out
            .ports()
            .iter()
            .enumerate()
            .filter_map(|(index, port)| {
                midi_out
                    .port_name(port)
                    .ok()
                    .map(|name| MidiPortInfo { index, name })
            })
            .collect()
    }

    /// Connect to the first output port whose name contains `name`.
    pub fn connect(name: &str) -> Result<Self, String> {
        let midi_out = MidiOutput::new("zyngine").map_err(|e| e.to_string())?;
        let ports = midi_out.ports();
        let (port, port_name) = ports
            .iter()
            .find_map(|p| {
                let port_name = midi_out.port_name(p).ok()?;
                port_name.contains(name).then_some((p, port_name))
            })
            .ok_or_else(|| format!("No MIDI output port matching {:?}", name))?;
        let connection = midi_out
            .connect(port, "zyngine-output")
            .map_err(|e| e.to_string())?;
        log::info!(target: "engine::midi", "MIDI output connected to {}", port_name);
        Ok(Self {
            port_name,
            connection: Mutex::new(connection),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn send(&self, message: &[u8]) {
        let mut connection = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = connection.send(message) {
            log::warn!(target: "engine::midi", "MIDI send to {} failed: {}", self.port_name, e);
        }
    }
}

impl MidiRouter for MidirOutput {
    fn set_midi_control(&self, channel: MidiChannel, controller: u8, value: u8) {
        self.send(&control_change(channel, controller, value));
    }

    fn set_midi_bank_msb(&self, channel: MidiChannel, msb: u8) {
        self.send(&control_change(channel, CC_BANK_SELECT_MSB, msb));
    }

    fn set_midi_preset(&self, channel: MidiChannel, msb: u8, lsb: u8, program: u8) {
        self.send(&control_change(channel, CC_BANK_SELECT_MSB, msb));
        self.send(&control_change(channel, CC_BANK_SELECT_LSB, lsb));
        self.send(&program_change(channel, program));
    }
}

/// A message recorded by `RecordingMidi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiOp {
    Control { channel: u8, controller: u8, value: u8 },
    BankMsb { channel: u8, msb: u8 },
    Preset { channel: u8, msb: u8, lsb: u8, program: u8 },
}

/// A router that records every call for assertions in tests.
#[derive(Default)]
pub struct RecordingMidi {
    ops: Mutex<Vec<MidiOp>>,
}

impl RecordingMidi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operations(&self) -> Vec<MidiOp> {
        self.ops.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.ops.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn push(&self, op: MidiOp) {
        self.ops.lock().unwrap_or_else(|e| e.into_inner()).push(op);
    }
}

impl MidiRouter for RecordingMidi {
    fn set_midi_control(&self, channel: MidiChannel, controller: u8, value: u8) {
        self.push(MidiOp::Control {
            channel: channel.get(),
            controller,
            value,
        });
    }

    fn set_midi_bank_msb(&self, channel: MidiChannel, msb: u8) {
        self.push(MidiOp::BankMsb {
            channel: channel.get(),
            msb,
        });
    }

    fn set_midi_preset(&self, channel: MidiChannel, msb: u8, lsb: u8, program: u8) {
        self.push(MidiOp::Preset {
            channel: channel.get(),
            msb,
            lsb,
            program,
        });
    }
}
