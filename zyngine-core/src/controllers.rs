//! Per-channel controller configuration.
//!
//! Every engine type has one immutable controller template. A channel gets its
//! own deep copy the first time it is loaded; until then reads fall through to
//! the template. Broadcasting only touches loaded channels, which is how
//! per-channel overrides compose with the shared defaults.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rosc::OscType;
use serde::{Deserialize, Serialize};
use zyngine_types::{
    ControllerAddress, ControllerConfig, ControllerDescriptor, ControllerRoute, ControllerValue, MidiChannel,
    MIDI_CC_MAX, MIDI_CHANNELS,
};

use crate::error::{EngineError, EngineResult};
use crate::midi::MidiRouter;
use crate::osc::OscTransport;

/// Current value of a descriptor in OSC representation. Labels are sent as
/// their index in the label set.
pub fn osc_value(descriptor: &ControllerDescriptor) -> OscType {
    match &descriptor.value {
        ControllerValue::Int(v) => OscType::Int(*v),
        ControllerValue::Float(v) => OscType::Float(*v),
        ControllerValue::Label(_) => OscType::Int(descriptor.label_index().unwrap_or(0) as i32),
    }
}

/// Send one descriptor's current value wherever its address points.
pub fn route_controller<'a>(
    channel: MidiChannel,
    descriptor: &'a ControllerDescriptor,
    osc: &OscTransport,
    midi: &dyn MidiRouter,
) -> ControllerRoute<'a> {
    let route = descriptor.route();
    match route {
        ControllerRoute::Osc(path) => osc.send(path, osc_value(descriptor)),
        ControllerRoute::MidiCc(cc) => midi.set_midi_control(channel, cc, descriptor.midi_value()),
        ControllerRoute::Unwired => {
            log::trace!(target: "engine::controllers", "{} is not wired", descriptor.name)
        }
    }
    route
}

/// Counts of what one broadcast sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub osc: usize,
    pub midi: usize,
    pub unwired: usize,
}

/// Serialized form of every loaded channel configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub channels: BTreeMap<u8, ControllerConfig>,
}

pub struct ControllerStore {
    template: Arc<ControllerConfig>,
    channels: [RwLock<Option<ControllerConfig>>; MIDI_CHANNELS],
}

impl ControllerStore {
    pub fn new(template: Arc<ControllerConfig>) -> Self {
        Self {
            template,
            channels: std::array::from_fn(|_| RwLock::new(None)),
        }
    }

    pub fn template(&self) -> &ControllerConfig {
        &self.template
    }

    fn slot(&self, channel: MidiChannel) -> RwLockReadGuard<'_, Option<ControllerConfig>> {
        self.channels[channel.index()]
            .read()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn slot_mut(&self, channel: MidiChannel) -> RwLockWriteGuard<'_, Option<ControllerConfig>> {
        self.channels[channel.index()]
            .write()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Give `channel` its own copy of the template. Returns false if it
    /// already had one or the channel is out of range.
    pub fn load(&self, channel: u8) -> bool {
        let Some(channel) = MidiChannel::new(channel) else {
            log::warn!(target: "engine::controllers", "ignoring load for invalid channel {}", channel);
            return false;
        };
        let mut slot = self.slot_mut(channel);
        if slot.is_some() {
            return false;
        }
        *slot = Some(ControllerConfig::clone(&self.template));
        log::debug!(target: "engine::controllers", "loaded controller config for channel {}", channel);
        true
    }

    pub fn is_loaded(&self, channel: u8) -> bool {
        MidiChannel::new(channel).is_some_and(|ch| self.slot(ch).is_some())
    }

    /// Drop every channel's copy; all channels fall back to the template.
    pub fn reset(&self) {
        for channel in MidiChannel::all() {
            *self.slot_mut(channel) = None;
        }
    }

    /// The channel's configuration if loaded, otherwise the template.
    pub fn active_list(&self, channel: u8) -> ControllerConfig {
        MidiChannel::new(channel)
            .and_then(|ch| self.slot(ch).clone())
            .unwrap_or_else(|| ControllerConfig::clone(&self.template))
    }

    /// Controllers of screen `index` in the channel's loaded configuration.
    /// `None` if the channel isn't loaded or the index is out of range.
    pub fn descriptor_group(&self, channel: u8, index: usize) -> Option<Vec<ControllerDescriptor>> {
        let channel = MidiChannel::new(channel)?;
        self.slot(channel).as_ref()?.screen_controllers(index)
    }

    pub fn controller(&self, channel: u8, name: &str) -> Option<ControllerDescriptor> {
        self.active_list(channel).controller(name).cloned()
    }

    /// Change one controller on `channel`, loading the channel first if
    /// needed. Returns the updated descriptor, or `None` if the channel, the
    /// name or the value is invalid.
    pub fn set_value(&self, channel: u8, name: &str, value: ControllerValue) -> Option<ControllerDescriptor> {
        let ch = MidiChannel::new(channel)?;
        self.load(channel);
        let mut slot = self.slot_mut(ch);
        let descriptor = slot.as_mut()?.controller_mut(name)?;
        if !descriptor.set_value(value.clone()) {
            log::warn!(
                target: "engine::controllers",
                "channel {}: {} cannot take value {}",
                channel,
                name,
                value
            );
            return None;
        }
        Some(descriptor.clone())
    }

    /// Every descriptor of every loaded channel in `channels`, in channel order.
    pub fn loaded_descriptors(&self, channels: RangeInclusive<u8>) -> Vec<(MidiChannel, ControllerDescriptor)> {
        let mut out = Vec::new();
        for channel in channels.filter_map(MidiChannel::new) {
            if let Some(config) = self.slot(channel).as_ref() {
                out.extend(config.controllers.iter().map(|d| (channel, d.clone())));
            }
        }
        out
    }

    /// Send every loaded channel's controller values: OSC for textual
    /// addresses, MIDI CC for positive numeric ones, nothing for the rest.
    pub fn broadcast(
        &self,
        channels: RangeInclusive<u8>,
        osc: &OscTransport,
        midi: &dyn MidiRouter,
    ) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut beyond_cc_range = Vec::new();
        for (channel, descriptor) in self.loaded_descriptors(channels) {
            match route_controller(channel, &descriptor, osc, midi) {
                ControllerRoute::Osc(_) => report.osc += 1,
                ControllerRoute::MidiCc(_) => report.midi += 1,
                ControllerRoute::Unwired => {
                    report.unwired += 1;
                    if matches!(descriptor.address, Some(ControllerAddress::MidiCc(cc)) if cc > MIDI_CC_MAX as i32)
                        && !beyond_cc_range.contains(&descriptor.name)
                    {
                        beyond_cc_range.push(descriptor.name.clone());
                    }
                }
            }
        }
        if !beyond_cc_range.is_empty() {
            log::warn!(
                target: "engine::controllers",
                "CC numbers above {} are not sent: {}",
                MIDI_CC_MAX,
                beyond_cc_range.join(", ")
            );
        }
        log::debug!(target: "engine::controllers", "broadcast {:?}", report);
        report
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        let mut channels = BTreeMap::new();
        for channel in MidiChannel::all() {
            if let Some(config) = self.slot(channel).as_ref() {
                channels.insert(channel.get(), config.clone());
            }
        }
        ControllerSnapshot { channels }
    }

    /// Replace all channel configurations with the snapshot's. Channels absent
    /// from the snapshot fall back to the template.
    ///
    /// The snapshot is checked first: an invalid channel or value range rejects
    /// it and leaves the current state alone.
    pub fn restore(&self, snapshot: ControllerSnapshot) -> EngineResult {
        let mut checked = Vec::with_capacity(snapshot.channels.len());
        for (channel, config) in snapshot.channels {
            let ch = MidiChannel::new(channel)
                .ok_or_else(|| EngineError::Snapshot(format!("invalid channel {}", channel)))?;
            if let Some(bad) = config.invalid_controller() {
                return Err(EngineError::Snapshot(format!(
                    "channel {}: controller {} has invalid range {:?}",
                    channel, bad.name, bad.range
                )));
            }
            checked.push((ch, config));
        }
        self.reset();
        for (ch, config) in checked {
            *self.slot_mut(ch) = Some(config);
        }
        Ok(())
    }

    pub fn save_snapshot(&self, path: &Path) -> EngineResult {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path, json).map_err(|e| EngineError::Snapshot(format!("{}: {}", path.display(), e)))
    }

    pub fn load_snapshot(&self, path: &Path) -> EngineResult {
        let json = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Snapshot(format!("{}: {}", path.display(), e)))?;
        let snapshot: ControllerSnapshot = serde_json::from_str(&json)?;
        self.restore(snapshot)
    }
}
