//! Engine composition: one driver plus the supervisor, OSC transport,
//! controller store and MIDI router it runs on.
//!
//! `EngineDriver` is what a concrete engine type implements; `Engine<D>` is
//! what a controller holds. Everything the driver doesn't override behaves
//! like a plain MIDI-controlled process.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use zyngine_types::{Bank, ControllerConfig, ControllerDescriptor, ControllerValue, ListEntry, MidiChannel, Preset};

use crate::busy::{BusySignal, LoadingObserver};
use crate::config::{Config, DisplaySettings, OscSettings};
use crate::controllers::{route_controller, BroadcastReport, ControllerStore};
use crate::display::remote_display_vars;
use crate::listing::{self, ListRoot};
use crate::midi::MidiRouter;
use crate::osc::{OscHandler, OscProtocol, OscTransport};
use crate::process::{CommandSpec, ProcessSupervisor, ProcessTimings};

/// The per-engine-type surface.
pub trait EngineDriver: Send + Sync {
    fn name(&self) -> &str;

    /// Short name for narrow displays.
    fn nickname(&self) -> &str;

    /// Immutable controller table shared by every instance of this engine type.
    fn controller_template(&self) -> Arc<ControllerConfig>;

    fn command(&self) -> CommandSpec;

    /// Replacement for the logging catch-all OSC handler.
    fn osc_handler(&self) -> Option<OscHandler> {
        None
    }

    /// Deliver one changed controller value to the sound engine.
    fn push_controller_value(
        &self,
        channel: MidiChannel,
        descriptor: &ControllerDescriptor,
        osc: &OscTransport,
        midi: &dyn MidiRouter,
    ) {
        route_controller(channel, descriptor, osc, midi);
    }

    fn bank_list(&self) -> Vec<Bank> {
        log::info!(target: "engine", "Getting Bank List for {}: NOT IMPLEMENTED!", self.name());
        Vec::new()
    }

    fn preset_list(&self, bank: &Bank) -> Vec<Preset> {
        log::info!(
            target: "engine",
            "Getting Preset List for {} ({}): NOT IMPLEMENTED!",
            self.name(),
            bank.entry.title
        );
        Vec::new()
    }

    /// Called periodically by the controller to let the engine poll its state.
    fn refresh(&self) {}
}

/// Runtime settings an engine is built with.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub timings: ProcessTimings,
    pub drain_output: bool,
    pub osc: OscSettings,
    pub display: DisplaySettings,
}

impl Default for EngineOptions {
    /// Output is drained, matching the built-in config.
    fn default() -> Self {
        Self {
            timings: ProcessTimings::default(),
            drain_output: true,
            osc: OscSettings::default(),
            display: DisplaySettings::default(),
        }
    }
}

impl EngineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timings: config.process_timings(),
            drain_output: config.drain_output(),
            osc: config.osc(),
            display: config.display(),
        }
    }
}

pub struct Engine<D: EngineDriver> {
    driver: D,
    busy: BusySignal,
    process: ProcessSupervisor,
    osc: OscTransport,
    controllers: ControllerStore,
    midi: Arc<dyn MidiRouter>,
    options: EngineOptions,
}

impl<D: EngineDriver> Engine<D> {
    pub fn new(
        driver: D,
        options: EngineOptions,
        midi: Arc<dyn MidiRouter>,
        observer: Arc<dyn LoadingObserver>,
    ) -> Self {
        let busy = BusySignal::new(observer);
        let process = ProcessSupervisor::new(driver.name(), driver.command(), options.timings, busy.clone());
        let mut osc = OscTransport::new(options.osc.clone(), busy.clone());
        if let Some(handler) = driver.osc_handler() {
            osc.set_handler(handler);
        }
        let controllers = ControllerStore::new(driver.controller_template());
        Self {
            driver,
            busy,
            process,
            osc,
            controllers,
            midi,
            options,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn name(&self) -> &str {
        self.driver.name()
    }

    pub fn nickname(&self) -> &str {
        self.driver.nickname()
    }

    pub fn busy(&self) -> &BusySignal {
        &self.busy
    }

    pub fn process(&self) -> &ProcessSupervisor {
        &self.process
    }

    /// Replace response framing or the command before the next start.
    pub fn process_mut(&mut self) -> &mut ProcessSupervisor {
        &mut self.process
    }

    pub fn osc(&self) -> &OscTransport {
        &self.osc
    }

    pub fn controllers(&self) -> &ControllerStore {
        &self.controllers
    }

    // Process

    pub fn start(&self) {
        let use_shell = self.process.command().use_shell;
        self.process.start(self.options.drain_output, use_shell);
    }

    pub fn stop(&self) {
        self.process.stop(self.options.timings.stop_grace);
    }

    pub fn send_command(&self, text: &str) -> Vec<String> {
        self.process.send_command(text, self.options.timings.response_timeout)
    }

    pub fn send_command_timeout(&self, text: &str, response_timeout: Duration) -> Vec<String> {
        self.process.send_command(text, response_timeout)
    }

    /// Point the engine's GUI at the remote display, if one is configured.
    /// Takes effect on the next start.
    pub fn config_remote_display(&mut self) -> bool {
        let Some(vars) = remote_display_vars(&self.options.display) else {
            return false;
        };
        let command = self.process.command_mut();
        for (key, value) in &vars {
            command.set_env(key, value);
        }
        true
    }

    // OSC

    pub fn osc_open(&self) {
        self.osc.open(self.options.osc.protocol);
    }

    pub fn osc_open_with(&self, protocol: OscProtocol) {
        self.osc.open(protocol);
    }

    pub fn osc_close(&self) {
        self.osc.close();
    }

    // Controllers

    pub fn load_controllers(&self, channel: u8) -> bool {
        self.controllers.load(channel)
    }

    /// Drop all per-channel controller state.
    pub fn reset(&self) {
        self.controllers.reset();
    }

    pub fn controller_list(&self, channel: u8) -> ControllerConfig {
        self.controllers.active_list(channel)
    }

    pub fn controller_group(&self, channel: u8, index: usize) -> Option<Vec<ControllerDescriptor>> {
        self.controllers.descriptor_group(channel, index)
    }

    /// Update a controller on `channel` and push the new value to the engine.
    pub fn set_controller_value(
        &self,
        channel: u8,
        name: &str,
        value: impl Into<ControllerValue>,
    ) -> Option<ControllerDescriptor> {
        let descriptor = self.controllers.set_value(channel, name, value.into())?;
        let channel = MidiChannel::new(channel)?;
        self.driver
            .push_controller_value(channel, &descriptor, &self.osc, self.midi.as_ref());
        Some(descriptor)
    }

    /// Send every loaded channel's controller values to the engine.
    pub fn broadcast_all(&self) -> BroadcastReport {
        self.controllers.broadcast(0..=15, &self.osc, self.midi.as_ref())
    }

    // Banks and presets

    pub fn bank_list(&self) -> Vec<Bank> {
        let _busy = self.busy.enter();
        self.driver.bank_list()
    }

    pub fn preset_list(&self, bank: &Bank) -> Vec<Preset> {
        let _busy = self.busy.enter();
        self.driver.preset_list(bank)
    }

    pub fn set_bank(&self, channel: MidiChannel, bank: &Bank) {
        self.midi.set_midi_bank_msb(channel, bank.msb());
    }

    pub fn set_preset(&self, channel: MidiChannel, preset: &Preset) {
        self.midi
            .set_midi_preset(channel, preset.bank_msb, preset.bank_lsb, preset.program);
    }

    pub fn refresh(&self) {
        self.driver.refresh();
    }

    // Listings

    pub fn file_list(&self, roots: &[ListRoot], ext: &str) -> Vec<ListEntry> {
        let _busy = self.busy.enter();
        listing::file_list(roots, ext)
    }

    pub fn dir_list(&self, roots: &[ListRoot]) -> Vec<ListEntry> {
        let _busy = self.busy.enter();
        listing::dir_list(roots)
    }

    pub fn command_list(&self, cmd: &str) -> Vec<ListEntry> {
        let _busy = self.busy.enter();
        listing::command_list(cmd)
    }
}

static STANDARD_CONTROLLERS: LazyLock<Arc<ControllerConfig>> =
    LazyLock::new(|| Arc::new(ControllerConfig::standard_midi()));

/// Engine driven entirely by configuration: a command line and the general
/// MIDI controller table. Banks are subdirectories of the bank roots and
/// presets are files with `preset_ext` inside a bank.
pub struct GenericEngine {
    name: String,
    nickname: String,
    command: CommandSpec,
    bank_roots: Vec<ListRoot>,
    preset_ext: String,
}

impl GenericEngine {
    pub fn new(name: &str, command: CommandSpec) -> Self {
        Self {
            name: name.to_string(),
            nickname: name.chars().take(2).collect::<String>().to_uppercase(),
            command,
            bank_roots: Vec::new(),
            preset_ext: String::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut engine = Self::new(config.engine_name(), config.command());
        engine.bank_roots = config.bank_roots();
        engine.preset_ext = config.preset_ext().to_string();
        engine
    }

    pub fn with_banks(mut self, roots: Vec<ListRoot>, preset_ext: &str) -> Self {
        self.bank_roots = roots;
        self.preset_ext = preset_ext.to_string();
        self
    }
}

impl EngineDriver for GenericEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn nickname(&self) -> &str {
        &self.nickname
    }

    fn controller_template(&self) -> Arc<ControllerConfig> {
        Arc::clone(&STANDARD_CONTROLLERS)
    }

    fn command(&self) -> CommandSpec {
        self.command.clone()
    }

    fn bank_list(&self) -> Vec<Bank> {
        if self.bank_roots.is_empty() {
            log::info!(target: "engine", "Getting Bank List for {}: NOT IMPLEMENTED!", self.name);
            return Vec::new();
        }
        listing::dir_list(&self.bank_roots)
            .into_iter()
            .map(Bank::from)
            .collect()
    }

    fn preset_list(&self, bank: &Bank) -> Vec<Preset> {
        if self.preset_ext.is_empty() {
            return Vec::new();
        }
        listing::file_list(&[ListRoot::new(&bank.entry.path)], &self.preset_ext)
            .into_iter()
            .filter(|entry| entry.index <= 127)
            .map(|entry| Preset {
                name: entry.title,
                bank_msb: bank.msb(),
                bank_lsb: 0,
                program: entry.index as u8,
            })
            .collect()
    }
}
