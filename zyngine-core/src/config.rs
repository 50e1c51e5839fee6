use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::listing::ListRoot;
use crate::osc::OscProtocol;
use crate::process::{CommandSpec, ProcessTimings};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    engine: EngineConfig,
    #[serde(default)]
    process: ProcessConfig,
    #[serde(default)]
    osc: OscConfig,
    #[serde(default)]
    display: DisplayConfig,
    #[serde(default)]
    midi: MidiConfig,
}

#[derive(Deserialize, Default)]
struct EngineConfig {
    name: Option<String>,
    command: Option<Vec<String>>,
    use_shell: Option<bool>,
    env: Option<BTreeMap<String, String>>,
    bank_dirs: Option<Vec<PathBuf>>,
    preset_ext: Option<String>,
}

#[derive(Deserialize, Default)]
struct ProcessConfig {
    drain_output: Option<bool>,
    startup_timeout_ms: Option<u64>,
    startup_line_limit: Option<usize>,
    response_timeout_ms: Option<u64>,
    batch_limit: Option<usize>,
    batch_grace_ms: Option<u64>,
    stop_grace_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
struct OscConfig {
    enabled: Option<bool>,
    target_port: Option<u16>,
    protocol: Option<String>,
    listen_host: Option<String>,
    listen_port: Option<u16>,
}

#[derive(Deserialize, Default)]
struct DisplayConfig {
    env_var: Option<String>,
    env_file: Option<PathBuf>,
}

#[derive(Deserialize, Default)]
struct MidiConfig {
    output_port: Option<String>,
}

/// OSC endpoint settings resolved from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OscSettings {
    pub enabled: bool,
    pub target_port: u16,
    pub protocol: OscProtocol,
    pub listen_host: IpAddr,
    pub listen_port: u16,
}

impl Default for OscSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            target_port: 6693,
            protocol: OscProtocol::Udp,
            listen_host: IpAddr::from([127, 0, 0, 1]),
            listen_port: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySettings {
    pub env_var: String,
    pub env_file: PathBuf,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            env_var: "ZYNTHIANX".to_string(),
            env_file: PathBuf::from("/root/.remote_display_env"),
        }
    }
}

pub struct Config {
    engine: EngineConfig,
    process: ProcessConfig,
    osc: OscConfig,
    display: DisplayConfig,
    midi: MidiConfig,
}

impl Config {
    /// Built-in defaults merged with the user file, if there is one.
    pub fn load() -> Self {
        match user_config_path() {
            Some(path) => Self::load_with_override(&path),
            None => Self::embedded(),
        }
    }

    /// Built-in defaults merged with the file at `path`. A missing file is not
    /// an error; a malformed one is logged and ignored.
    pub fn load_with_override(path: &Path) -> Self {
        let mut config = Self::embedded();
        if !path.exists() {
            return config;
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                Ok(user) => config.merge(user),
                Err(e) => {
                    log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                }
            },
            Err(e) => {
                log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
            }
        }
        config
    }

    fn embedded() -> Self {
        let base: ConfigFile = match toml::from_str(DEFAULT_CONFIG) {
            Ok(base) => base,
            Err(e) => {
                log::error!(target: "config", "embedded config.toml is invalid: {}", e);
                ConfigFile::default()
            }
        };
        Config {
            engine: base.engine,
            process: base.process,
            osc: base.osc,
            display: base.display,
            midi: base.midi,
        }
    }

    fn merge(&mut self, user: ConfigFile) {
        merge_engine(&mut self.engine, user.engine);
        merge_process(&mut self.process, user.process);
        merge_osc(&mut self.osc, user.osc);
        if user.display.env_var.is_some() {
            self.display.env_var = user.display.env_var;
        }
        if user.display.env_file.is_some() {
            self.display.env_file = user.display.env_file;
        }
        if user.midi.output_port.is_some() {
            self.midi.output_port = user.midi.output_port;
        }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name.as_deref().unwrap_or("generic")
    }

    pub fn command(&self) -> CommandSpec {
        let mut spec = CommandSpec::new(self.engine.command.clone().unwrap_or_default());
        spec.use_shell = self.engine.use_shell.unwrap_or(false);
        if let Some(env) = &self.engine.env {
            spec.env = env.clone().into_iter().collect();
        }
        spec
    }

    /// Directories whose subdirectories are the engine's banks.
    pub fn bank_roots(&self) -> Vec<ListRoot> {
        self.engine
            .bank_dirs
            .iter()
            .flatten()
            .map(ListRoot::new)
            .collect()
    }

    pub fn preset_ext(&self) -> &str {
        self.engine.preset_ext.as_deref().unwrap_or("")
    }

    /// Whether the process output is drained into the line queue.
    pub fn drain_output(&self) -> bool {
        self.process.drain_output.unwrap_or(true)
    }

    /// Drain and termination timings. Durations are clamped to 1ms..60s and
    /// line limits to at least one line.
    pub fn process_timings(&self) -> ProcessTimings {
        let fallback = ProcessTimings::default();
        let ms = |v: Option<u64>, d: Duration| {
            v.map(|ms| Duration::from_millis(ms.clamp(1, 60_000))).unwrap_or(d)
        };
        ProcessTimings {
            startup_timeout: ms(self.process.startup_timeout_ms, fallback.startup_timeout),
            startup_line_limit: self
                .process
                .startup_line_limit
                .map(|n| n.max(1))
                .unwrap_or(fallback.startup_line_limit),
            response_timeout: ms(self.process.response_timeout_ms, fallback.response_timeout),
            batch_limit: self
                .process
                .batch_limit
                .map(|n| n.max(1))
                .unwrap_or(fallback.batch_limit),
            batch_grace: ms(self.process.batch_grace_ms, fallback.batch_grace),
            stop_grace: ms(self.process.stop_grace_ms, fallback.stop_grace),
        }
    }

    pub fn osc(&self) -> OscSettings {
        let fallback = OscSettings::default();
        OscSettings {
            enabled: self.osc.enabled.unwrap_or(fallback.enabled),
            target_port: self.osc.target_port.unwrap_or(fallback.target_port),
            protocol: self
                .osc
                .protocol
                .as_deref()
                .and_then(parse_protocol)
                .unwrap_or(fallback.protocol),
            listen_host: self
                .osc
                .listen_host
                .as_deref()
                .and_then(|h| h.parse().ok())
                .unwrap_or(fallback.listen_host),
            listen_port: self.osc.listen_port.unwrap_or(fallback.listen_port),
        }
    }

    pub fn display(&self) -> DisplaySettings {
        let fallback = DisplaySettings::default();
        DisplaySettings {
            env_var: self.display.env_var.clone().unwrap_or(fallback.env_var),
            env_file: self.display.env_file.clone().unwrap_or(fallback.env_file),
        }
    }

    /// Substring of the MIDI output port name to connect to, if configured.
    pub fn midi_output_port(&self) -> Option<&str> {
        self.midi.output_port.as_deref()
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("zyngine").join("config.toml"))
}

fn merge_engine(base: &mut EngineConfig, user: EngineConfig) {
    if user.name.is_some() {
        base.name = user.name;
    }
    if user.command.is_some() {
        base.command = user.command;
    }
    if user.use_shell.is_some() {
        base.use_shell = user.use_shell;
    }
    if user.env.is_some() {
        base.env = user.env;
    }
    if user.bank_dirs.is_some() {
        base.bank_dirs = user.bank_dirs;
    }
    if user.preset_ext.is_some() {
        base.preset_ext = user.preset_ext;
    }
}

fn merge_process(base: &mut ProcessConfig, user: ProcessConfig) {
    if user.drain_output.is_some() {
        base.drain_output = user.drain_output;
    }
    if user.startup_timeout_ms.is_some() {
        base.startup_timeout_ms = user.startup_timeout_ms;
    }
    if user.startup_line_limit.is_some() {
        base.startup_line_limit = user.startup_line_limit;
    }
    if user.response_timeout_ms.is_some() {
        base.response_timeout_ms = user.response_timeout_ms;
    }
    if user.batch_limit.is_some() {
        base.batch_limit = user.batch_limit;
    }
    if user.batch_grace_ms.is_some() {
        base.batch_grace_ms = user.batch_grace_ms;
    }
    if user.stop_grace_ms.is_some() {
        base.stop_grace_ms = user.stop_grace_ms;
    }
}

fn merge_osc(base: &mut OscConfig, user: OscConfig) {
    if user.enabled.is_some() {
        base.enabled = user.enabled;
    }
    if user.target_port.is_some() {
        base.target_port = user.target_port;
    }
    if user.protocol.is_some() {
        base.protocol = user.protocol;
    }
    if user.listen_host.is_some() {
        base.listen_host = user.listen_host;
    }
    if user.listen_port.is_some() {
        base.listen_port = user.listen_port;
    }
}

fn parse_protocol(s: &str) -> Option<OscProtocol> {
    match s.to_lowercase().as_str() {
        "udp" => Some(OscProtocol::Udp),
        "tcp" => Some(OscProtocol::Tcp),
        _ => None,
    }
}
