//! Line-oriented front end: starts one configured engine, forwards each input
//! line as a command and prints the response. Lines starting with `:` are
//! handled here instead.

use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use zyngine_core::busy::NullObserver;
use zyngine_core::config::Config;
use zyngine_core::engine::{Engine, EngineOptions, GenericEngine};
use zyngine_core::midi::{MidiRouter, MidirOutput, NullMidi};
use zyngine_types::{ControllerValue, MidiChannel};

const USAGE: &str = "\
usage: zyngine [--verbose] [--config <file>] [--osc]

Input lines are sent to the engine. Local commands:
  :set <channel> <controller> <value>   change a controller and push it
  :list <channel>                       controllers of a channel as JSON
  :screen <channel> <index>             one controller screen as JSON
  :broadcast                            resend every loaded controller
  :banks                                list banks
  :presets <bank>                       list presets of a bank
  :bank <channel> <bank>                select a bank
  :preset <channel> <bank> <preset>     select a preset
  :save <file> / :load <file>           controller snapshot
  :display                              use the remote display on next start
  :health                               check the engine process
  :quit";

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("zyngine")
        .join("zyngine.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = match File::create(&log_path).or_else(|_| File::create("/tmp/zyngine.log")) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("zyngine: cannot create log file: {}", e);
            return;
        }
    };

    if let Err(e) = WriteLogger::init(log_level, Config::default(), log_file) {
        eprintln!("zyngine: logger init failed: {}", e);
        return;
    }

    log::info!("zyngine starting (log level: {:?})", log_level);
}

#[derive(Debug, PartialEq)]
enum Input {
    Quit,
    Help,
    Set { channel: u8, name: String, value: ControllerValue },
    List { channel: u8 },
    Screen { channel: u8, index: usize },
    Broadcast,
    Banks,
    Presets { bank: usize },
    Bank { channel: u8, bank: usize },
    Preset { channel: u8, bank: usize, preset: usize },
    Save(PathBuf),
    Load(PathBuf),
    Display,
    Health,
    Command(String),
}

fn parse_value(s: &str) -> ControllerValue {
    if let Ok(v) = s.parse::<i32>() {
        ControllerValue::Int(v)
    } else if let Ok(v) = s.parse::<f32>() {
        ControllerValue::Float(v)
    } else {
        ControllerValue::Label(s.to_string())
    }
}

fn parse_input(line: &str) -> Result<Input, String> {
    let Some(local) = line.strip_prefix(':') else {
        return Ok(Input::Command(line.to_string()));
    };
    let words: Vec<&str> = local.split_whitespace().collect();
    let num = |i: usize| -> Result<usize, String> {
        words
            .get(i)
            .ok_or_else(|| format!("missing argument {}", i))?
            .parse::<usize>()
            .map_err(|e| format!("{:?}: {}", words[i], e))
    };
    let channel = |i: usize| -> Result<u8, String> {
        let n = num(i)?;
        u8::try_from(n)
            .ok()
            .and_then(MidiChannel::new)
            .map(MidiChannel::get)
            .ok_or_else(|| format!("invalid MIDI channel {}", n))
    };
    let path = |i: usize| -> Result<PathBuf, String> {
        words
            .get(i)
            .map(PathBuf::from)
            .ok_or_else(|| "missing file argument".to_string())
    };
    match words.first().copied() {
        Some("quit") | Some("q") => Ok(Input::Quit),
        Some("help") | None => Ok(Input::Help),
        Some("set") => {
            let name = words.get(2).ok_or("missing controller name")?.to_string();
            let value = parse_value(words.get(3).ok_or("missing value")?);
            Ok(Input::Set {
                channel: channel(1)?,
                name,
                value,
            })
        }
        Some("list") => Ok(Input::List { channel: channel(1)? }),
        Some("screen") => Ok(Input::Screen {
            channel: channel(1)?,
            index: num(2)?,
        }),
        Some("broadcast") => Ok(Input::Broadcast),
        Some("banks") => Ok(Input::Banks),
        Some("presets") => Ok(Input::Presets { bank: num(1)? }),
        Some("bank") => Ok(Input::Bank {
            channel: channel(1)?,
            bank: num(2)?,
        }),
        Some("preset") => Ok(Input::Preset {
            channel: channel(1)?,
            bank: num(2)?,
            preset: num(3)?,
        }),
        Some("save") => Ok(Input::Save(path(1)?)),
        Some("load") => Ok(Input::Load(path(1)?)),
        Some("display") => Ok(Input::Display),
        Some("health") => Ok(Input::Health),
        Some(other) => Err(format!("unknown command :{}", other)),
    }
}

fn midi_router(config: &Config) -> Arc<dyn MidiRouter> {
    let Some(port) = config.midi_output_port() else {
        return Arc::new(NullMidi);
    };
    match MidirOutput::connect(port) {
        Ok(output) => Arc::new(output),
        Err(e) => {
            log::warn!("MIDI output unavailable ({}), MIDI messages are dropped", e);
            eprintln!("zyngine: MIDI output unavailable: {}", e);
            Arc::new(NullMidi)
        }
    }
}

fn print_json<T: serde::Serialize>(out: &mut impl Write, value: &T) -> io::Result<()> {
    match serde_json::to_string_pretty(value) {
        Ok(json) => writeln!(out, "{}", json),
        Err(e) => writeln!(out, "error: {}", e),
    }
}

/// Returns false when the session should end.
fn handle(engine: &mut Engine<GenericEngine>, input: Input, out: &mut impl Write) -> io::Result<bool> {
    match input {
        Input::Quit => return Ok(false),
        Input::Help => writeln!(out, "{}", USAGE)?,
        Input::Command(text) => {
            for line in engine.send_command(&text) {
                writeln!(out, "{}", line)?;
            }
        }
        Input::Set { channel, name, value } => match engine.set_controller_value(channel, &name, value) {
            Some(descriptor) => writeln!(out, "{} = {}", descriptor.name, descriptor.value)?,
            None => writeln!(out, "error: cannot set {} on channel {}", name, channel)?,
        },
        Input::List { channel } => print_json(out, &engine.controller_list(channel))?,
        Input::Screen { channel, index } => match engine.controller_group(channel, index) {
            Some(group) => print_json(out, &group)?,
            None => writeln!(out, "error: channel {} has no screen {}", channel, index)?,
        },
        Input::Broadcast => {
            let report = engine.broadcast_all();
            writeln!(out, "sent {} OSC, {} MIDI", report.osc, report.midi)?;
        }
        Input::Banks => {
            for bank in engine.bank_list() {
                writeln!(out, "{:3} {}", bank.entry.index, bank.entry.title)?;
            }
        }
        Input::Presets { bank } => match engine.bank_list().get(bank) {
            Some(bank) => {
                for preset in engine.preset_list(bank) {
                    writeln!(out, "{:3} {}", preset.program, preset.name)?;
                }
            }
            None => writeln!(out, "error: no bank {}", bank)?,
        },
        Input::Bank { channel, bank } => match (MidiChannel::new(channel), engine.bank_list().get(bank)) {
            (Some(ch), Some(bank)) => engine.set_bank(ch, bank),
            _ => writeln!(out, "error: no bank {}", bank)?,
        },
        Input::Preset { channel, bank, preset } => {
            let presets = engine
                .bank_list()
                .get(bank)
                .map(|b| engine.preset_list(b))
                .unwrap_or_default();
            match (MidiChannel::new(channel), presets.get(preset)) {
                (Some(ch), Some(p)) => engine.set_preset(ch, p),
                _ => writeln!(out, "error: no preset {} in bank {}", preset, bank)?,
            }
        }
        Input::Save(path) => report(out, engine.controllers().save_snapshot(&path), &path)?,
        Input::Load(path) => report(out, engine.controllers().load_snapshot(&path), &path)?,
        Input::Display => {
            if engine.config_remote_display() {
                writeln!(out, "remote display configured; restart the engine to use it")?;
            } else {
                writeln!(out, "no remote display")?;
            }
        }
        Input::Health => match engine.process().check_health() {
            Some(message) => writeln!(out, "{}", message)?,
            None if engine.process().is_running() => writeln!(out, "running")?,
            None => writeln!(out, "not running")?,
        },
    }
    Ok(true)
}

fn report(out: &mut impl Write, result: zyngine_core::EngineResult, path: &Path) -> io::Result<()> {
    match result {
        Ok(()) => writeln!(out, "ok: {}", path.display()),
        Err(e) => writeln!(out, "error: {}", e),
    }
}

fn main() -> io::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return Ok(());
    }
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    let use_osc = args.iter().any(|a| a == "--osc");
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from);
    init_logging(verbose);

    let config = match &config_path {
        Some(path) => Config::load_with_override(path),
        None => Config::load(),
    };
    let options = EngineOptions::from_config(&config);
    let osc_enabled = use_osc || options.osc.enabled;
    let mut engine = Engine::new(
        GenericEngine::from_config(&config),
        options,
        midi_router(&config),
        Arc::new(NullObserver),
    );

    engine.start();
    if !engine.process().is_running() {
        eprintln!("zyngine: engine {} failed to start, see the log", engine.name());
    }
    if osc_enabled {
        engine.osc_open();
        if let Some(url) = engine.osc().server_url() {
            eprintln!("zyngine: OSC feedback on {}", url);
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let keep_going = match parse_input(line) {
            Ok(input) => handle(&mut engine, input, &mut stdout)?,
            Err(e) => {
                writeln!(stdout, "error: {}", e)?;
                true
            }
        };
        stdout.flush()?;
        if !keep_going {
            break;
        }
    }

    engine.osc_close();
    engine.stop();
    log::info!("zyngine exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_engine_commands() {
        assert_eq!(
            parse_input("select 0 0 1").unwrap(),
            Input::Command("select 0 0 1".to_string())
        );
    }

    #[test]
    fn parse_set_values() {
        assert_eq!(
            parse_input(":set 3 volume 100").unwrap(),
            Input::Set {
                channel: 3,
                name: "volume".to_string(),
                value: ControllerValue::Int(100)
            }
        );
        assert_eq!(parse_value("0.5"), ControllerValue::Float(0.5));
        assert_eq!(parse_value("on"), ControllerValue::Label("on".to_string()));
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(parse_input(":set 16 volume 1").is_err());
        assert!(parse_input(":set 1 volume").is_err());
        assert!(parse_input(":screen x 0").is_err());
        assert!(parse_input(":frobnicate").is_err());
    }

    #[test]
    fn parse_local_commands() {
        assert_eq!(parse_input(":q").unwrap(), Input::Quit);
        assert_eq!(parse_input(":").unwrap(), Input::Help);
        assert_eq!(
            parse_input(":preset 1 2 3").unwrap(),
            Input::Preset { channel: 1, bank: 2, preset: 3 }
        );
        assert_eq!(parse_input(":save /tmp/c.json").unwrap(), Input::Save(PathBuf::from("/tmp/c.json")));
    }

    #[test]
    fn handle_controller_commands() {
        let config = Config::load_with_override(Path::new("/nonexistent/zyngine.toml"));
        let mut engine = Engine::new(
            GenericEngine::from_config(&config),
            EngineOptions::from_config(&config),
            Arc::new(NullMidi),
            Arc::new(NullObserver),
        );
        let mut out = Vec::new();
        assert!(handle(&mut engine, parse_input(":set 2 sustain on").unwrap(), &mut out).unwrap());
        assert!(handle(&mut engine, parse_input(":broadcast").unwrap(), &mut out).unwrap());
        assert!(!handle(&mut engine, Input::Quit, &mut out).unwrap());
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("sustain = on"));
        assert!(text.contains("sent 0 OSC, 9 MIDI"));
    }
}
