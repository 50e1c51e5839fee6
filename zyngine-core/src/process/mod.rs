//! Supervisor for the external engine process.
//!
//! Owns the child, its stdin, and the output drain. Commands are single text
//! lines; responses are whatever the process prints until the framing says the
//! response is over. Every operation is best-effort: failures are logged and
//! leave the supervisor in a degraded but valid state.

mod drain;
pub mod framing;

use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use crate::busy::BusySignal;
use crate::error::{EngineError, EngineResult};
use drain::OutputDrain;
pub use framing::{ResponseFraming, TerminatorFraming, TimeoutFraming};

/// Program, arguments and extra environment for the engine process.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandSpec {
    /// Program followed by its arguments.
    pub args: Vec<String>,
    /// Default for `start` callers that don't decide themselves.
    pub use_shell: bool,
    /// Variables added to (or overriding) the inherited environment.
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new<S: Into<String>>(args: impl IntoIterator<Item = S>) -> Self {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            use_shell: false,
            env: Vec::new(),
        }
    }

    pub fn set_env(&mut self, key: &str, value: &str) {
        self.env.retain(|(k, _)| k != key);
        self.env.push((key.to_string(), value.to_string()));
    }

    fn build(&self, use_shell: bool) -> EngineResult<Command> {
        if self.args.is_empty() {
            return Err(EngineError::Spawn(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty engine command",
            )));
        }
        let mut cmd = if use_shell {
            let line = self.args.join(" ");
            if cfg!(windows) {
                let mut c = Command::new("cmd");
                c.args(["/C", &line]);
                c
            } else {
                let mut c = Command::new("sh");
                c.args(["-c", &line]);
                c
            }
        } else {
            let mut c = Command::new(&self.args[0]);
            c.args(&self.args[1..]);
            c
        };
        cmd.envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        Ok(cmd)
    }
}

/// Drain and termination timings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessTimings {
    /// Wait for startup banners after spawning.
    pub startup_timeout: Duration,
    pub startup_line_limit: usize,
    /// Default wait for a command response.
    pub response_timeout: Duration,
    /// Lines after which the response window shrinks to `batch_grace`.
    pub batch_limit: usize,
    pub batch_grace: Duration,
    /// Time between the termination request and the forced kill.
    pub stop_grace: Duration,
}

impl Default for ProcessTimings {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(2),
            startup_line_limit: 2,
            response_timeout: Duration::from_millis(100),
            batch_limit: 2,
            batch_grace: Duration::from_millis(100),
            stop_grace: Duration::from_millis(200),
        }
    }
}

/// Writers lock stdin on their own so a write stuck on a full pipe never
/// blocks `stop`.
type SharedStdin = Arc<Mutex<Option<ChildStdin>>>;

struct LiveProcess {
    child: Child,
    stdin: SharedStdin,
    drain: Option<OutputDrain>,
}

pub struct ProcessSupervisor {
    name: String,
    command: CommandSpec,
    timings: ProcessTimings,
    framing: Box<dyn ResponseFraming>,
    busy: BusySignal,
    live: Mutex<Option<LiveProcess>>,
}

impl ProcessSupervisor {
    pub fn new(name: &str, command: CommandSpec, timings: ProcessTimings, busy: BusySignal) -> Self {
        Self {
            name: name.to_string(),
            command,
            timings,
            framing: Box::new(TimeoutFraming {
                batch_limit: timings.batch_limit,
                grace: timings.batch_grace,
            }),
            busy,
            live: Mutex::new(None),
        }
    }

    /// Replace the default timeout-based response framing.
    pub fn with_framing(mut self, framing: Box<dyn ResponseFraming>) -> Self {
        self.framing = framing;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self) -> &CommandSpec {
        &self.command
    }

    /// Takes effect on the next start.
    pub fn command_mut(&mut self) -> &mut CommandSpec {
        &mut self.command
    }

    pub fn timings(&self) -> ProcessTimings {
        self.timings
    }

    fn live(&self) -> MutexGuard<'_, Option<LiveProcess>> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.live().is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.live().as_ref().map(|p| p.child.id())
    }

    /// Start the process unless one is already live.
    ///
    /// Returns `Ok(false)` when a process was already running.
    pub fn try_start(&self, enable_drain: bool, use_shell: bool) -> EngineResult<bool> {
        let mut live = self.live();
        if live.is_some() {
            return Ok(false);
        }
        let _busy = self.busy.enter();
        log::info!(target: "engine::process", "Starting engine {}", self.name);

        let mut cmd = self.command.build(use_shell)?;
        cmd.stdin(Stdio::piped());
        if enable_drain {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        let mut child = cmd.spawn().map_err(EngineError::Spawn)?;
        let stdin = Arc::new(Mutex::new(child.stdin.take()));

        let drain = if enable_drain {
            let mut streams: Vec<(&'static str, Box<dyn Read + Send>)> = Vec::new();
            if let Some(out) = child.stdout.take() {
                streams.push(("stdout", Box::new(out)));
            }
            if let Some(err) = child.stderr.take() {
                streams.push(("stderr", Box::new(err)));
            }
            match OutputDrain::spawn(&self.name, streams) {
                Ok(drain) => Some(drain),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(EngineError::Spawn(e));
                }
            }
        } else {
            None
        };

        if let Some(drain) = &drain {
            let startup = TimeoutFraming {
                batch_limit: self.timings.startup_line_limit,
                grace: self.timings.batch_grace,
            };
            for line in startup.collect(&drain.receiver(), self.timings.startup_timeout) {
                log::debug!(target: "engine::process", "{} startup: {}", self.name, line);
            }
        }

        *live = Some(LiveProcess { child, stdin, drain });
        Ok(true)
    }

    pub fn start(&self, enable_drain: bool, use_shell: bool) {
        if let Err(e) = self.try_start(enable_drain, use_shell) {
            log::error!(target: "engine::process", "Can't start engine {} => {}", self.name, e);
        }
    }

    /// Stop the process: ask it to terminate, wait up to `grace`, then kill it.
    ///
    /// The handle is cleared whatever happens. Returns `Ok(false)` when no
    /// process was running, and an error when the process could not be killed.
    /// The handle lock is held until the child is reaped and its readers are
    /// shut down, so a concurrent `start` waits for the old process to go.
    pub fn try_stop(&self, grace: Duration) -> EngineResult<bool> {
        let mut live = self.live();
        let Some(mut process) = live.take() else {
            return Ok(false);
        };
        let _busy = self.busy.enter();
        log::info!(target: "engine::process", "Stopping engine {}", self.name);

        // Closing stdin alone makes well-behaved engines exit. A writer stuck on
        // a full pipe keeps it; the kill below breaks that pipe.
        match process.stdin.try_lock() {
            Ok(mut stdin) => drop(stdin.take()),
            Err(TryLockError::Poisoned(e)) => drop(e.into_inner().take()),
            Err(TryLockError::WouldBlock) => {
                log::debug!(target: "engine::process", "{}: stdin busy, skipping close", self.name);
            }
        }
        request_termination(&process.child);

        let result = match wait_for_exit(&mut process.child, grace) {
            Some(status) => {
                log::debug!(target: "engine::process", "{} exited ({})", self.name, status);
                Ok(true)
            }
            None => match process.child.kill() {
                Ok(()) => {
                    let _ = process.child.wait();
                    Ok(true)
                }
                Err(e) => match process.child.try_wait() {
                    Ok(Some(_)) => Ok(true),
                    _ => Err(EngineError::Termination(e.to_string())),
                },
            },
        };

        if let Some(mut drain) = process.drain.take() {
            drain.shutdown();
        }
        drop(live);
        result
    }

    pub fn stop(&self, grace: Duration) {
        if let Err(e) = self.try_stop(grace) {
            log::error!(target: "engine::process", "Can't stop engine {} => {}", self.name, e);
        }
    }

    /// Write one command line and collect the response.
    pub fn try_send_command(&self, text: &str, response_timeout: Duration) -> EngineResult<Vec<String>> {
        let (stdin, lines) = {
            let live = self.live();
            let process = live.as_ref().ok_or(EngineError::NotRunning)?;
            (Arc::clone(&process.stdin), process.drain.as_ref().map(OutputDrain::receiver))
        };
        let _busy = self.busy.enter();
        {
            let mut stdin = stdin.lock().unwrap_or_else(|e| e.into_inner());
            let pipe = stdin.as_mut().ok_or_else(|| {
                EngineError::Write(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "engine stdin is closed",
                ))
            })?;
            log::debug!(target: "engine::process", "{} < {}", self.name, text);
            pipe.write_all(format!("{}\n", text).as_bytes())
                .and_then(|_| pipe.flush())
                .map_err(EngineError::Write)?;
        }
        // Concurrent callers may interleave their responses.
        let Some(lines) = lines else {
            return Ok(Vec::new());
        };
        Ok(self.framing.collect(&lines, response_timeout))
    }

    /// Write one command line and collect the response. Empty when no process is
    /// running or the write fails.
    pub fn send_command(&self, text: &str, response_timeout: Duration) -> Vec<String> {
        match self.try_send_command(text, response_timeout) {
            Ok(lines) => lines,
            Err(EngineError::NotRunning) => {
                log::debug!(target: "engine::process", "{}: no process for command {:?}", self.name, text);
                Vec::new()
            }
            Err(e) => {
                log::error!(target: "engine::process", "Can't exec engine command: {} => {}", text, e);
                Vec::new()
            }
        }
    }

    /// Reap a process that exited on its own.
    /// Returns `Some(message)` if it died, `None` if healthy or not running.
    pub fn check_health(&self) -> Option<String> {
        let mut live = self.live();
        let status = match live.as_mut()?.child.try_wait() {
            Ok(Some(status)) => status,
            _ => return None,
        };
        if let Some(mut process) = live.take() {
            if let Some(mut drain) = process.drain.take() {
                drain.shutdown();
            }
        }
        Some(format!("engine {} exited ({})", self.name, status))
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.stop(self.timings.stop_grace);
    }
}

/// Poll for exit until `grace` has elapsed.
fn wait_for_exit(child: &mut Child, grace: Duration) -> Option<std::process::ExitStatus> {
    let deadline = Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
            _ => return None,
        }
    }
}

/// Ask the process to terminate (SIGTERM). Returns whether the signal was
/// delivered; a failure is only logged since the forced kill follows anyway.
#[cfg(unix)]
fn request_termination(child: &Child) -> bool {
    let pid = child.id().to_string();
    match Command::new("kill")
        .args(["-TERM", &pid])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) if status.success() => true,
        Ok(status) => {
            log::debug!(target: "engine::process", "kill -TERM {} failed ({})", pid, status);
            false
        }
        Err(e) => {
            log::debug!(target: "engine::process", "Can't run kill for {} => {}", pid, e);
            false
        }
    }
}

#[cfg(not(unix))]
fn request_termination(_child: &Child) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor(args: &[&str]) -> ProcessSupervisor {
        let timings = ProcessTimings {
            startup_timeout: Duration::from_millis(50),
            ..ProcessTimings::default()
        };
        ProcessSupervisor::new("test", CommandSpec::new(args.to_vec()), timings, BusySignal::default())
    }

    #[test]
    fn empty_command_fails_to_spawn() {
        let sup = supervisor(&[]);
        assert!(matches!(sup.try_start(true, false), Err(EngineError::Spawn(_))));
        assert!(!sup.is_running());
    }

    #[test]
    fn missing_program_leaves_handle_unset() {
        let sup = supervisor(&["/nonexistent/zyngine-engine"]);
        sup.start(true, false);
        assert!(!sup.is_running());
        assert_eq!(sup.busy.count(), 0);
    }

    #[test]
    fn stop_without_process_is_noop() {
        let sup = supervisor(&["cat"]);
        assert!(matches!(sup.try_stop(Duration::from_millis(10)), Ok(false)));
        sup.stop(Duration::from_millis(10));
        assert_eq!(sup.busy.count(), 0);
    }

    #[test]
    fn command_without_process_is_empty() {
        let sup = supervisor(&["cat"]);
        assert!(matches!(
            sup.try_send_command("status", Duration::from_millis(10)),
            Err(EngineError::NotRunning)
        ));
        assert!(sup.send_command("status", Duration::from_millis(10)).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn termination_request_reports_delivery() {
        let mut running = Command::new("sleep").arg("30").spawn().unwrap();
        assert!(request_termination(&running));
        assert!(wait_for_exit(&mut running, Duration::from_secs(5)).is_some());

        let mut reaped = Command::new("true").spawn().unwrap();
        reaped.wait().unwrap();
        assert!(!request_termination(&reaped));
    }

    #[test]
    fn set_env_replaces_existing_key() {
        let mut spec = CommandSpec::new(["engine"]);
        spec.set_env("DISPLAY", ":0");
        spec.set_env("DISPLAY", ":1");
        assert_eq!(spec.env, vec![("DISPLAY".to_string(), ":1".to_string())]);
    }
}
