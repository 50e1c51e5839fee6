//! Output drain: one reader thread per output stream of the engine process,
//! all feeding a single unbounded line queue.

use std::io::{BufRead, BufReader, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

/// How long `shutdown` waits for reader threads before detaching them. A
/// grandchild that inherited the pipe can keep it open after the engine dies.
const JOIN_TIMEOUT: Duration = Duration::from_millis(500);

pub(crate) struct OutputDrain {
    lines: Receiver<String>,
    cancel: Arc<AtomicBool>,
    readers: Vec<JoinHandle<()>>,
}

impl OutputDrain {
    /// Start a reader thread for each stream.
    pub(crate) fn spawn<R: Read + Send + 'static>(
        engine: &str,
        streams: Vec<(&'static str, R)>,
    ) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let cancel = Arc::new(AtomicBool::new(false));
        let mut drain = Self {
            lines: rx,
            cancel,
            readers: Vec::with_capacity(streams.len()),
        };
        for (stream_name, stream) in streams {
            let tx = tx.clone();
            let cancel = Arc::clone(&drain.cancel);
            let label = format!("{}:{}", engine, stream_name);
            let spawned = thread::Builder::new()
                .name(format!("drain-{}", label))
                .spawn(move || read_lines(&label, stream, tx, cancel));
            match spawned {
                Ok(handle) => drain.readers.push(handle),
                Err(e) => {
                    drain.shutdown();
                    return Err(e);
                }
            }
        }
        Ok(drain)
    }

    pub(crate) fn receiver(&self) -> Receiver<String> {
        self.lines.clone()
    }

    /// Stop delivering lines and wait (bounded) for the readers to exit.
    /// Readers blocked on a still-open pipe are detached; the cancel flag keeps
    /// them from pushing anything further.
    pub(crate) fn shutdown(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + JOIN_TIMEOUT;
        for handle in self.readers.drain(..) {
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                log::warn!(target: "engine::process", "output reader still blocked, detaching it");
            }
        }
    }
}

impl Drop for OutputDrain {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

fn read_lines<R: Read>(label: &str, stream: R, tx: Sender<String>, cancel: Arc<AtomicBool>) {
    for line in BufReader::new(stream).lines() {
        if cancel.load(Ordering::SeqCst) {
            break;
        }
        match line {
            Ok(line) => {
                let line = line.trim_end_matches('\r').to_string();
                log::trace!(target: "engine::process", "{} > {}", label, line);
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                log::debug!(target: "engine::process", "{} read error: {}", label, e);
                break;
            }
        }
    }
    log::debug!(target: "engine::process", "finished draining {}", label);
}
