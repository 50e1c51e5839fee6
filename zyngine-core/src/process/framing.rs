//! Response framing over the unstructured output pipe.
//!
//! The engine protocol has no end-of-response marker, so the default framing
//! infers the end from timing. Processes that do print a terminator line can
//! plug in `TerminatorFraming` instead without touching callers.

use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

pub trait ResponseFraming: Send + Sync {
    /// Collect the lines that make up one response, waiting at most as the
    /// framing allows given `timeout`.
    fn collect(&self, lines: &Receiver<String>, timeout: Duration) -> Vec<String>;
}

/// Read until the queue goes quiet.
///
/// Every pop waits up to the current window, which starts at the caller's
/// timeout. Once `batch_limit` lines have arrived the window shrinks to
/// `grace`, on the assumption that the rest of the response follows quickly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeoutFraming {
    pub batch_limit: usize,
    pub grace: Duration,
}

impl Default for TimeoutFraming {
    fn default() -> Self {
        Self {
            batch_limit: 2,
            grace: Duration::from_millis(100),
        }
    }
}

impl ResponseFraming for TimeoutFraming {
    fn collect(&self, lines: &Receiver<String>, timeout: Duration) -> Vec<String> {
        let mut out = Vec::new();
        let mut window = timeout;
        while let Ok(line) = lines.recv_timeout(window) {
            out.push(line);
            if out.len() >= self.batch_limit {
                window = self.grace.min(window);
            }
        }
        out
    }
}

/// Read until a line equal to `terminator` arrives or the timeout elapses.
/// The terminator line itself is not returned.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminatorFraming {
    pub terminator: String,
}

impl TerminatorFraming {
    pub fn new(terminator: &str) -> Self {
        Self {
            terminator: terminator.to_string(),
        }
    }
}

impl ResponseFraming for TerminatorFraming {
    fn collect(&self, lines: &Receiver<String>, timeout: Duration) -> Vec<String> {
        let deadline = Instant::now() + timeout;
        let mut out = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match lines.recv_timeout(remaining) {
                Ok(line) if line.trim_end() == self.terminator => break,
                Ok(line) => out.push(line),
                Err(_) => break,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn queue(lines: &[&str]) -> Receiver<String> {
        let (tx, rx) = crossbeam_channel::unbounded();
        for l in lines {
            tx.send(l.to_string()).unwrap();
        }
        rx
    }

    #[test]
    fn timeout_framing_collects_queued_lines_in_order() {
        let rx = queue(&["a", "b", "c"]);
        let framing = TimeoutFraming::default();
        assert_eq!(framing.collect(&rx, Duration::from_millis(20)), vec!["a", "b", "c"]);
    }

    #[test]
    fn timeout_framing_empty_queue_waits_full_timeout() {
        let (_tx, rx) = crossbeam_channel::unbounded::<String>();
        let framing = TimeoutFraming::default();
        let start = Instant::now();
        assert!(framing.collect(&rx, Duration::from_millis(50)).is_empty());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn timeout_framing_shrinks_window_after_batch() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let producer = thread::spawn(move || {
            tx.send("one".to_string()).unwrap();
            tx.send("two".to_string()).unwrap();
            // Arrives after the grace window but well inside the long timeout.
            thread::sleep(Duration::from_millis(300));
            let _ = tx.send("late".to_string());
        });
        let framing = TimeoutFraming {
            batch_limit: 2,
            grace: Duration::from_millis(20),
        };
        let start = Instant::now();
        let lines = framing.collect(&rx, Duration::from_secs(5));
        assert_eq!(lines, vec!["one", "two"]);
        assert!(start.elapsed() < Duration::from_secs(1));
        producer.join().unwrap();
    }

    #[test]
    fn timeout_framing_stops_on_disconnect() {
        let rx = queue(&["x"]);
        let framing = TimeoutFraming::default();
        let start = Instant::now();
        assert_eq!(framing.collect(&rx, Duration::from_secs(5)), vec!["x"]);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn terminator_framing_stops_at_marker() {
        let (tx, rx) = crossbeam_channel::unbounded();
        for l in ["line 1", "line 2", "OK", "next response"] {
            tx.send(l.to_string()).unwrap();
        }
        let framing = TerminatorFraming::new("OK");
        assert_eq!(framing.collect(&rx, Duration::from_secs(1)), vec!["line 1", "line 2"]);
        assert_eq!(rx.try_recv().unwrap(), "next response");
    }
}
