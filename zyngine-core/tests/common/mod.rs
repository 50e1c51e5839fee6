#![allow(dead_code)]
//! Test harness utilities for zyngine-core integration tests.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rosc::{OscMessage, OscPacket};
use zyngine_core::busy::{BusySignal, LoadingObserver};
use zyngine_core::process::{CommandSpec, ProcessSupervisor, ProcessTimings};

/// Timings short enough to keep the suite fast.
pub fn fast_timings() -> ProcessTimings {
    ProcessTimings {
        startup_timeout: Duration::from_millis(200),
        startup_line_limit: 2,
        response_timeout: Duration::from_millis(500),
        batch_limit: 2,
        batch_grace: Duration::from_millis(100),
        stop_grace: Duration::from_millis(200),
    }
}

pub fn supervisor(args: &[&str], busy: &BusySignal) -> ProcessSupervisor {
    ProcessSupervisor::new("test-engine", CommandSpec::new(args.to_vec()), fast_timings(), busy.clone())
}

/// `sh -c <script>` as an argv command.
pub fn sh(script: &str, busy: &BusySignal) -> ProcessSupervisor {
    supervisor(&["sh", "-c", script], busy)
}

/// Observer that counts both edges.
#[derive(Default)]
pub struct CountingObserver {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl CountingObserver {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl LoadingObserver for CountingObserver {
    fn start_loading(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop_loading(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn counting_busy() -> (BusySignal, Arc<CountingObserver>) {
    let observer = Arc::new(CountingObserver::default());
    (BusySignal::new(observer.clone()), observer)
}

/// A UDP socket standing in for the sound engine's OSC port.
pub fn udp_receiver() -> (UdpSocket, u16) {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind receiver");
    socket
        .set_read_timeout(Some(Duration::from_millis(500)))
        .expect("set timeout");
    let port = socket.local_addr().expect("local addr").port();
    (socket, port)
}

/// Every message that arrives before the socket times out.
pub fn drain_messages(socket: &UdpSocket) -> Vec<OscMessage> {
    let mut buf = [0u8; rosc::decoder::MTU];
    let mut out = Vec::new();
    while let Ok((n, _)) = socket.recv_from(&mut buf) {
        if let Ok((_, packet)) = rosc::decoder::decode_udp(&buf[..n]) {
            flatten(packet, &mut out);
        }
    }
    out
}

fn flatten(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(msg) => out.push(msg),
        OscPacket::Bundle(bundle) => {
            for p in bundle.content {
                flatten(p, out);
            }
        }
    }
}

/// Handler that stores every inbound message path.
pub fn recording_handler() -> (zyngine_core::osc::OscHandler, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler: zyngine_core::osc::OscHandler = Arc::new(move |msg: &OscMessage, _src: std::net::SocketAddr| {
        sink.lock().unwrap().push(msg.addr.clone());
    });
    (handler, seen)
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
