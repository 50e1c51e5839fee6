//! Inbound OSC endpoint: a socket on an ephemeral port and the thread that
//! receives from it.

use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rosc::OscPacket;

use super::framing::FrameDecoder;
use super::OscHandler;

/// Receive timeout; bounds how long `stop` waits for the loop to notice.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub(crate) struct OscServer {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl OscServer {
    pub(crate) fn spawn_udp(socket: UdpSocket, handler: OscHandler) -> std::io::Result<Self> {
        let local_addr = socket.local_addr()?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("osc-recv".into())
            .spawn(move || {
                let mut buf = [0u8; rosc::decoder::MTU];
                while flag.load(Ordering::Relaxed) {
                    match socket.recv_from(&mut buf) {
                        Ok((n, src)) => match rosc::decoder::decode_udp(&buf[..n]) {
                            Ok((_, packet)) => dispatch(&packet, src, &handler),
                            Err(e) => {
                                log::debug!(target: "engine::osc", "undecodable packet from {}: {}", src, e)
                            }
                        },
                        Err(ref e) if is_timeout(e) => continue,
                        Err(e) => {
                            log::warn!(target: "engine::osc", "OSC receive failed: {}", e);
                            break;
                        }
                    }
                }
            })?;
        Ok(Self {
            local_addr,
            running,
            threads: vec![handle],
        })
    }

    pub(crate) fn spawn_tcp(listener: TcpListener, handler: OscHandler) -> std::io::Result<Self> {
        let local_addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("osc-accept".into())
            .spawn(move || {
                let mut connections: Vec<JoinHandle<()>> = Vec::new();
                while flag.load(Ordering::Relaxed) {
                    match listener.accept() {
                        Ok((stream, src)) => {
                            let flag = Arc::clone(&flag);
                            let handler = Arc::clone(&handler);
                            match thread::Builder::new()
                                .name("osc-conn".into())
                                .spawn(move || read_stream(stream, src, &flag, &handler))
                            {
                                Ok(h) => connections.push(h),
                                Err(e) => log::warn!(target: "engine::osc", "dropping connection from {}: {}", src, e),
                            }
                        }
                        Err(ref e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
                        Err(e) => {
                            log::warn!(target: "engine::osc", "OSC accept failed: {}", e);
                            break;
                        }
                    }
                    connections.retain(|h| !h.is_finished());
                }
                for h in connections {
                    let _ = h.join();
                }
            })?;
        Ok(Self {
            local_addr,
            running,
            threads: vec![handle],
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub(crate) fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                log::error!(target: "engine::osc", "OSC receive thread panicked");
            }
        }
    }
}

impl Drop for OscServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_stream(mut stream: TcpStream, src: SocketAddr, running: &AtomicBool, handler: &OscHandler) {
    let configured = stream
        .set_nonblocking(false)
        .and_then(|_| stream.set_read_timeout(Some(POLL_INTERVAL)));
    if let Err(e) = configured {
        log::warn!(target: "engine::osc", "OSC connection {}: {}", src, e);
        return;
    }
    let mut decoder = FrameDecoder::default();
    let mut buf = [0u8; 4096];
    while running.load(Ordering::Relaxed) {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => match decoder.push(&buf[..n]) {
                Ok(frames) => {
                    for frame in frames {
                        match rosc::decoder::decode_udp(&frame) {
                            Ok((_, packet)) => dispatch(&packet, src, handler),
                            Err(e) => log::debug!(target: "engine::osc", "undecodable packet from {}: {}", src, e),
                        }
                    }
                }
                Err(e) => {
                    log::warn!(target: "engine::osc", "closing OSC connection {}: {}", src, e);
                    break;
                }
            },
            Err(ref e) if is_timeout(e) => continue,
            Err(_) => break,
        }
    }
}

/// Hand every message to the handler, unwrapping bundles. Bundle time tags are
/// ignored.
fn dispatch(packet: &OscPacket, src: SocketAddr, handler: &OscHandler) {
    match packet {
        OscPacket::Message(msg) => handler(msg, src),
        OscPacket::Bundle(bundle) => {
            for p in &bundle.content {
                dispatch(p, src, handler);
            }
        }
    }
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
