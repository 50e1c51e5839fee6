//! OSC transport: an outbound target on the local host and an inbound endpoint
//! on an ephemeral port with a catch-all receive handler.
//!
//! Either half failing to come up leaves both unset; the engine keeps working
//! without OSC feedback.

pub mod framing;
mod server;

use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::sync::{Arc, Mutex, MutexGuard};

use rosc::{OscMessage, OscPacket, OscType};

use crate::busy::BusySignal;
use crate::config::OscSettings;
use crate::error::{EngineError, EngineResult};
use server::OscServer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OscProtocol {
    Udp,
    Tcp,
}

impl OscProtocol {
    fn url_scheme(self) -> &'static str {
        match self {
            OscProtocol::Udp => "osc.udp",
            OscProtocol::Tcp => "osc.tcp",
        }
    }
}

/// Receives every inbound message together with its source address.
pub type OscHandler = Arc<dyn Fn(&OscMessage, SocketAddr) + Send + Sync>;

/// Default catch-all handler: log the path, the source, and every argument
/// with its type tag.
pub fn log_message(msg: &OscMessage, src: SocketAddr) {
    log::info!(target: "engine::osc", "OSC MESSAGE '{}' from '{}'", msg.addr, src);
    for arg in &msg.args {
        log::debug!(target: "engine::osc", "argument of type '{}': {:?}", type_tag(arg), arg);
    }
}

/// OSC 1.0 type tag character for an argument.
pub fn type_tag(arg: &OscType) -> char {
    match arg {
        OscType::Int(_) => 'i',
        OscType::Float(_) => 'f',
        OscType::String(_) => 's',
        OscType::Blob(_) => 'b',
        OscType::Time(_) => 't',
        OscType::Long(_) => 'h',
        OscType::Double(_) => 'd',
        OscType::Char(_) => 'c',
        OscType::Color(_) => 'r',
        OscType::Midi(_) => 'm',
        OscType::Bool(true) => 'T',
        OscType::Bool(false) => 'F',
        OscType::Array(_) => '[',
        OscType::Nil => 'N',
        OscType::Inf => 'I',
    }
}

enum OscSender {
    /// Sends from the server socket, so replies come back to our endpoint.
    Udp(UdpSocket),
    /// Connected on first send, dropped after a write error.
    Tcp(Mutex<Option<TcpStream>>),
}

struct OpenTransport {
    protocol: OscProtocol,
    target: SocketAddr,
    sender: OscSender,
    server: OscServer,
}

pub struct OscTransport {
    settings: OscSettings,
    busy: BusySignal,
    handler: OscHandler,
    state: Mutex<Option<OpenTransport>>,
}

impl OscTransport {
    pub fn new(settings: OscSettings, busy: BusySignal) -> Self {
        Self {
            settings,
            busy,
            handler: Arc::new(log_message),
            state: Mutex::new(None),
        }
    }

    /// Replace the catch-all handler. Takes effect on the next open.
    pub fn set_handler(&mut self, handler: OscHandler) {
        self.handler = handler;
    }

    fn state(&self) -> MutexGuard<'_, Option<OpenTransport>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set up the target and start the receive loop. Opening an already open
    /// transport is a no-op.
    pub fn try_open(&self, protocol: OscProtocol) -> EngineResult {
        let mut state = self.state();
        if state.is_some() {
            return Ok(());
        }
        let _busy = self.busy.enter();

        let target = SocketAddr::from((Ipv4Addr::LOCALHOST, self.settings.target_port));
        log::info!(target: "engine::osc", "OSC target in port {}", target.port());

        let listen = SocketAddr::new(self.settings.listen_host, self.settings.listen_port);
        let bind_err = |e: std::io::Error| EngineError::TransportBind(format!("{}: {}", listen, e));
        let (sender, server) = match protocol {
            OscProtocol::Udp => {
                let socket = UdpSocket::bind(listen).map_err(bind_err)?;
                let send_socket = socket.try_clone().map_err(bind_err)?;
                let server = OscServer::spawn_udp(socket, Arc::clone(&self.handler)).map_err(bind_err)?;
                (OscSender::Udp(send_socket), server)
            }
            OscProtocol::Tcp => {
                let listener = TcpListener::bind(listen).map_err(bind_err)?;
                let server = OscServer::spawn_tcp(listener, Arc::clone(&self.handler)).map_err(bind_err)?;
                (OscSender::Tcp(Mutex::new(None)), server)
            }
        };
        log::info!(target: "engine::osc", "OSC server running in port {}", server.local_addr().port());

        *state = Some(OpenTransport {
            protocol,
            target,
            sender,
            server,
        });
        Ok(())
    }

    pub fn open(&self, protocol: OscProtocol) {
        if let Err(e) = self.try_open(protocol) {
            log::error!(
                target: "engine::osc",
                "OSC Server can't be initialized ({}). Running without OSC feedback.",
                e
            );
        }
    }

    /// Stop the receive loop and release the endpoint.
    pub fn close(&self) {
        let Some(mut open) = self.state().take() else {
            return;
        };
        let _busy = self.busy.enter();
        open.server.stop();
        log::info!(target: "engine::osc", "OSC server stopped");
    }

    pub fn is_open(&self) -> bool {
        self.state().is_some()
    }

    pub fn target(&self) -> Option<SocketAddr> {
        self.state().as_ref().map(|o| o.target)
    }

    pub fn server_port(&self) -> Option<u16> {
        self.state().as_ref().map(|o| o.server.local_addr().port())
    }

    /// URL of the inbound endpoint, for engines that need to be told where to
    /// send feedback.
    pub fn server_url(&self) -> Option<String> {
        self.state().as_ref().map(|o| {
            let addr = o.server.local_addr();
            format!("{}://{}:{}/", o.protocol.url_scheme(), addr.ip(), addr.port())
        })
    }

    pub fn try_send(&self, path: &str, args: Vec<OscType>) -> EngineResult {
        let state = self.state();
        let open = state
            .as_ref()
            .ok_or_else(|| EngineError::OscSend("transport is not open".to_string()))?;
        let packet = OscPacket::Message(OscMessage {
            addr: path.to_string(),
            args,
        });
        let buf = rosc::encoder::encode(&packet)?;
        match &open.sender {
            OscSender::Udp(socket) => {
                socket
                    .send_to(&buf, open.target)
                    .map_err(|e| EngineError::OscSend(e.to_string()))?;
            }
            OscSender::Tcp(stream) => {
                let mut stream = stream.lock().unwrap_or_else(|e| e.into_inner());
                if stream.is_none() {
                    let connected = TcpStream::connect(open.target)
                        .map_err(|e| EngineError::OscSend(e.to_string()))?;
                    *stream = Some(connected);
                }
                if let Some(s) = stream.as_mut() {
                    if let Err(e) = framing::write_frame(s, &buf) {
                        *stream = None;
                        return Err(EngineError::OscSend(e.to_string()));
                    }
                }
            }
        }
        Ok(())
    }

    /// Send one typed value to `path` on the target. A closed transport makes
    /// this a no-op; send errors are logged.
    pub fn send(&self, path: &str, value: OscType) {
        if !self.is_open() {
            log::trace!(target: "engine::osc", "OSC closed, dropping {}", path);
            return;
        }
        if let Err(e) = self.try_send(path, vec![value]) {
            log::warn!(target: "engine::osc", "{} => {}", path, e);
        }
    }
}

impl Drop for OscTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings(target_port: u16) -> OscSettings {
        OscSettings {
            target_port,
            ..OscSettings::default()
        }
    }

    #[test]
    fn type_tags() {
        assert_eq!(type_tag(&OscType::Int(1)), 'i');
        assert_eq!(type_tag(&OscType::Float(1.0)), 'f');
        assert_eq!(type_tag(&OscType::String("x".into())), 's');
        assert_eq!(type_tag(&OscType::Bool(true)), 'T');
        assert_eq!(type_tag(&OscType::Nil), 'N');
    }

    #[test]
    fn closed_transport_has_no_addresses() {
        let osc = OscTransport::new(settings(6693), BusySignal::default());
        assert!(!osc.is_open());
        assert!(osc.target().is_none());
        assert!(osc.server_url().is_none());
        assert!(osc.try_send("/x", vec![OscType::Int(1)]).is_err());
        osc.send("/x", OscType::Int(1));
        osc.close();
    }

    #[test]
    fn open_binds_ephemeral_port_and_sends_to_target() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let port = receiver.local_addr().unwrap().port();

        let busy = BusySignal::default();
        let osc = OscTransport::new(settings(port), busy.clone());
        osc.open(OscProtocol::Udp);
        assert!(osc.is_open());
        assert_eq!(busy.count(), 0);
        assert_eq!(osc.target(), Some(SocketAddr::from((Ipv4Addr::LOCALHOST, port))));
        let server_port = osc.server_port().unwrap();
        assert_ne!(server_port, 0);
        assert_eq!(osc.server_url(), Some(format!("osc.udp://127.0.0.1:{}/", server_port)));

        osc.send("/part0/volume", OscType::Int(100));
        let mut buf = [0u8; rosc::decoder::MTU];
        let (n, src) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(src.port(), server_port);
        match rosc::decoder::decode_udp(&buf[..n]).unwrap().1 {
            OscPacket::Message(msg) => {
                assert_eq!(msg.addr, "/part0/volume");
                assert_eq!(msg.args, vec![OscType::Int(100)]);
            }
            other => panic!("Expected message, got {:?}", other),
        }
        osc.close();
        assert!(!osc.is_open());
    }
}
