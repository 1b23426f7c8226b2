//! Telnet console: protocol codec, per-connection transport, listener task.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};

use super::{normalize_cr, Decoded, Handoff, RawSource, Receiver, RecvLink, Transport, TransportError};
use crate::engine::event::RecvData;
use crate::engine::session::{ConsoleServices, ConsoleSession};
use crate::sync::lock;
use crate::task::{Parent, TaskBase, TaskConfig, TaskContext, TaskError};

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const SE: u8 = 240;

pub const OPT_ECHO: u8 = 1;
pub const OPT_SGA: u8 = 3;

/// Listener poll interval, so cancellation is noticed.
const ACCEPT_POLL: Duration = Duration::from_millis(100);
/// Longest a write may stall on a peer that stopped reading.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CodecState {
    Data,
    Iac,
    Option(u8),
    Sub,
    SubIac,
}

/// Telnet stream decoder and option negotiator.
///
/// We offer ECHO and SGA, accept the peer's SGA, refuse everything else.
/// A reply is sent only when an option's state changes, which keeps
/// negotiation from looping.
pub struct TelnetCodec {
    state: CodecState,
    after_cr: bool,
    /// Agreed state per option; `None` until negotiated.
    local: [Option<bool>; 256],
    remote: [Option<bool>; 256],
    /// Negotiation bytes waiting to be sent.
    replies: Vec<u8>,
}

impl TelnetCodec {
    pub fn new() -> Self {
        Self {
            state: CodecState::Data,
            after_cr: false,
            local: [None; 256],
            remote: [None; 256],
            replies: Vec::new(),
        }
    }

    /// Opening negotiation: WILL ECHO, WILL SGA.
    pub fn negotiate(&mut self) -> Vec<u8> {
        for opt in [OPT_ECHO, OPT_SGA] {
            self.local[opt as usize] = Some(true);
            self.replies.extend_from_slice(&[IAC, WILL, opt]);
        }
        self.take_replies()
    }

    /// Decode received bytes. Plain data goes to `out` with CR as LF.
    pub fn feed(&mut self, input: &[u8], out: &mut Vec<u8>) {
        for &b in input {
            self.state = match (self.state, b) {
                (CodecState::Data, IAC) => CodecState::Iac,
                (CodecState::Data, _) => {
                    normalize_cr(&[b], out, &mut self.after_cr);
                    CodecState::Data
                }
                (CodecState::Iac, IAC) => {
                    normalize_cr(&[IAC], out, &mut self.after_cr);
                    CodecState::Data
                }
                (CodecState::Iac, WILL..=DONT) => CodecState::Option(b),
                (CodecState::Iac, SB) => CodecState::Sub,
                (CodecState::Iac, _) => CodecState::Data,
                (CodecState::Option(cmd), opt) => {
                    self.respond(cmd, opt);
                    CodecState::Data
                }
                (CodecState::Sub, IAC) => CodecState::SubIac,
                (CodecState::Sub, _) => CodecState::Sub,
                (CodecState::SubIac, SE) => CodecState::Data,
                (CodecState::SubIac, _) => CodecState::Sub,
            };
        }
    }

    fn respond(&mut self, cmd: u8, opt: u8) {
        let i = opt as usize;
        let (table, wanted, yes, no) = match cmd {
            DO => (&mut self.local, matches!(opt, OPT_ECHO | OPT_SGA), WILL, WONT),
            DONT => (&mut self.local, false, WILL, WONT),
            WILL => (&mut self.remote, opt == OPT_SGA, DO, DONT),
            _ => (&mut self.remote, false, DO, DONT),
        };
        if table[i] != Some(wanted) {
            table[i] = Some(wanted);
            let reply = if wanted { yes } else { no };
            self.replies.extend_from_slice(&[IAC, reply, opt]);
        }
    }

    /// Negotiation replies produced by `feed`.
    pub fn take_replies(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.replies)
    }

    /// Encode text for the wire: IAC doubled, LF sent as CR LF, a bare CR
    /// as CR NUL.
    pub fn encode(input: &[u8], out: &mut Vec<u8>) {
        let mut bytes = input.iter().copied().peekable();
        while let Some(b) = bytes.next() {
            match b {
                IAC => out.extend_from_slice(&[IAC, IAC]),
                b'\n' => out.extend_from_slice(b"\r\n"),
                b'\r' if bytes.peek() == Some(&b'\n') => {}
                b'\r' => out.extend_from_slice(b"\r\0"),
                _ => out.push(b),
            }
        }
    }
}

impl Default for TelnetCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Socket read half used by the receiver task.
pub struct TcpSource {
    stream: TcpStream,
}

impl RawSource for TcpSource {
    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        Ok((&self.stream).read(buf)?)
    }

    fn close(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// One accepted Telnet connection.
pub struct TelnetTransport {
    name: String,
    stream: TcpStream,
    source: Option<TcpSource>,
    handoff: Arc<Handoff>,
    codec: TelnetCodec,
    receiver_task: TaskConfig,
    closing: bool,
    scratch: Vec<u8>,
}

impl TelnetTransport {
    /// Wrap an accepted stream and send the opening negotiation.
    pub fn new(stream: TcpStream, receiver_task: TaskConfig) -> Result<Self, TransportError> {
        let name = match stream.peer_addr() {
            Ok(peer) => format!("Telnet {}", peer),
            Err(_) => "Telnet".to_string(),
        };
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        let source = TcpSource { stream: stream.try_clone()? };
        let mut transport = Self {
            name,
            stream,
            source: Some(source),
            handoff: Arc::new(Handoff::default()),
            codec: TelnetCodec::new(),
            receiver_task,
            closing: false,
            scratch: Vec::new(),
        };
        let opening = transport.codec.negotiate();
        transport.stream.write_all(&opening)?;
        Ok(transport)
    }

    fn send_replies(&mut self) {
        let replies = self.codec.take_replies();
        if !replies.is_empty() && !self.closing {
            if let Err(e) = self.stream.write_all(&replies) {
                self.fail(&e);
            }
        }
    }

    /// A failed or stalled write ends the connection; the receiver then
    /// sees end of stream and the session closes.
    fn fail(&mut self, e: &std::io::Error) {
        warn!("{}: write failed, dropping connection: {}", self.name, e);
        self.closing = true;
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl Transport for TelnetTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, bytes: &[u8]) -> usize {
        if self.closing {
            return 0;
        }
        self.scratch.clear();
        TelnetCodec::encode(bytes, &mut self.scratch);
        match self.stream.write_all(&self.scratch) {
            Ok(()) => bytes.len(),
            Err(e) => {
                self.fail(&e);
                0
            }
        }
    }

    fn decode(&mut self, data: &RecvData, out: &mut Vec<u8>) -> Decoded {
        match data {
            RecvData::Owned(bytes) => self.codec.feed(bytes, out),
            RecvData::Shared(len) => {
                let codec = &mut self.codec;
                self.handoff.read(*len, |bytes| codec.feed(bytes, out));
                self.handoff.give_back();
            }
        }
        self.send_replies();
        Decoded::Open
    }

    fn exit(&mut self) -> bool {
        self.write(b"logout\n");
        self.closing = true;
        // The receiver sees end of stream and closes the session.
        let _ = self.stream.shutdown(Shutdown::Both);
        true
    }

    fn receiver(&mut self, link: RecvLink) -> Option<Arc<dyn TaskBase>> {
        let source = self.source.take()?;
        let name = format!("{} Rx", self.name);
        Some(Arc::new(Receiver::new(&name, self.receiver_task, source, Arc::clone(&self.handoff), link)))
    }

    fn is_secure(&self) -> bool {
        false
    }
}

/// Listener task. Owns one console session per accepted connection.
pub struct TelnetServer {
    port: u16,
    services: ConsoleServices,
    listener: Mutex<Option<TcpListener>>,
    sessions: Parent,
    stopped: AtomicBool,
}

impl TelnetServer {
    pub fn new(port: u16, services: ConsoleServices) -> Self {
        Self {
            port,
            services,
            listener: Mutex::new(None),
            sessions: Parent::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Bound address, once instantiated.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.listener).as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Number of open sessions.
    pub fn sessions(&self) -> usize {
        self.sessions.len()
    }

    fn accept(&self, stream: TcpStream) {
        if let Err(e) = stream.set_nonblocking(false) {
            warn!("Telnet: {}", e);
            return;
        }
        let config = &self.services.config;
        let transport = match TelnetTransport::new(stream, config.receiver_task) {
            Ok(t) => t,
            Err(e) => {
                warn!("Telnet: rejected connection: {}", e);
                return;
            }
        };
        info!("Telnet: accepted {}", transport.name());
        let session = ConsoleSession::new(transport, &self.services);
        // Failure is logged by the task layer and leaves nothing behind.
        let _ = self.sessions.add_child(Arc::new(session));
    }
}

impl TaskBase for TelnetServer {
    fn name(&self) -> &str {
        "TelnetServer"
    }

    fn config(&self) -> TaskConfig {
        TaskConfig::with_stack(4096)
    }

    fn instantiate(&self) -> Result<(), TaskError> {
        let fail = |e: std::io::Error| TaskError::Instantiate {
            name: self.name().to_string(),
            reason: format!("port {}: {}", self.port, e),
        };
        let listener = TcpListener::bind(("0.0.0.0", self.port)).map_err(fail)?;
        listener.set_nonblocking(true).map_err(fail)?;
        info!("Launching Telnet Server on port {}", self.port);
        *lock(&self.listener) = Some(listener);
        Ok(())
    }

    fn service(&self, ctx: &TaskContext) {
        while !ctx.is_cancelled() && !self.stopped.load(Ordering::Acquire) {
            let accepted = match lock(&self.listener).as_ref() {
                Some(listener) => listener.accept(),
                None => break,
            };
            match accepted {
                Ok((stream, _)) => self.accept(stream),
                Err(e) if e.kind() == ErrorKind::WouldBlock => std::thread::sleep(ACCEPT_POLL),
                Err(e) => {
                    warn!("Telnet: accept failed: {}", e);
                    std::thread::sleep(ACCEPT_POLL);
                }
            }
        }
    }

    fn cleanup(&self) {
        info!("Stopping Telnet Server");
        self.stopped.store(true, Ordering::Release);
        drop(lock(&self.listener).take());
        self.sessions.delete_children();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_iac_escape_and_commands_stripped() {
        let mut codec = TelnetCodec::new();
        let mut out = Vec::new();
        codec.feed(&[b'a', IAC, IAC, b'b', IAC, 241, b'c'], &mut out);
        assert_eq!(out, [b'a', IAC, b'b', b'c']);
    }

    #[test]
    fn test_subnegotiation_skipped() {
        let mut codec = TelnetCodec::new();
        let mut out = Vec::new();
        codec.feed(&[IAC, SB, 31, 0, 80, IAC, IAC, IAC, SE, b'x'], &mut out);
        assert_eq!(out, b"x");
    }

    #[test]
    fn test_cr_nul_and_crlf_become_lf() {
        let mut codec = TelnetCodec::new();
        let mut out = Vec::new();
        codec.feed(b"ls\r\0help\r\n", &mut out);
        assert_eq!(out, b"ls\nhelp\n");
    }

    #[test]
    fn test_negotiation_answers_once() {
        let mut codec = TelnetCodec::new();
        assert_eq!(codec.negotiate(), [IAC, WILL, OPT_ECHO, IAC, WILL, OPT_SGA]);
        let mut out = Vec::new();
        // Peer agrees to what we offered: nothing to answer.
        codec.feed(&[IAC, DO, OPT_ECHO, IAC, DO, OPT_SGA], &mut out);
        assert!(codec.take_replies().is_empty());
        // Peer offers NAWS (31): refuse, once.
        codec.feed(&[IAC, WILL, 31, IAC, WILL, 31], &mut out);
        assert_eq!(codec.take_replies(), [IAC, DONT, 31]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_encode() {
        let mut out = Vec::new();
        TelnetCodec::encode(&[b'a', b'\n', IAC], &mut out);
        assert_eq!(out, [b'a', b'\r', b'\n', IAC, IAC]);

        out.clear();
        TelnetCodec::encode(b"\r\x1b[Kx\r\n", &mut out);
        assert_eq!(out, b"\r\0\x1b[Kx\r\n");
    }

    #[test]
    fn test_stalled_peer_fails_write() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let _peer = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, _) = listener.accept().unwrap();
        let mut transport = TelnetTransport::new(stream, TaskConfig::default()).unwrap();

        // The peer never reads: socket buffers fill and the write times out.
        let flood = vec![b'x'; 64 * 1024 * 1024];
        let started = Instant::now();
        assert_eq!(transport.write(&flood), 0);
        assert!(started.elapsed() < WRITE_TIMEOUT * 4);

        assert_eq!(transport.write(b"more\n"), 0);
        assert!(transport.exit());
    }
}
