//! SSH console.
//!
//! Key exchange, channel crypto and the protocol library live behind
//! `SshChannel`. The library is single-threaded: only the session task
//! reads or writes it. The receiver task only waits for the socket to
//! become readable and then blocks until the session has drained the
//! channel.

use std::sync::Arc;

use log::debug;

use super::{expand_lf, normalize_cr, Decoded, Handoff, RawSource, Receiver, RecvLink, Transport, TransportError};
use crate::engine::event::RecvData;
use crate::task::{TaskBase, TaskConfig};

/// Session-side read result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SshRead {
    Data(usize),
    /// Drained; wait for the socket again.
    WouldBlock,
    Closed,
}

/// An established SSH channel.
pub trait SshChannel: Send + Sync + 'static {
    /// Block until the underlying socket has input. An error means the
    /// socket is gone.
    fn wait_readable(&self) -> Result<(), TransportError>;

    /// Non-blocking read of decrypted channel data.
    fn read(&self, buf: &mut [u8]) -> SshRead;

    fn write(&self, bytes: &[u8]) -> Result<usize, TransportError>;

    /// Close the channel and its socket; unblocks `wait_readable`.
    fn close(&self);
}

/// Readiness-only source: reports one pending "read" per wakeup.
pub struct SshReadiness<C> {
    channel: Arc<C>,
}

impl<C: SshChannel> RawSource for SshReadiness<C> {
    fn read(&self, _buf: &mut [u8]) -> Result<usize, TransportError> {
        self.channel.wait_readable().map(|()| 1)
    }

    fn close(&self) {
        self.channel.close();
    }
}

/// Console over an SSH channel.
pub struct SshTransport<C> {
    name: String,
    channel: Arc<C>,
    handoff: Arc<Handoff>,
    readiness: Option<SshReadiness<C>>,
    receiver_task: TaskConfig,
    after_cr: bool,
    buf: Vec<u8>,
    scratch: Vec<u8>,
}

impl<C: SshChannel> SshTransport<C> {
    pub fn new(name: &str, channel: C, receiver_task: TaskConfig) -> Self {
        let channel = Arc::new(channel);
        Self {
            name: name.to_string(),
            readiness: Some(SshReadiness { channel: Arc::clone(&channel) }),
            channel,
            // Only the semaphore is used; data stays in the library.
            handoff: Arc::new(Handoff::new(1)),
            receiver_task,
            after_cr: false,
            buf: vec![0u8; super::handoff::HANDOFF_SIZE],
            scratch: Vec::new(),
        }
    }

    fn drain(&mut self, out: &mut Vec<u8>) -> Decoded {
        loop {
            match self.channel.read(&mut self.buf) {
                SshRead::Data(n) => normalize_cr(&self.buf[..n], out, &mut self.after_cr),
                SshRead::WouldBlock => return Decoded::Open,
                SshRead::Closed => return Decoded::Closed,
            }
        }
    }
}

impl<C: SshChannel> Transport for SshTransport<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, bytes: &[u8]) -> usize {
        self.scratch.clear();
        expand_lf(bytes, &mut self.scratch);
        match self.channel.write(&self.scratch) {
            Ok(_) => bytes.len(),
            Err(e) => {
                debug!("{}: write failed: {}", self.name, e);
                0
            }
        }
    }

    fn decode(&mut self, data: &RecvData, out: &mut Vec<u8>) -> Decoded {
        match data {
            RecvData::Owned(bytes) => {
                normalize_cr(bytes, out, &mut self.after_cr);
                Decoded::Open
            }
            RecvData::Shared(_) => {
                let decoded = self.drain(out);
                // Everything available was consumed; let the receiver wait
                // on the socket again.
                self.handoff.give_back();
                decoded
            }
        }
    }

    fn exit(&mut self) -> bool {
        self.channel.close();
        true
    }

    fn receiver(&mut self, link: RecvLink) -> Option<Arc<dyn TaskBase>> {
        let readiness = self.readiness.take()?;
        let name = format!("{}Rx", self.name);
        Some(Arc::new(Receiver::new(&name, self.receiver_task, readiness, Arc::clone(&self.handoff), link)))
    }

    fn is_secure(&self) -> bool {
        true
    }
}
