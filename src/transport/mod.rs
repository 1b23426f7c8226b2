//! Transport adapters.
//!
//! A transport bridges one channel (UART, Telnet, SSH, BLE GATT) to a
//! console session:
//!
//! ```text
//! channel ──▶ satellite Receiver ──Recv──▶ EventQueue ──▶ ConsoleEngine
//!    ▲                 ▲                                      │
//!    │                 └──────── Handoff (give back) ◀────────┤ decode()
//!    └──────────────────────── write() ◀──────────────────────┘
//! ```
//!
//! Only the session task touches the channel's decoder and writer. A
//! receiver task exists only where the channel's receive call blocks.

pub mod gatt;
pub mod handoff;
pub mod receiver;
pub mod serial;
pub mod ssh;
pub mod telnet;

pub use handoff::Handoff;
pub use receiver::{RawSource, Receiver};

use std::sync::Arc;
use std::time::Duration;

use crate::engine::event::RecvData;
use crate::engine::queue::EventQueue;
use crate::task::TaskBase;

/// Transport-level failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("channel closed")]
    Closed,
    #[error("{0}")]
    Stack(String),
}

/// Outcome of decoding one receive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decoded {
    /// Plain bytes were appended (possibly none).
    Open,
    /// The channel reported closure while decoding.
    Closed,
}

/// Where a satellite receiver delivers its reads.
#[derive(Clone)]
pub struct RecvLink {
    pub queue: Arc<EventQueue>,
    /// Longest wait for queue space before a read is dropped.
    pub timeout: Duration,
}

/// One console channel as seen from its session.
pub trait Transport: Send + 'static {
    /// Short channel name for the banner and task names.
    fn name(&self) -> &str;

    /// Raw output. Returns bytes accepted; failures are logged, not raised.
    fn write(&mut self, bytes: &[u8]) -> usize;

    /// Turn one `Recv` into plain bytes with CR normalized to LF.
    fn decode(&mut self, data: &RecvData, out: &mut Vec<u8>) -> Decoded;

    /// Close the channel after "exit". Returns false if this channel
    /// cannot be closed, in which case the session goes on.
    fn exit(&mut self) -> bool;

    /// Task that blocks on the channel and queues `Recv` events, if the
    /// channel needs one. Called once, before the session starts.
    fn receiver(&mut self, _link: RecvLink) -> Option<Arc<dyn TaskBase>> {
        None
    }

    /// Whether secure-only commands may run here.
    fn is_secure(&self) -> bool;
}

/// Copy `input` to `out`, turning CR and CR LF into a single LF.
///
/// `after_cr` carries state across calls so a CR LF split between two
/// reads still yields one LF.
pub fn normalize_cr(input: &[u8], out: &mut Vec<u8>, after_cr: &mut bool) {
    for &b in input {
        match b {
            b'\r' => {
                out.push(b'\n');
                *after_cr = true;
            }
            b'\n' | 0 if *after_cr => *after_cr = false,
            _ => {
                out.push(b);
                *after_cr = false;
            }
        }
    }
}

/// Copy `input` to `out`, turning bare LF into CR LF.
pub fn expand_lf(input: &[u8], out: &mut Vec<u8>) {
    let mut prev = 0u8;
    for &b in input {
        if b == b'\n' && prev != b'\r' {
            out.push(b'\r');
        }
        out.push(b);
        prev = b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_cr_variants() {
        let mut out = Vec::new();
        let mut after_cr = false;
        normalize_cr(b"a\rb\r\nc\n", &mut out, &mut after_cr);
        assert_eq!(out, b"a\nb\nc\n");
    }

    #[test]
    fn test_normalize_cr_split_pair() {
        let mut out = Vec::new();
        let mut after_cr = false;
        normalize_cr(b"x\r", &mut out, &mut after_cr);
        normalize_cr(b"\ny", &mut out, &mut after_cr);
        assert_eq!(out, b"x\ny");
    }

    #[test]
    fn test_normalize_cr_nul() {
        let mut out = Vec::new();
        let mut after_cr = false;
        normalize_cr(b"q\r\0", &mut out, &mut after_cr);
        assert_eq!(out, b"q\n");
    }

    #[test]
    fn test_expand_lf() {
        let mut out = Vec::new();
        expand_lf(b"a\nb\r\n", &mut out);
        assert_eq!(out, b"a\r\nb\r\n");
    }
}
