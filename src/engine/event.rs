//! Session events: raw input from the transport and log deliveries.

use std::sync::Arc;

/// Payload of a `Recv` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecvData {
    /// Bytes owned by the event.
    Owned(Vec<u8>),
    /// Bytes waiting in the transport's hand-off buffer. The receiver that
    /// queued this is blocked until the session hands the buffer back.
    Shared(usize),
}

impl RecvData {
    /// The zero-length read that signals a closed transport.
    pub const fn closed() -> Self {
        Self::Owned(Vec::new())
    }

    /// Number of bytes described.
    pub fn len(&self) -> usize {
        match self {
            Self::Owned(bytes) => bytes.len(),
            Self::Shared(len) => *len,
        }
    }

    /// Zero length means the transport closed.
    pub fn is_closed(&self) -> bool {
        self.len() == 0
    }
}

/// Multi-line log capture shared by every console it was delivered to.
///
/// Each console holds one handle and releases it exactly once, by dropping
/// it, after printing or discarding. Consumers only read.
#[derive(Clone, Debug)]
pub struct LogBatch {
    lines: Arc<[String]>,
}

impl LogBatch {
    /// Wrap captured lines.
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines: lines.into() }
    }

    /// The captured buffers, in order.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// True if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of live handles (this one included).
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.lines)
    }

    /// Give up this consumer's handle.
    pub fn release(self) {}
}

/// One entry in a session's event queue.
#[derive(Debug)]
pub enum Event {
    /// Input from the transport. Zero length = closed.
    Recv(RecvData),
    /// A single owned log line.
    Alert(String),
    /// A shared multi-line log batch.
    AlertMulti(LogBatch),
}

impl Event {
    /// True for input events, which take display priority over alerts.
    pub fn is_recv(&self) -> bool {
        matches!(self, Self::Recv(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_recv() {
        assert!(RecvData::closed().is_closed());
        assert!(RecvData::Shared(0).is_closed());
        assert!(!RecvData::Shared(3).is_closed());
        assert_eq!(RecvData::Owned(b"ab".to_vec()).len(), 2);
    }

    #[test]
    fn test_batch_release_drops_holder() {
        let batch = LogBatch::new(vec!["a\n".into(), "b\n".into()]);
        let copy = batch.clone();
        assert_eq!(batch.holders(), 2);
        copy.release();
        assert_eq!(batch.holders(), 1);
    }
}
