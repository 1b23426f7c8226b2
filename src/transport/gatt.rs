//! Bluetooth LE GATT console.
//!
//! The BLE stack delivers characteristic writes from its own callback
//! context, which never blocks for long, so there is no receiver task:
//! `GattInbound` queues owned `Recv` events directly.

use log::{debug, error};

use super::{normalize_cr, Decoded, RecvLink, Transport, TransportError};
use crate::engine::event::{Event, RecvData};

/// ATT notification header bytes taken out of each MTU.
pub const ATT_HEADER: usize = 3;

/// Outbound side of a GATT console characteristic.
pub trait GattNotifier: Send + 'static {
    /// Negotiated ATT MTU.
    fn mtu(&self) -> usize;

    /// Send one notification of at most `mtu() - ATT_HEADER` bytes.
    fn notify(&mut self, chunk: &[u8]) -> Result<(), TransportError>;

    /// Drop the connection.
    fn disconnect(&mut self);
}

/// Console over GATT notifications.
pub struct GattTransport<N> {
    notifier: N,
    after_cr: bool,
}

impl<N: GattNotifier> GattTransport<N> {
    pub fn new(notifier: N) -> Self {
        Self { notifier, after_cr: false }
    }
}

impl<N: GattNotifier> Transport for GattTransport<N> {
    fn name(&self) -> &str {
        "Bluetooth"
    }

    fn write(&mut self, bytes: &[u8]) -> usize {
        let payload = self.notifier.mtu().saturating_sub(ATT_HEADER).max(1);
        let mut written = 0;
        for chunk in bytes.chunks(payload) {
            if let Err(e) = self.notifier.notify(chunk) {
                debug!("Bluetooth: notify failed: {}", e);
                break;
            }
            written += chunk.len();
        }
        written
    }

    fn decode(&mut self, data: &RecvData, out: &mut Vec<u8>) -> Decoded {
        match data {
            RecvData::Owned(bytes) => normalize_cr(bytes, out, &mut self.after_cr),
            RecvData::Shared(_) => error!("Bluetooth: unexpected shared receive"),
        }
        Decoded::Open
    }

    fn exit(&mut self) -> bool {
        self.notifier.disconnect();
        true
    }

    fn is_secure(&self) -> bool {
        true
    }
}

/// Inbound side, called from the BLE stack's callbacks.
pub struct GattInbound {
    link: RecvLink,
}

impl GattInbound {
    pub fn new(link: RecvLink) -> Self {
        Self { link }
    }

    /// A characteristic write arrived.
    pub fn on_write(&self, payload: &[u8]) {
        if payload.is_empty() {
            return;
        }
        let event = Event::Recv(RecvData::Owned(payload.to_vec()));
        if let Err(e) = self.link.queue.send_timeout(event, self.link.timeout) {
            error!("Bluetooth: {}, dropped {} byte write", e, payload.len());
        }
    }

    /// The central disconnected.
    pub fn on_disconnect(&self) {
        let _ = self.link.queue.send_timeout(Event::Recv(RecvData::closed()), self.link.timeout);
    }
}
