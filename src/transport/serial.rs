//! Serial console: the UART on target, stdin/stdout on the host.

use std::io::Write;
use std::sync::Arc;

use log::debug;

use super::{expand_lf, normalize_cr, Decoded, Handoff, RawSource, Receiver, RecvLink, Transport};
use crate::engine::event::RecvData;
use crate::task::{TaskBase, TaskConfig};

/// Byte stream console over any writer and blocking source.
pub struct SerialTransport<W, S> {
    name: String,
    writer: W,
    source: Option<S>,
    handoff: Arc<Handoff>,
    receiver_task: TaskConfig,
    after_cr: bool,
    scratch: Vec<u8>,
}

impl<W, S> SerialTransport<W, S>
where
    W: Write + Send + 'static,
    S: RawSource,
{
    pub fn new(name: &str, writer: W, source: S, receiver_task: TaskConfig) -> Self {
        Self {
            name: name.to_string(),
            writer,
            source: Some(source),
            handoff: Arc::new(Handoff::default()),
            receiver_task,
            after_cr: false,
            scratch: Vec::new(),
        }
    }
}

impl<W, S> Transport for SerialTransport<W, S>
where
    W: Write + Send + 'static,
    S: RawSource,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, bytes: &[u8]) -> usize {
        self.scratch.clear();
        expand_lf(bytes, &mut self.scratch);
        match self.writer.write_all(&self.scratch).and_then(|()| self.writer.flush()) {
            Ok(()) => bytes.len(),
            Err(e) => {
                debug!("{}: write failed: {}", self.name, e);
                0
            }
        }
    }

    fn decode(&mut self, data: &RecvData, out: &mut Vec<u8>) -> Decoded {
        match data {
            RecvData::Owned(bytes) => normalize_cr(bytes, out, &mut self.after_cr),
            RecvData::Shared(len) => {
                let after_cr = &mut self.after_cr;
                self.handoff.read(*len, |bytes| normalize_cr(bytes, out, after_cr));
                self.handoff.give_back();
            }
        }
        Decoded::Open
    }

    fn exit(&mut self) -> bool {
        self.write(b"This console cannot exit.\n");
        false
    }

    fn receiver(&mut self, link: RecvLink) -> Option<Arc<dyn TaskBase>> {
        let source = self.source.take()?;
        let name = format!("{}Rx", self.name);
        Some(Arc::new(Receiver::new(&name, self.receiver_task, source, Arc::clone(&self.handoff), link)))
    }

    fn is_secure(&self) -> bool {
        true
    }
}

/// Host standard input.
pub struct StdinSource;

impl RawSource for StdinSource {
    fn read(&self, buf: &mut [u8]) -> Result<usize, super::TransportError> {
        Ok(std::io::Read::read(&mut std::io::stdin(), buf)?)
    }
}

/// Serial console on the host terminal.
pub fn stdio(receiver_task: TaskConfig) -> SerialTransport<std::io::Stdout, StdinSource> {
    SerialTransport::new("Serial", std::io::stdout(), StdinSource, receiver_task)
}

#[cfg(target_os = "espidf")]
pub use uart::{uart_console, UartSink, UartSource};

#[cfg(target_os = "espidf")]
mod uart {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use esp_idf_svc::hal::delay::TickType;
    use esp_idf_svc::hal::uart::UartDriver;

    use super::SerialTransport;
    use crate::task::TaskConfig;
    use crate::transport::{RawSource, TransportError};

    /// Read poll interval, so `close` is noticed.
    const POLL_MS: u64 = 100;

    pub struct UartSource {
        uart: Arc<UartDriver<'static>>,
        closed: AtomicBool,
    }

    impl RawSource for UartSource {
        fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
            let ticks = TickType::new_millis(POLL_MS).ticks();
            while !self.closed.load(Ordering::Acquire) {
                match self.uart.read(buf, ticks) {
                    Ok(0) => continue,
                    Ok(n) => return Ok(n),
                    Err(e) => return Err(TransportError::Stack(e.to_string())),
                }
            }
            Ok(0)
        }

        fn close(&self) {
            self.closed.store(true, Ordering::Release);
        }
    }

    pub struct UartSink {
        uart: Arc<UartDriver<'static>>,
    }

    impl std::io::Write for UartSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.uart.write(buf).map_err(std::io::Error::other)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Serial console on an installed UART driver.
    pub fn uart_console(uart: UartDriver<'static>, receiver_task: TaskConfig) -> SerialTransport<UartSink, UartSource> {
        let uart = Arc::new(uart);
        let source = UartSource { uart: Arc::clone(&uart), closed: AtomicBool::new(false) };
        SerialTransport::new("Serial", UartSink { uart }, source, receiver_task)
    }
}
