//! Satellite receiver task for channels whose receive call blocks.

use std::sync::Arc;

use log::{debug, error};

use super::{Handoff, RecvLink, TransportError};
use crate::engine::event::{Event, RecvData};
use crate::engine::queue::SendError;
use crate::task::{TaskBase, TaskConfig, TaskContext};

/// Blocking input side of a channel.
///
/// `read` returning `Ok(0)` or an error ends the receiver. `close` runs
/// on another thread and must make a blocked `read` return.
pub trait RawSource: Send + Sync + 'static {
    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError>;

    fn close(&self) {}
}

/// Reads into the hand-off buffer and queues `Recv(Shared(n))`, then waits
/// for the session to hand the buffer back. Never decodes.
pub struct Receiver<S: RawSource> {
    name: String,
    config: TaskConfig,
    source: S,
    handoff: Arc<Handoff>,
    link: RecvLink,
}

impl<S: RawSource> Receiver<S> {
    pub fn new(name: &str, config: TaskConfig, source: S, handoff: Arc<Handoff>, link: RecvLink) -> Self {
        Self {
            name: name.to_string(),
            config,
            source,
            handoff,
            link,
        }
    }

    /// Tell the session the channel is gone.
    ///
    /// With no room for the closed `Recv`, the queue itself is closed so the
    /// session still ends.
    fn deliver_closed(&self) {
        if let Err(SendError::Full(_)) = self.link.queue.send_timeout(Event::Recv(RecvData::closed()), self.link.timeout) {
            error!("{}: console queue full, closing it", self.name);
            self.link.queue.close();
        }
    }
}

impl<S: RawSource> TaskBase for Receiver<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> TaskConfig {
        self.config
    }

    fn service(&self, ctx: &TaskContext) {
        while !ctx.is_cancelled() {
            let read = match self.handoff.fill(|buf| self.source.read(buf)) {
                Some(read) => read,
                None => break,
            };
            let n = match read {
                Ok(n) => n,
                Err(e) => {
                    debug!("{}: {}", self.name, e);
                    0
                }
            };

            if n == 0 {
                self.deliver_closed();
                break;
            }

            let queued = self.link.queue.send_timeout(Event::Recv(RecvData::Shared(n)), self.link.timeout);
            match queued {
                // The session owns the buffer until it gives it back.
                Ok(()) => {
                    if !self.handoff.wait_returned() {
                        break;
                    }
                }
                Err(SendError::Full(_)) => {
                    error!("{}: console queue full, dropped {} byte read", self.name, n);
                }
                Err(SendError::Closed(_)) => break,
            }
        }
    }

    fn cleanup(&self) {
        self.handoff.close();
        self.source.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::queue::{EventQueue, Received, Wait};
    use crate::task;
    use std::time::{Duration, Instant};

    /// Channel that is already gone.
    struct Gone;

    impl RawSource for Gone {
        fn read(&self, _buf: &mut [u8]) -> Result<usize, TransportError> {
            Ok(0)
        }
    }

    fn receiver(queue: &Arc<EventQueue>) -> Arc<Receiver<Gone>> {
        let link = RecvLink {
            queue: Arc::clone(queue),
            timeout: Duration::from_millis(20),
        };
        Arc::new(Receiver::new("rx", TaskConfig::default(), Gone, Arc::new(Handoff::new(8)), link))
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_channel_end_queues_closed_recv() {
        let queue = Arc::new(EventQueue::new(4));
        task::spawn(receiver(&queue)).unwrap();

        match queue.recv(Wait::For(Duration::from_secs(5))) {
            Received::Event(Event::Recv(data)) => assert!(data.is_closed()),
            _ => panic!("expected a closed Recv"),
        }
        assert!(!queue.is_closed());
    }

    #[test]
    fn test_channel_end_on_full_queue_closes_it() {
        let queue = Arc::new(EventQueue::new(1));
        queue.try_send(Event::Alert("pending\n".into())).unwrap();
        task::spawn(receiver(&queue)).unwrap();

        assert!(wait_until(|| queue.is_closed()));
        assert!(matches!(queue.recv(Wait::For(Duration::from_secs(1))), Received::Closed));
    }
}
