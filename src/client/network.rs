//! The client's network thread.

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use mio::{Events, Interest, Poll, Waker};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use super::{ChatClient, CONNECTION};
use crate::error::{ClientError, CloseReason};
use crate::lifecycle::Shutdown;
use crate::net::codec::encode_frame;
use crate::net::connection::Connection;
use crate::net::stream::Stream;
use crate::observability::ChatObserver;

/// Single-connection event loop: outbound channel in, inbound channel out.
pub struct NetworkLoop {
    poll: Poll,
    waker: Arc<Waker>,
    connection: Connection<Stream>,
    outbound: UnboundedReceiver<Vec<u8>>,
    inbound: UnboundedSender<Vec<u8>>,
    observer: Arc<dyn ChatObserver>,
    recv_buf: Vec<u8>,
    poll_timeout: Duration,
    shutdown: Option<Shutdown>,
}

impl NetworkLoop {
    pub(super) fn new(
        client: ChatClient,
        outbound: UnboundedReceiver<Vec<u8>>,
        inbound: UnboundedSender<Vec<u8>>,
    ) -> Self {
        Self {
            poll: client.poll,
            waker: client.waker,
            connection: client.connection,
            outbound,
            inbound,
            observer: client.observer,
            recv_buf: vec![0; client.recv_buffer_size],
            poll_timeout: client.poll_timeout,
            shutdown: None,
        }
    }

    /// Stop the loop when `shutdown` is triggered.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        shutdown.subscribe(Arc::clone(&self.waker));
        self.shutdown = Some(shutdown);
        self
    }

    /// Run until the server closes the stream, the application drops both
    /// channel ends, or shutdown is triggered.
    ///
    /// Connection failures end the loop with `Ok(())` after being reported to
    /// the observer; only a poller failure is an error.
    pub fn run(mut self) -> Result<(), ClientError> {
        let mut events = Events::with_capacity(16);

        loop {
            if self.shutdown_triggered() {
                // Best effort: whatever fits in the socket buffer goes out.
                let _ = self.connection.flush_outbound();
                return self.finish(CloseReason::Local);
            }

            let senders_gone = self.drain_outbound();
            if self.connection.wants_write() {
                if let Err(err) = self.connection.flush_outbound() {
                    return self.finish(CloseReason::Write(err));
                }
            }
            if senders_gone && self.inbound.is_closed() && !self.connection.wants_write() {
                return self.finish(CloseReason::Local);
            }
            if let Err(err) = self.sync_interest() {
                return self.finish(CloseReason::Register(err));
            }

            match self.poll.poll(&mut events, Some(self.poll_timeout)) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(ClientError::Poll(err)),
            }

            let readable = events.iter().any(|event| {
                event.token() == CONNECTION
                    && (event.is_readable() || event.is_read_closed() || event.is_error())
            });
            if readable {
                let batch = self.connection.read_frames(&mut self.recv_buf);
                for payload in batch.frames {
                    // The application may have stopped listening; keep writing.
                    let _ = self.inbound.send(payload);
                }
                if let Some(err) = batch.error {
                    return self.finish(CloseReason::Read(err));
                }
            }
        }
    }

    fn shutdown_triggered(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|shutdown| shutdown.is_triggered())
    }

    /// Move queued messages into the connection. Returns true once every
    /// sender has been dropped.
    fn drain_outbound(&mut self) -> bool {
        loop {
            match self.outbound.try_recv() {
                Ok(payload) => match encode_frame(&payload) {
                    Ok(frame) => self.connection.enqueue(frame),
                    Err(err) => tracing::warn!(error = %err, "Dropping outbound message"),
                },
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => return true,
            }
        }
    }

    fn sync_interest(&mut self) -> std::io::Result<()> {
        let wants_write = self.connection.wants_write();
        if wants_write == self.connection.write_registered() {
            return Ok(());
        }
        let interest = if wants_write {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        self.poll
            .registry()
            .reregister(self.connection.stream_mut(), CONNECTION, interest)?;
        self.connection.set_write_registered(wants_write);
        Ok(())
    }

    fn finish(self, reason: CloseReason) -> Result<(), ClientError> {
        let id = self.connection.id();
        let peer_addr = self.connection.peer_addr();
        self.observer.connection_closed(id, peer_addr, &reason);
        let mut stream = self.connection.finish_close();
        let _ = self.poll.registry().deregister(&mut stream);
        Ok(())
    }
}

impl std::fmt::Debug for NetworkLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkLoop")
            .field("peer_addr", &self.connection.peer_addr())
            .field("queued", &self.connection.queued())
            .finish()
    }
}
