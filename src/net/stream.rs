//! Byte streams the event loops operate on.
//!
//! The core only needs a non-blocking bidirectional byte stream. Plain TCP
//! and TLS both satisfy it; once a TLS session is established the rest of
//! the system cannot tell them apart.

use std::io::{self, Read, Write};

use mio::event::Source;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};

use crate::net::tls::TlsStream;

/// A non-blocking bidirectional byte stream.
pub trait ByteStream: Read + Write {
    /// Whether bytes accepted by `write` are still waiting to reach the
    /// socket. Such a stream needs writability even with an empty queue.
    fn has_pending_output(&self) -> bool {
        false
    }
}

impl ByteStream for TcpStream {}

/// A connection's stream: plain TCP or TLS over TCP.
#[derive(Debug)]
pub enum Stream {
    Plain(TcpStream),
    Tls(Box<TlsStream>),
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(stream) => stream.read(buf),
            Stream::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(stream) => stream.write(buf),
            Stream::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(stream) => stream.flush(),
            Stream::Tls(stream) => stream.flush(),
        }
    }
}

impl ByteStream for Stream {
    fn has_pending_output(&self) -> bool {
        match self {
            Stream::Plain(_) => false,
            Stream::Tls(stream) => stream.has_pending_output(),
        }
    }
}

impl Source for Stream {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            Stream::Plain(stream) => stream.register(registry, token, interests),
            Stream::Tls(stream) => stream.register(registry, token, interests),
        }
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        match self {
            Stream::Plain(stream) => stream.reregister(registry, token, interests),
            Stream::Tls(stream) => stream.reregister(registry, token, interests),
        }
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self {
            Stream::Plain(stream) => stream.deregister(registry),
            Stream::Tls(stream) => stream.deregister(registry),
        }
    }
}

/// In-memory stream for exercising connection logic without sockets.
#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, Default)]
    pub struct MockStream {
        /// Chunks handed out by successive reads.
        pub input: VecDeque<Vec<u8>>,
        /// Return `Ok(0)` once `input` is exhausted instead of would-block.
        pub eof: bool,
        /// Fail reads with this kind once `input` is exhausted.
        pub read_error: Option<io::ErrorKind>,
        /// Everything successfully written.
        pub written: Vec<u8>,
        /// Bytes accepted before writes would block; `None` is unlimited.
        pub write_budget: Option<usize>,
        /// Fail every write with this kind.
        pub write_error: Option<io::ErrorKind>,
    }

    impl MockStream {
        pub fn with_input(chunks: &[&[u8]]) -> Self {
            Self {
                input: chunks.iter().map(|c| c.to_vec()).collect(),
                ..Self::default()
            }
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if let Some(mut chunk) = self.input.pop_front() {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.input.push_front(chunk.split_off(n));
                }
                return Ok(n);
            }
            if let Some(kind) = self.read_error {
                return Err(io::Error::from(kind));
            }
            if self.eof {
                Ok(0)
            } else {
                Err(io::Error::from(io::ErrorKind::WouldBlock))
            }
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Some(kind) = self.write_error {
                return Err(io::Error::from(kind));
            }
            let n = match self.write_budget {
                Some(0) => return Err(io::Error::from(io::ErrorKind::WouldBlock)),
                Some(budget) => {
                    let n = budget.min(buf.len());
                    self.write_budget = Some(budget - n);
                    n
                }
                None => buf.len(),
            };
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl ByteStream for MockStream {}
}
