//! # Store Connection
//!
//! Purpose: Own one socket to the store together with its read and write
//! buffers, for either a TCP or a local domain-socket endpoint.
//!
//! ## Design Principles
//! 1. **One Socket, Two Buffers**: A buffered reader for line parsing and a
//!    reusable write buffer for inline commands.
//! 2. **Explicit Lifetime**: Open with `connect`, end with `close`; closing
//!    twice is a no-op.
//! 3. **Out-of-Band Shutdown**: A `StreamCloser` can shut the socket down from
//!    another thread so a blocked read observes end-of-stream.

use std::fmt;
use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::Duration;

use bytes::BytesMut;
use kev_common::Endpoint;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::resp::{encode_inline, read_multi_bulk, read_reply, RespReply};

/// Socket options applied when a connection is opened.
///
/// `None` means block forever, so a stalled store stalls the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Optional connect timeout (TCP only).
    pub connect_timeout: Option<Duration>,
    /// Optional socket read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional socket write timeout.
    pub write_timeout: Option<Duration>,
}

/// Stream-oriented socket of either family.
#[derive(Debug)]
pub(crate) enum Transport {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Transport {
    fn connect(endpoint: &Endpoint, config: &ConnectionConfig) -> io::Result<Self> {
        match endpoint {
            Endpoint::Tcp(addr) => {
                let stream = match config.connect_timeout {
                    Some(timeout) => connect_tcp_timeout(addr, timeout)?,
                    None => TcpStream::connect(addr.as_str())?,
                };
                // Small inline commands; do not wait on Nagle.
                stream.set_nodelay(true)?;
                Ok(Transport::Tcp(stream))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => Ok(Transport::Unix(UnixStream::connect(path)?)),
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "domain socket endpoints require a unix target",
            )),
        }
    }

    fn set_timeouts(&self, config: &ConnectionConfig) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => {
                stream.set_read_timeout(config.read_timeout)?;
                stream.set_write_timeout(config.write_timeout)
            }
            #[cfg(unix)]
            Transport::Unix(stream) => {
                stream.set_read_timeout(config.read_timeout)?;
                stream.set_write_timeout(config.write_timeout)
            }
        }
    }

    fn try_clone(&self) -> io::Result<Self> {
        match self {
            Transport::Tcp(stream) => stream.try_clone().map(Transport::Tcp),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.try_clone().map(Transport::Unix),
        }
    }

    fn shutdown(&self) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.shutdown(Shutdown::Both),
        }
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.flush(),
        }
    }
}

fn connect_tcp_timeout(addr: &str, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for sock_addr in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&sock_addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
    }))
}

/// Handle that shuts a connection's socket down from another thread.
///
/// Shutting down wakes a reader blocked on the same socket; its read then
/// reports end-of-stream.
pub struct StreamCloser {
    transport: Transport,
}

impl StreamCloser {
    pub fn shutdown(&self) {
        // The peer may already be gone; nothing left to release then.
        if let Err(err) = self.transport.shutdown() {
            debug!(error = %err, "socket shutdown");
        }
    }
}

impl fmt::Debug for StreamCloser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamCloser").finish_non_exhaustive()
    }
}

/// One socket to the store plus the line and write buffers reused by every
/// exchange on it.
///
/// Dropping or closing shuts the socket down, which also wakes any thread
/// blocked on it through a `StreamCloser` clone.
pub struct Connection {
    endpoint: Endpoint,
    // Buffered reader reduces syscalls while still allowing direct writes.
    reader: Option<BufReader<Transport>>,
    line_buf: Vec<u8>,
    write_buf: BytesMut,
}

impl Connection {
    /// Opens a socket to `endpoint` and applies the configured timeouts.
    pub fn connect(endpoint: &Endpoint, config: &ConnectionConfig) -> ClientResult<Self> {
        let transport = Transport::connect(endpoint, config)?;
        transport.set_timeouts(config)?;
        debug!(endpoint = %endpoint, "connected");

        Ok(Connection {
            endpoint: endpoint.clone(),
            reader: Some(BufReader::new(transport)),
            line_buf: Vec::with_capacity(128),
            write_buf: BytesMut::with_capacity(256),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    /// Writes one inline command and flushes it.
    pub fn send_inline(&mut self, verb: &str, args: &[&str]) -> ClientResult<()> {
        let reader = self.reader.as_mut().ok_or(ClientError::Closed)?;
        self.write_buf.clear();
        encode_inline(verb, args, &mut self.write_buf)?;

        let stream = reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;
        Ok(())
    }

    /// Decodes the next reply object.
    pub fn read_reply(&mut self) -> ClientResult<RespReply> {
        let reader = self.reader.as_mut().ok_or(ClientError::Closed)?;
        read_reply(reader, &mut self.line_buf)
    }

    /// Decodes the next multi-bulk message.
    pub fn read_multi_bulk(&mut self) -> ClientResult<Vec<String>> {
        let reader = self.reader.as_mut().ok_or(ClientError::Closed)?;
        read_multi_bulk(reader, &mut self.line_buf)
    }

    /// Returns a handle able to shut this socket down from another thread.
    pub fn closer(&self) -> ClientResult<StreamCloser> {
        let reader = self.reader.as_ref().ok_or(ClientError::Closed)?;
        Ok(StreamCloser {
            transport: reader.get_ref().try_clone()?,
        })
    }

    /// Releases the socket. Closing an already closed connection is a no-op.
    pub fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            if let Err(err) = reader.get_ref().shutdown() {
                debug!(endpoint = %self.endpoint, error = %err, "socket shutdown");
            }
            debug!(endpoint = %self.endpoint, "connection closed");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn close_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = Endpoint::Tcp(listener.local_addr().unwrap().to_string());
        let server = thread::spawn(move || {
            let _ = listener.accept().unwrap();
        });

        let mut conn = Connection::connect(&endpoint, &ConnectionConfig::default()).unwrap();
        assert!(!conn.is_closed());
        conn.close();
        conn.close();
        assert!(conn.is_closed());
        assert!(matches!(conn.send_inline("GET", &["k"]), Err(ClientError::Closed)));
        assert!(matches!(conn.read_reply(), Err(ClientError::Closed)));
        server.join().unwrap();
    }

    #[test]
    fn sends_inline_and_reads_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = Endpoint::Tcp(listener.local_addr().unwrap().to_string());
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = std::io::BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            assert_eq!(line, "GET greeting\r\n");
            (&stream).write_all(b"$5\r\nhello\r\n").unwrap();
        });

        let mut conn = Connection::connect(&endpoint, &ConnectionConfig::default()).unwrap();
        conn.send_inline("GET", &["greeting"]).unwrap();
        assert_eq!(conn.read_reply().unwrap().into_text(), "hello");
        server.join().unwrap();
    }

    #[test]
    fn closer_unblocks_pending_read() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = Endpoint::Tcp(listener.local_addr().unwrap().to_string());
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            // Hold the socket open without writing anything.
            thread::sleep(Duration::from_millis(500));
            drop(stream);
        });

        let mut conn = Connection::connect(&endpoint, &ConnectionConfig::default()).unwrap();
        let closer = conn.closer().unwrap();
        let shutter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            closer.shutdown();
        });

        let err = conn.read_multi_bulk().unwrap_err();
        assert!(!err.is_recoverable());
        shutter.join().unwrap();
        server.join().unwrap();
    }

    #[test]
    fn connect_failure_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = Endpoint::Tcp(listener.local_addr().unwrap().to_string());
        drop(listener);
        let err = Connection::connect(&endpoint, &ConnectionConfig::default()).unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }
}
