//! Byte-stream abstraction under and over TLS.
//!
//! [`Transport`] is the interface the record layer reads and writes
//! through. [`TcpTransport`] adapts a `std::net::TcpStream`; [`TlsStream`]
//! wraps an established TLS connection and implements `Transport` itself,
//! so TLS can be layered wherever a plain transport is expected.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::connection::Connection;
use crate::error::{Error, Result};

/// A bidirectional byte stream with timeout-aware reads.
pub trait Transport: Send {
    /// Write all of every buffer, in order. Returns the total byte count.
    fn write_all(&mut self, bufs: &[&[u8]]) -> Result<usize>;

    /// Read up to `buf.len()` bytes, waiting at most `timeout`. Returns
    /// `Ok(0)` on a clean end of stream.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// [`Transport`] over a TCP socket.
pub struct TcpTransport {
    stream: TcpStream,
    closed: bool,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        TcpTransport {
            stream,
            closed: false,
        }
    }
}

impl Transport for TcpTransport {
    fn write_all(&mut self, bufs: &[&[u8]]) -> Result<usize> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        let mut total = 0;
        for buf in bufs {
            self.stream.write_all(buf)?;
            total += buf.len();
        }
        Ok(total)
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        self.stream.set_read_timeout(Some(timeout))?;
        Ok(self.stream.read(buf)?)
    }

    fn close(&mut self) {
        if !self.closed {
            let _ = self.stream.shutdown(Shutdown::Both);
            self.closed = true;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// An established TLS connection, presented as a byte stream.
///
/// Returned by `TlsClient::connect` and `TlsServer::accept` once the
/// handshake has reached application data.
pub struct TlsStream {
    conn: Connection,
}

impl TlsStream {
    pub(crate) fn new(conn: Connection) -> Self {
        TlsStream { conn }
    }

    /// Negotiated cipher suite name.
    pub fn cipher_suite(&self) -> Option<&'static str> {
        self.conn.suite().map(|s| s.name)
    }

    /// Send application data; split into records as needed.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.conn.write_app(data)?;
        Ok(data.len())
    }

    /// Receive application data with the connection's default timeout.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let timeout = self.conn.timeout;
        self.conn.read_app(buf, timeout)
    }

    pub fn close(&mut self) {
        self.conn.close();
    }
}

impl Transport for TlsStream {
    fn write_all(&mut self, bufs: &[&[u8]]) -> Result<usize> {
        let mut total = 0;
        for buf in bufs {
            total += self.write(buf)?;
        }
        Ok(total)
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.conn.read_app(buf, timeout)
    }

    fn close(&mut self) {
        TlsStream::close(self);
    }

    fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }
}
