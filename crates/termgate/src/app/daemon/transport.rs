//! Server side of the daemon socket: one JSON-RPC request or response per line.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::adapters::rpc::{RpcRequest, RpcResponse};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("Request size limit exceeded (max {max_bytes} bytes)")]
    SizeLimit { max_bytes: usize },
    #[error("Connection timeout")]
    Timeout,
    #[error("Connection closed")]
    ConnectionClosed,
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Self::Timeout,
            std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::BrokenPipe => {
                Self::ConnectionClosed
            }
            _ => Self::Io(err),
        }
    }
}

struct SizeLimitedReader<R> {
    inner: R,
    max_size: usize,
    read_count: usize,
}

impl<R> SizeLimitedReader<R> {
    fn new(inner: R, max_size: usize) -> Self {
        Self {
            inner,
            max_size,
            read_count: 0,
        }
    }
}

impl<R: BufRead> SizeLimitedReader<R> {
    /// Counts bytes over the whole connection, not per line.
    fn read_line(&mut self) -> Result<Option<String>, TransportError> {
        let mut line = String::new();
        match self.inner.read_line(&mut line) {
            Ok(0) => Ok(None),
            Ok(n) => {
                self.read_count += n;
                if self.read_count > self.max_size {
                    return Err(TransportError::SizeLimit {
                        max_bytes: self.max_size,
                    });
                }
                if line.ends_with('\n') {
                    line.pop();
                    if line.ends_with('\r') {
                        line.pop();
                    }
                }
                Ok(Some(line))
            }
            Err(e) => Err(TransportError::from(e)),
        }
    }
}

pub struct UnixSocketConnection {
    reader: SizeLimitedReader<BufReader<UnixStream>>,
    writer: UnixStream,
}

impl UnixSocketConnection {
    pub fn new(stream: UnixStream, max_request_bytes: usize) -> Result<Self, TransportError> {
        // Timeouts only apply to blocking sockets.
        let _ = stream.set_nonblocking(false);
        let reader_stream = stream.try_clone()?;
        Ok(Self {
            reader: SizeLimitedReader::new(BufReader::new(reader_stream), max_request_bytes),
            writer: stream,
        })
    }

    pub fn read_request(&mut self) -> Result<RpcRequest, TransportError> {
        loop {
            match self.reader.read_line()? {
                None => return Err(TransportError::ConnectionClosed),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return serde_json::from_str(&line).map_err(TransportError::Parse),
            }
        }
    }

    pub fn write_response(&mut self, response: &RpcResponse) -> Result<(), TransportError> {
        self.writer.write_all(response.to_line().as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), TransportError> {
        self.writer.set_read_timeout(timeout)?;
        Ok(())
    }

    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<(), TransportError> {
        self.writer.set_write_timeout(timeout)?;
        Ok(())
    }
}

pub struct UnixSocketListener {
    inner: UnixListener,
    max_request_bytes: usize,
}

impl UnixSocketListener {
    pub fn bind(path: &Path, max_request_bytes: usize) -> Result<Self, TransportError> {
        let listener = UnixListener::bind(path)?;
        Ok(Self {
            inner: listener,
            max_request_bytes,
        })
    }

    pub fn accept(&self) -> Result<UnixSocketConnection, TransportError> {
        let (stream, _addr) = self.inner.accept()?;
        UnixSocketConnection::new(stream, self.max_request_bytes)
    }
}
