use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, warn};

use crate::transport::Transport;

#[derive(Debug, Clone, Copy)]
pub struct LinkTimeouts {
    pub read: Duration,
    pub write: Duration,
    pub connect: Duration,
}

impl LinkTimeouts {
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            read: timeout,
            write: timeout,
            connect: timeout,
        }
    }
}

/// TCP link that connects on first use.
///
/// A connection lost in the middle of a transaction is reported to the caller
/// and dropped; the next read or write opens a fresh one.
pub struct LazyTcpStream {
    addr: String,
    stream: Option<TcpStream>,
    max_retries: u32,
    timeouts: LinkTimeouts,
}

impl LazyTcpStream {
    pub fn new(addr: impl Into<String>, max_retries: u32, timeouts: LinkTimeouts) -> Self {
        LazyTcpStream {
            addr: addr.into(),
            stream: None,
            max_retries,
            timeouts,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn connect(&mut self) -> io::Result<()> {
        let addr = self.addr.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("no socket address for {}", self.addr),
            )
        })?;

        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            match TcpStream::connect_timeout(&addr, self.timeouts.connect) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.timeouts.read))?;
                    stream.set_write_timeout(Some(self.timeouts.write))?;
                    stream.set_nodelay(true)?;

                    debug!(addr = %self.addr, attempt, "connected");
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => {
                    debug!(addr = %self.addr, attempt, error = %e, "connect failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| io::Error::other("max connection retries reached")))
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        if self.stream.is_none() {
            self.connect()?;
        }
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }

    pub fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn checked<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if let Err(e) = &result {
            if is_connection_lost(e) {
                warn!(addr = %self.addr, error = %e, "connection lost");
                self.disconnect();
            }
        }
        result
    }
}

fn is_connection_lost(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

/// Reads until the socket would block. Returns the number of bytes thrown
/// away and whether the peer closed the connection.
fn drain(stream: &mut TcpStream) -> io::Result<(usize, bool)> {
    let mut buf = [0u8; 256];
    let mut discarded = 0;

    loop {
        match stream.read(&mut buf) {
            Ok(0) => return Ok((discarded, true)),
            Ok(n) => discarded += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok((discarded, false)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

impl Transport for LazyTcpStream {
    fn clear_input(&mut self) -> io::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };

        stream.set_nonblocking(true)?;
        let drained = drain(stream);
        let restored = stream.set_nonblocking(false);

        let (discarded, closed) = self.checked(drained)?;
        restored?;

        if discarded > 0 {
            debug!(addr = %self.addr, discarded, "stale input discarded");
        }
        if closed {
            self.disconnect();
        }
        Ok(())
    }
}

impl Read for LazyTcpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result = self.stream()?.read(buf);
        if let Ok(0) = result {
            if !buf.is_empty() {
                // Peer closed the socket.
                self.disconnect();
            }
        }
        self.checked(result)
    }
}

impl Write for LazyTcpStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.stream()?.write(buf);
        self.checked(result)
    }

    fn flush(&mut self) -> io::Result<()> {
        let result = self.stream()?.flush();
        self.checked(result)
    }
}
