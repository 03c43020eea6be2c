use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// Read timeout applied to serial ports when the caller asks for "no timeout".
///
/// `serialport` has no blocking-forever mode, so this stands in for it.
const SERIAL_BLOCKING_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24);

/// A connected device stream implementing `Read + Write`.
///
/// This is the fundamental I/O type returned by transport operations.
/// It wraps either a TCP socket (serial-to-ethernet bridge) or a local
/// serial port.
pub struct DeviceStream {
    inner: DeviceStreamInner,
    peer: String,
}

enum DeviceStreamInner {
    Tcp(TcpStream),
    Serial(Box<dyn serialport::SerialPort>),
}

impl Read for DeviceStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            DeviceStreamInner::Tcp(stream) => stream.read(buf),
            DeviceStreamInner::Serial(port) => port.read(buf),
        }
    }
}

impl Write for DeviceStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            DeviceStreamInner::Tcp(stream) => stream.write(buf),
            DeviceStreamInner::Serial(port) => port.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            DeviceStreamInner::Tcp(stream) => stream.flush(),
            DeviceStreamInner::Serial(port) => port.flush(),
        }
    }
}

impl DeviceStream {
    /// Create a DeviceStream from a connected TCP socket.
    pub fn from_tcp(stream: TcpStream) -> Self {
        let peer = stream
            .peer_addr()
            .map(|addr| format!("tcp:{addr}"))
            .unwrap_or_else(|_| "tcp:unknown".to_string());
        Self {
            inner: DeviceStreamInner::Tcp(stream),
            peer,
        }
    }

    /// Create a DeviceStream from an opened serial port.
    pub fn from_serial(port: Box<dyn serialport::SerialPort>) -> Self {
        let peer = format!("serial:{}", port.name().unwrap_or_else(|| "unknown".into()));
        Self {
            inner: DeviceStreamInner::Serial(port),
            peer,
        }
    }

    /// Human-readable description of the remote end, for diagnostics.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Set read timeout on the underlying stream.
    ///
    /// A timed-out read surfaces as `WouldBlock` (TCP) or `TimedOut`
    /// (serial). Serial ports carry their timeout on the handle itself,
    /// hence the mutable receiver.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        match &mut self.inner {
            DeviceStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            DeviceStreamInner::Serial(port) => port
                .set_timeout(timeout.unwrap_or(SERIAL_BLOCKING_TIMEOUT))
                .map_err(|err| std::io::Error::from(err).into()),
        }
    }

    /// Set write timeout on the underlying stream.
    ///
    /// Serial ports share one timeout for both directions; this is a no-op
    /// for them.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            DeviceStreamInner::Tcp(stream) => {
                stream.set_write_timeout(timeout).map_err(Into::into)
            }
            DeviceStreamInner::Serial(_) => Ok(()),
        }
    }

    /// Try to clone this stream (creates a new handle to the same link).
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            DeviceStreamInner::Tcp(stream) => DeviceStreamInner::Tcp(stream.try_clone()?),
            DeviceStreamInner::Serial(port) => DeviceStreamInner::Serial(
                port.try_clone().map_err(std::io::Error::from)?,
            ),
        };
        Ok(Self {
            inner,
            peer: self.peer.clone(),
        })
    }

    /// Close both directions of the link.
    ///
    /// For TCP this wakes a reader blocked on the socket. Serial ports have
    /// no such notion; their readers notice shutdown on the next timeout.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            DeviceStreamInner::Tcp(stream) => match stream.shutdown(Shutdown::Both) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
                Err(err) => Err(err.into()),
            },
            DeviceStreamInner::Serial(_) => Ok(()),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            DeviceStreamInner::Tcp(_) => "tcp",
            DeviceStreamInner::Serial(_) => "serial",
        }
    }
}

impl std::fmt::Debug for DeviceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceStream")
            .field("type", &self.transport_name())
            .field("peer", &self.peer)
            .finish()
    }
}
