use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::DeviceStream;

/// TCP transport for controllers behind a serial-to-ethernet bridge.
pub struct TcpTransport;

impl TcpTransport {
    /// Default connect timeout.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Connect to `addr` (`host:port`), trying every resolved address in turn.
    pub fn connect(addr: &str, timeout: Duration) -> Result<DeviceStream> {
        let candidates = addr
            .to_socket_addrs()
            .map_err(|source| TransportError::Connect {
                addr: addr.to_string(),
                source,
            })?;

        let mut last_err = None;
        for candidate in candidates {
            debug!(%candidate, "trying address");
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => {
                    // Requests are a handful of bytes; don't let Nagle hold them back.
                    stream.set_nodelay(true)?;
                    info!(%candidate, "connected to device bridge");
                    return Ok(DeviceStream::from_tcp(stream));
                }
                Err(err) => last_err = Some(err),
            }
        }

        match last_err {
            Some(source) => Err(TransportError::Connect {
                addr: addr.to_string(),
                source,
            }),
            None => Err(TransportError::Resolve {
                addr: addr.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn connect_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let handle = std::thread::spawn(move || {
            let (mut device, _) = listener.accept().unwrap();
            let mut buf = [0u8; 2];
            device.read_exact(&mut buf).unwrap();
            buf
        });

        let mut stream = TcpTransport::connect(&addr, Duration::from_secs(1)).unwrap();
        stream.write_all(&[0x01, 0x00]).unwrap();
        assert_eq!(handle.join().unwrap(), [0x01, 0x00]);
    }

    #[test]
    fn connect_refused_reports_address() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = TcpTransport::connect(&addr, Duration::from_millis(200)).unwrap_err();
        match err {
            TransportError::Connect { addr: reported, .. } => assert_eq!(reported, addr),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unparseable_address_is_rejected() {
        let err = TcpTransport::connect("not-an-address", Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }
}
