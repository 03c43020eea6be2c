use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, StopBits};
use tracing::info;

use crate::error::{Result, TransportError};
use crate::stream::DeviceStream;

/// Baud rate spoken by the FP controller's RS-232 port.
pub const DEFAULT_BAUD_RATE: u32 = 38_400;

/// Serial line settings. The controller only does 8N1 without flow control,
/// so only the speed and the read timeout are configurable.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Line speed. Default: 38400.
    pub baud_rate: u32,
    /// Read timeout for a single `read` call. Default: 100 ms.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(100),
        }
    }
}

/// RS-232 transport.
pub struct SerialTransport;

impl SerialTransport {
    /// Open `path` (e.g. `/dev/ttyUSB0`) with default settings.
    pub fn open(path: &str) -> Result<DeviceStream> {
        Self::open_with_config(path, &SerialConfig::default())
    }

    /// Open `path` with explicit settings.
    pub fn open_with_config(path: &str, config: &SerialConfig) -> Result<DeviceStream> {
        let port = serialport::new(path, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.timeout)
            .open()
            .map_err(|source| TransportError::Open {
                path: path.to_string(),
                source,
            })?;

        info!(path, baud = config.baud_rate, "opened serial port");
        Ok(DeviceStream::from_serial(port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_controller() {
        let cfg = SerialConfig::default();
        assert_eq!(cfg.baud_rate, 38_400);
        assert_eq!(cfg.timeout, Duration::from_millis(100));
    }

    #[test]
    fn missing_port_reports_path() {
        let err = SerialTransport::open("/dev/hanalink-does-not-exist").unwrap_err();
        match err {
            TransportError::Open { path, .. } => assert_eq!(path, "/dev/hanalink-does-not-exist"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
