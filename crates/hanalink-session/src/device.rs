//! Controller operations: request bodies, reply decoders and the [`Device`]
//! handle tying them to a [`Connection`].

use std::fmt;
use std::time::Duration;

use hanalink_frame::{
    decode_scaled_number, Frame, ReaderStats, READ_CONFIG_BLOCK, READ_DEBUG_BLOCK,
    READ_INFORMATION, READ_SENSOR, READ_SENSOR_NAME,
};
use hanalink_transport::{SerialConfig, SerialTransport, TcpTransport};
use serde::Serialize;

use crate::connection::{Connection, ConnectionConfig};
use crate::error::{DecodeError, Result};
use crate::labels::sensor_label;
use crate::tracker::PendingRequest;

/// Debug block holding the energy counters.
pub const ENERGY_BLOCK_START: u16 = 313;
/// Length of the energy debug block.
pub const ENERGY_BLOCK_COUNT: u8 = 8;

/// Size of one configuration entry in a config block reply.
const CONFIG_ENTRY_LEN: usize = 4;

/// Controller model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeviceType {
    FP10,
    FP6,
    FP3,
    FP2,
    FP1,
    SH3,
    SH2,
    SH1,
}

impl TryFrom<u8> for DeviceType {
    type Error = DecodeError;

    fn try_from(code: u8) -> std::result::Result<Self, DecodeError> {
        Ok(match code {
            0 => Self::FP10,
            1 => Self::FP6,
            2 => Self::FP3,
            3 => Self::FP2,
            4 => Self::FP1,
            5 => Self::SH3,
            6 => Self::SH2,
            7 => Self::SH1,
            other => return Err(DecodeError::Invalid(format!("unknown device type {other}"))),
        })
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Hardware generation the firmware runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HardwarePlatform {
    FP10,
    FP3,
}

impl TryFrom<u8> for HardwarePlatform {
    type Error = DecodeError;

    fn try_from(code: u8) -> std::result::Result<Self, DecodeError> {
        match code {
            0 => Ok(Self::FP10),
            1 => Ok(Self::FP3),
            other => Err(DecodeError::Invalid(format!(
                "unknown hardware platform {other}"
            ))),
        }
    }
}

impl fmt::Display for HardwarePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Reply to `read_information`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub device_type: DeviceType,
    pub hardware_platform: HardwarePlatform,
    pub connection_flags: u8,
    /// Firmware version as `major.minor`; older firmware omits it.
    pub version: Option<String>,
}

/// One configuration parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfigEntry {
    pub key: u16,
    pub value: u8,
    pub max_value: u8,
    pub min_value: u8,
    pub change_step: u8,
}

/// Reply to `read_sensor_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorName {
    pub index: u8,
    pub label_code: u8,
    /// Display label for `label_code`, if the code is known.
    pub label: Option<&'static str>,
    /// Free-text name, possibly empty.
    pub name: String,
}

/// Energy counters from the solar yield debug block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnergyReading {
    pub total: Option<f64>,
    pub current: Option<f64>,
    pub impulse: Option<f64>,
}

/// Request body for `read_information`.
pub fn information_body() -> [u8; 2] {
    [READ_INFORMATION, 0x00]
}

/// Request body for `read_sensor`.
pub fn sensor_body(index: u8) -> [u8; 3] {
    [READ_SENSOR, 0x01, index]
}

/// Request body for `read_sensor_name`.
pub fn sensor_name_body(index: u8) -> [u8; 3] {
    [READ_SENSOR_NAME, 0x01, index]
}

/// Request body for `read_config_block`.
pub fn config_block_body(start: u16, count: u8) -> [u8; 5] {
    let [lo, hi] = start.to_le_bytes();
    [READ_CONFIG_BLOCK, 0x03, lo, hi, count]
}

/// Request body for `read_debug_block`.
pub fn debug_block_body(start: u16, count: u8) -> [u8; 5] {
    let [lo, hi] = start.to_le_bytes();
    [READ_DEBUG_BLOCK, 0x03, lo, hi, count]
}

fn require(payload: &[u8], expected: usize) -> std::result::Result<(), DecodeError> {
    if payload.len() < expected {
        return Err(DecodeError::Truncated {
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

/// Decode a `read_information` reply.
pub fn parse_information(frame: &Frame) -> std::result::Result<DeviceInfo, DecodeError> {
    let payload = frame.payload.as_ref();
    require(payload, 3)?;
    let version = match payload {
        [_, _, _, major, minor, ..] => Some(format!("{major}.{minor}")),
        _ => None,
    };
    Ok(DeviceInfo {
        device_type: DeviceType::try_from(payload[0])?,
        hardware_platform: HardwarePlatform::try_from(payload[1])?,
        connection_flags: payload[2],
        version,
    })
}

/// Decode a `read_sensor` reply. `None` means nothing is connected.
pub fn parse_sensor(frame: &Frame) -> std::result::Result<Option<f64>, DecodeError> {
    let payload = frame.payload.as_ref();
    require(payload, 2)?;
    Ok(decode_scaled_number(&payload[..2], true)?)
}

/// Decode a `read_sensor_name` reply for sensor `index`.
///
/// Non-ASCII bytes in the name are dropped.
pub fn parse_sensor_name(
    index: u8,
    frame: &Frame,
) -> std::result::Result<SensorName, DecodeError> {
    let payload = frame.payload.as_ref();
    require(payload, 1)?;
    let label_code = payload[0];
    let name: String = payload[1..]
        .iter()
        .filter(|byte| byte.is_ascii())
        .map(|&byte| char::from(byte))
        .collect();
    Ok(SensorName {
        index,
        label_code,
        label: sensor_label(label_code),
        name: name.trim().to_string(),
    })
}

/// Decode a `read_config_block` reply whose first entry is `start`.
///
/// A trailing partial entry is ignored.
pub fn parse_config_block(
    start: u16,
    frame: &Frame,
) -> std::result::Result<Vec<ConfigEntry>, DecodeError> {
    frame
        .payload
        .chunks_exact(CONFIG_ENTRY_LEN)
        .enumerate()
        .map(|(offset, chunk)| {
            let key = u16::try_from(offset)
                .ok()
                .and_then(|offset| start.checked_add(offset))
                .ok_or_else(|| {
                    DecodeError::Invalid(format!("config key overflows past {start}"))
                })?;
            Ok(ConfigEntry {
                key,
                value: chunk[0],
                max_value: chunk[1],
                min_value: chunk[2],
                change_step: chunk[3],
            })
        })
        .collect()
}

/// Decode the energy debug block.
pub fn parse_energy(frame: &Frame) -> std::result::Result<EnergyReading, DecodeError> {
    let payload = frame.payload.as_ref();
    require(payload, 6)?;
    Ok(EnergyReading {
        total: decode_scaled_number(&payload[0..2], true)?,
        current: decode_scaled_number(&payload[2..4], true)?,
        impulse: decode_scaled_number(&payload[4..6], true)?,
    })
}

/// A controller reached over one [`Connection`].
///
/// Every operation sends immediately and returns a [`PendingRequest`];
/// several may be outstanding at once.
#[derive(Debug)]
pub struct Device {
    connection: Connection,
}

impl Device {
    /// Wrap an open connection.
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Connect to a controller behind a TCP serial bridge.
    pub fn connect_tcp(
        addr: &str,
        connect_timeout: Duration,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let stream = TcpTransport::connect(addr, connect_timeout)?;
        Ok(Self::new(Connection::open(stream, config)?))
    }

    /// Open a controller on a local serial port (38400 8N1).
    pub fn open_serial(path: &str, config: ConnectionConfig) -> Result<Self> {
        let serial = SerialConfig {
            timeout: config.poll_interval,
            ..SerialConfig::default()
        };
        let stream = SerialTransport::open_with_config(path, &serial)?;
        Ok(Self::new(Connection::open(stream, config)?))
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Close the connection; outstanding requests fail with `ShutDown`.
    pub fn close(self) -> ReaderStats {
        self.connection.close()
    }

    /// Model, hardware platform, connection flags and firmware version.
    pub fn read_information(&self) -> Result<PendingRequest<DeviceInfo>> {
        self.connection.request(&information_body(), parse_information)
    }

    /// Current reading of sensor input `index`.
    pub fn read_sensor(&self, index: u8) -> Result<PendingRequest<Option<f64>>> {
        self.connection.request(&sensor_body(index), parse_sensor)
    }

    /// Label code and free-text name of sensor input `index`.
    pub fn read_sensor_name(&self, index: u8) -> Result<PendingRequest<SensorName>> {
        self.connection
            .request(&sensor_name_body(index), move |frame: &Frame| {
                parse_sensor_name(index, frame)
            })
    }

    /// `count` configuration entries starting at `start`.
    pub fn read_config_block(
        &self,
        start: u16,
        count: u8,
    ) -> Result<PendingRequest<Vec<ConfigEntry>>> {
        self.connection
            .request(&config_block_body(start, count), move |frame: &Frame| {
                parse_config_block(start, frame)
            })
    }

    /// Raw debug memory; `decoder` interprets the reply.
    pub fn read_debug_block<T, D>(
        &self,
        start: u16,
        count: u8,
        decoder: D,
    ) -> Result<PendingRequest<T>>
    where
        T: Send + 'static,
        D: FnOnce(&Frame) -> std::result::Result<T, DecodeError> + Send + 'static,
    {
        self.connection.request(&debug_block_body(start, count), decoder)
    }

    /// Solar energy counters.
    pub fn read_energy(&self) -> Result<PendingRequest<EnergyReading>> {
        self.read_debug_block(ENERGY_BLOCK_START, ENERGY_BLOCK_COUNT, parse_energy)
    }
}
