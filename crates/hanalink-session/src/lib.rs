//! Request/response sessions with Hanazeder FP controllers.
//!
//! [`RequestTracker`] numbers outgoing requests and matches replies to them;
//! [`Connection`] drives a tracker over a [`hanalink_transport::DeviceStream`]
//! with a reader thread and a resend timer; [`Device`] builds the
//! controller's operations on top.

pub mod connection;
pub mod device;
pub mod error;
pub mod labels;
pub mod tracker;

pub use connection::{Connection, ConnectionConfig};
pub use device::{
    ConfigEntry, Device, DeviceInfo, DeviceType, EnergyReading, HardwarePlatform, SensorName,
    ENERGY_BLOCK_COUNT, ENERGY_BLOCK_START,
};
pub use error::{DecodeError, Result, SessionError};
pub use labels::sensor_label;
pub use tracker::{PendingRequest, RequestState, RequestTracker, TrackerConfig, TrackerStats};
