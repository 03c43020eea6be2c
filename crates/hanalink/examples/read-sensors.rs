//! Read every sensor input of a controller behind a TCP serial bridge.
//!
//! Run with:
//!   cargo run --example read-sensors -- 192.168.1.50:8899

use std::time::Duration;

use hanalink::session::{ConnectionConfig, Device, TrackerConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8899".to_string());

    let config = ConnectionConfig {
        tracker: TrackerConfig {
            max_resends: Some(3),
            ..TrackerConfig::default()
        },
        ..ConnectionConfig::default()
    };
    let device = Device::connect_tcp(&addr, Duration::from_secs(5), config)?;

    let info = device.read_information()?.wait()?;
    eprintln!(
        "{} on {} platform, firmware {}",
        info.device_type,
        info.hardware_platform,
        info.version.as_deref().unwrap_or("unknown")
    );

    // Pipeline all requests; replies are matched by sequence number.
    let pending = (0..16u8)
        .map(|index| Ok((device.read_sensor(index)?, device.read_sensor_name(index)?)))
        .collect::<Result<Vec<_>, hanalink::session::SessionError>>()?;

    for (value, name) in pending {
        let name = name.wait()?;
        match value.wait()? {
            Some(value) => println!("{:>2} {:>8.1}  {}", name.index, value, name.name),
            None => println!("{:>2} {:>8}  {}", name.index, "-", name.name),
        }
    }

    device.close();
    Ok(())
}
