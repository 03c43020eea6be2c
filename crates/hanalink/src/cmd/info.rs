use hanalink_session::{DeviceInfo, DeviceType, HardwarePlatform};
use serde::Serialize;

use crate::cmd::{open_device, Target};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_json, table, OutputFormat};

#[derive(Serialize)]
struct InfoOutput<'a> {
    peer: &'a str,
    device_type: DeviceType,
    hardware_platform: HardwarePlatform,
    connection_flags: u8,
    version: Option<&'a str>,
}

impl<'a> InfoOutput<'a> {
    fn new(peer: &'a str, info: &'a DeviceInfo) -> Self {
        Self {
            peer,
            device_type: info.device_type,
            hardware_platform: info.hardware_platform,
            connection_flags: info.connection_flags,
            version: info.version.as_deref(),
        }
    }
}

pub fn run(target: &Target, format: OutputFormat) -> CliResult<i32> {
    let device = open_device(target)?;
    let info = device
        .read_information()
        .and_then(|pending| pending.wait())
        .map_err(|err| session_error("read information", err))?;

    print_info(&InfoOutput::new(device.connection().peer(), &info), format);
    device.close();
    Ok(SUCCESS)
}

fn print_info(out: &InfoOutput<'_>, format: OutputFormat) {
    let version = out.version.unwrap_or("unknown");
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut t = table(&["FIELD", "VALUE"]);
            t.add_row(vec!["Peer".to_string(), out.peer.to_string()]);
            t.add_row(vec!["Device".to_string(), out.device_type.to_string()]);
            t.add_row(vec![
                "Platform".to_string(),
                out.hardware_platform.to_string(),
            ]);
            t.add_row(vec![
                "Flags".to_string(),
                format!("0x{:02X}", out.connection_flags),
            ]);
            t.add_row(vec!["Firmware".to_string(), version.to_string()]);
            println!("{t}");
        }
        OutputFormat::Pretty => {
            println!("Controller Info:");
            println!("  Peer:      {}", out.peer);
            println!("  Device:    {}", out.device_type);
            println!("  Platform:  {}", out.hardware_platform);
            println!("  Flags:     0x{:02X}", out.connection_flags);
            println!("  Firmware:  {version}");
        }
    }
}
