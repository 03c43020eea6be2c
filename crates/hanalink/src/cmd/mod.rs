use std::time::Duration;

use clap::{Args, Subcommand};
use hanalink_session::{ConnectionConfig, Device, PendingRequest, TrackerConfig};
use hanalink_transport::TcpTransport;
use tracing::debug;

use crate::exit::{session_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod config;
pub mod energy;
pub mod info;
pub mod sensors;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show controller model and firmware version.
    Info,
    /// Read sensor inputs.
    Sensors(SensorsArgs),
    /// Read configuration parameters.
    Config(ConfigArgs),
    /// Read the solar energy counters.
    Energy,
    /// Show version information.
    Version(VersionArgs),
}

/// Where the controller is and how patiently to talk to it.
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Serial bridge address (host:port).
    #[arg(
        long,
        env = "HANALINK_ADDRESS",
        global = true,
        conflicts_with = "serial_port"
    )]
    pub address: Option<String>,

    /// Local serial port (e.g. /dev/ttyUSB0).
    #[arg(long, env = "HANALINK_SERIAL_PORT", global = true)]
    pub serial_port: Option<String>,

    /// Time to wait for a reply before resending (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s", global = true)]
    pub timeout: String,

    /// Resends before a request is reported as timed out.
    #[arg(long, default_value_t = 3, global = true)]
    pub resends: u32,
}

pub fn run(command: Command, target: &Target, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Info => info::run(target, format),
        Command::Sensors(args) => sensors::run(args, target, format),
        Command::Config(args) => config::run(args, target, format),
        Command::Energy => energy::run(target, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SensorsArgs {
    /// First sensor index.
    #[arg(long, default_value_t = 0)]
    pub start: u8,
    /// Number of sensors to read.
    #[arg(long, default_value_t = 16)]
    pub count: u8,
    /// Also read each sensor's label and name.
    #[arg(long)]
    pub names: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// First parameter number.
    #[arg(long, default_value_t = 0)]
    pub start: u16,
    /// Number of parameters to read.
    #[arg(long, default_value_t = 16)]
    pub count: u8,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Open the controller named by `target`.
///
/// Requests are resent every `--timeout` and given up on after
/// `--resends` attempts, so a silent controller cannot hang a command.
pub fn open_device(target: &Target) -> CliResult<Device> {
    let timeout = parse_duration(&target.timeout)?;
    let config = ConnectionConfig {
        tracker: TrackerConfig {
            timeout,
            max_resends: Some(target.resends),
            ..TrackerConfig::default()
        },
        sweep_interval: timeout,
        ..ConnectionConfig::default()
    };

    let device = match (&target.address, &target.serial_port) {
        (Some(addr), _) => {
            debug!(%addr, "connecting over tcp");
            Device::connect_tcp(addr, TcpTransport::DEFAULT_CONNECT_TIMEOUT, config)
        }
        (None, Some(path)) => {
            debug!(%path, "opening serial port");
            Device::open_serial(path, config)
        }
        (None, None) => {
            return Err(CliError::new(
                USAGE,
                "no controller given: pass --address or --serial-port",
            ))
        }
    };
    device.map_err(|err| session_error("connect failed", err))
}

/// Wait for every request in order, stopping at the first failure.
pub fn wait_all<T>(context: &str, pending: Vec<PendingRequest<T>>) -> CliResult<Vec<T>> {
    pending
        .into_iter()
        .map(|request| request.wait().map_err(|err| session_error(context, err)))
        .collect()
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}
