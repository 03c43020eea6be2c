mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::{Command, Target};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "hanalink",
    version,
    about = "Read Hanazeder FP controllers over RS-232 or TCP"
)]
struct Cli {
    #[command(flatten)]
    target: Target,

    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, &cli.target, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sensors_subcommand() {
        let cli = Cli::try_parse_from([
            "hanalink",
            "--address",
            "10.0.0.5:8899",
            "sensors",
            "--count",
            "4",
            "--names",
        ])
        .expect("sensors args should parse");

        assert_eq!(cli.target.address.as_deref(), Some("10.0.0.5:8899"));
        match cli.command {
            Command::Sensors(args) => {
                assert_eq!(args.count, 4);
                assert!(args.names);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from([
            "hanalink",
            "info",
            "--serial-port",
            "/dev/ttyUSB0",
            "--timeout",
            "500ms",
        ])
        .expect("info args should parse");
        assert!(matches!(cli.command, Command::Info));
        assert_eq!(cli.target.serial_port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(cli.target.timeout, "500ms");
    }

    #[test]
    fn rejects_address_with_serial_port() {
        let err = Cli::try_parse_from([
            "hanalink",
            "--address",
            "10.0.0.5:8899",
            "--serial-port",
            "/dev/ttyUSB0",
            "energy",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_config_range() {
        let cli = Cli::try_parse_from(["hanalink", "config", "--start", "300", "--count", "8"])
            .expect("config args should parse");
        match cli.command {
            Command::Config(args) => {
                assert_eq!(args.start, 300);
                assert_eq!(args.count, 8);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
