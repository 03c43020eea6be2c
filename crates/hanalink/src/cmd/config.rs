use hanalink_session::ConfigEntry;

use crate::cmd::{open_device, ConfigArgs, Target};
use crate::exit::{session_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_json, table, OutputFormat};

pub fn run(args: ConfigArgs, target: &Target, format: OutputFormat) -> CliResult<i32> {
    if args.count == 0 {
        return Err(CliError::new(USAGE, "--count must be at least 1"));
    }
    let device = open_device(target)?;
    let entries = device
        .read_config_block(args.start, args.count)
        .and_then(|pending| pending.wait())
        .map_err(|err| session_error("read config block", err))?;

    print_entries(&entries, format);
    device.close();
    Ok(SUCCESS)
}

fn print_entries(entries: &[ConfigEntry], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&entries),
        OutputFormat::Table => {
            let mut t = table(&["KEY", "VALUE", "MIN", "MAX", "STEP"]);
            for entry in entries {
                t.add_row(vec![
                    entry.key.to_string(),
                    entry.value.to_string(),
                    entry.min_value.to_string(),
                    entry.max_value.to_string(),
                    entry.change_step.to_string(),
                ]);
            }
            println!("{t}");
        }
        OutputFormat::Pretty => {
            for entry in entries {
                println!(
                    "{:>4} = {:<3} (range {}..={}, step {})",
                    entry.key, entry.value, entry.min_value, entry.max_value, entry.change_step
                );
            }
        }
    }
}
