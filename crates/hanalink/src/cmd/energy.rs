use hanalink_session::EnergyReading;

use crate::cmd::{open_device, Target};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_json, reading, table, OutputFormat};

pub fn run(target: &Target, format: OutputFormat) -> CliResult<i32> {
    let device = open_device(target)?;
    let energy = device
        .read_energy()
        .and_then(|pending| pending.wait())
        .map_err(|err| session_error("read energy", err))?;

    print_energy(&energy, format);
    device.close();
    Ok(SUCCESS)
}

fn print_energy(energy: &EnergyReading, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(energy),
        OutputFormat::Table => {
            let mut t = table(&["TOTAL", "CURRENT", "IMPULSE"]);
            t.add_row(vec![
                reading(energy.total),
                reading(energy.current),
                reading(energy.impulse),
            ]);
            println!("{t}");
        }
        OutputFormat::Pretty => {
            println!(
                "total={} current={} impulse={}",
                reading(energy.total),
                reading(energy.current),
                reading(energy.impulse)
            );
        }
    }
}
