use hanalink_session::{Device, SensorName};
use serde::Serialize;

use crate::cmd::{open_device, wait_all, SensorsArgs, Target};
use crate::exit::{session_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_json, reading, table, OutputFormat};

#[derive(Debug, Serialize, PartialEq)]
struct SensorOutput {
    index: u8,
    value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

pub fn run(args: SensorsArgs, target: &Target, format: OutputFormat) -> CliResult<i32> {
    let indices = sensor_range(args.start, args.count)?;
    let device = open_device(target)?;
    let sensors = read_sensors(&device, &indices, args.names)?;

    print_sensors(&sensors, format);
    device.close();
    Ok(SUCCESS)
}

fn sensor_range(start: u8, count: u8) -> CliResult<Vec<u8>> {
    if count == 0 {
        return Err(CliError::new(USAGE, "--count must be at least 1"));
    }
    let end = start.checked_add(count - 1).ok_or_else(|| {
        CliError::new(USAGE, format!("sensor range {start}+{count} exceeds 255"))
    })?;
    Ok((start..=end).collect())
}

/// Readings (and optionally names) for `indices`.
///
/// Requests are pipelined in batches that fit the tracker's in-flight
/// limit; each batch is sent in full before its first reply is awaited.
fn read_sensors(device: &Device, indices: &[u8], names: bool) -> CliResult<Vec<SensorOutput>> {
    let max_in_flight = device.connection().tracker().config().max_in_flight;
    let batch = sensors_per_batch(max_in_flight, names);

    let mut sensors = Vec::with_capacity(indices.len());
    for chunk in indices.chunks(batch) {
        sensors.extend(read_batch(device, chunk, names)?);
    }
    Ok(sensors)
}

/// Sensors per batch: each sensor costs one request, two with names.
fn sensors_per_batch(max_in_flight: usize, names: bool) -> usize {
    let per_sensor = if names { 2 } else { 1 };
    (max_in_flight / per_sensor).max(1)
}

fn read_batch(device: &Device, indices: &[u8], names: bool) -> CliResult<Vec<SensorOutput>> {
    let values = indices
        .iter()
        .map(|&index| device.read_sensor(index))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| session_error("read sensors", err))?;
    let name_requests = if names {
        indices
            .iter()
            .map(|&index| device.read_sensor_name(index))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| session_error("read sensor names", err))?
    } else {
        Vec::new()
    };

    let values = wait_all("read sensors", values)?;
    let mut names: Vec<Option<SensorName>> = wait_all("read sensor names", name_requests)?
        .into_iter()
        .map(Some)
        .collect();
    names.resize(values.len(), None);

    Ok(indices
        .iter()
        .zip(values)
        .zip(names)
        .map(|((&index, value), name)| SensorOutput {
            index,
            value,
            label: name.as_ref().and_then(|name| name.label),
            name: name.map(|name| name.name),
        })
        .collect())
}

fn print_sensors(sensors: &[SensorOutput], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&sensors),
        OutputFormat::Table => {
            let mut t = table(&["SENSOR", "VALUE", "LABEL", "NAME"]);
            for sensor in sensors {
                t.add_row(vec![
                    sensor.index.to_string(),
                    reading(sensor.value),
                    sensor.label.unwrap_or("").to_string(),
                    sensor.name.clone().unwrap_or_default(),
                ]);
            }
            println!("{t}");
        }
        OutputFormat::Pretty => {
            for sensor in sensors {
                let mut line = format!("sensor {:>2}: {:>6}", sensor.index, reading(sensor.value));
                if let Some(label) = sensor.label {
                    line.push_str(&format!("  {label}"));
                }
                if let Some(name) = sensor.name.as_deref().filter(|name| !name.is_empty()) {
                    line.push_str(&format!("  ({name})"));
                }
                println!("{line}");
            }
        }
    }
}
