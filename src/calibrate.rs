use anyhow::Result;
use clap::Parser;
use qibla_rs::calibration::HardIronCalibration;
use qibla_rs::compass_sensor::CompassSensor;
use qibla_rs::config::QiblaConfig;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "calibrate", about = "Magnetometer hard iron calibration")]
struct Args {
    /// Configuration file providing the sensor address
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many samples
    #[arg(short, long, default_value_t = 600)]
    samples: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => QiblaConfig::from_file(path)?,
        None => QiblaConfig::default(),
    };

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║     Magnetometer Calibration Tool                    ║");
    println!("╚══════════════════════════════════════════════════════╝\n");

    println!("Instructions:");
    println!("1. Keep the board LEVEL (horizontal)");
    println!("2. Slowly rotate the board through a FULL 360° circle");
    println!("3. Take at least 30 seconds to complete the rotation");
    println!("4. Try to rotate smoothly at constant speed\n");

    println!("Starting in 5 seconds...\n");
    thread::sleep(Duration::from_secs(5));

    let mut compass = CompassSensor::new(&config.compass)?;
    let mut calibration = HardIronCalibration::new();

    println!("Collecting {} samples... (ROTATE NOW!)", args.samples);
    println!(
        "\n{:^8} | {:^20} | {:^20} | {:^20}",
        "Sample", "X Range", "Y Range", "Calculated Offsets"
    );
    println!("{:-<8}-+-{:-<20}-+-{:-<20}-+-{:-<20}", "", "", "", "");

    while calibration.samples() < args.samples {
        if let Ok((x, y)) = compass.read_raw_magnetometer() {
            calibration.add_sample(x, y);

            if calibration.samples() % 10 == 0
                && let (Some((x_min, x_max)), Some((y_min, y_max)), Some(offsets)) = (
                    calibration.x_range(),
                    calibration.y_range(),
                    calibration.offsets(),
                )
            {
                println!(
                    "{:^8} | {:>7.0} to {:>7.0} | {:>7.0} to {:>7.0} | X: {:>7.0}  Y: {:>7.0}",
                    calibration.samples(),
                    x_min,
                    x_max,
                    y_min,
                    y_max,
                    offsets.x_offset,
                    offsets.y_offset
                );
            }
        }

        thread::sleep(Duration::from_millis(100));
    }

    let mut compass_config = config.compass.clone();
    calibration.apply_to(&mut compass_config);

    println!("\nAdd this to the \"compass\" section of your configuration:");
    println!("{}", serde_json::to_string_pretty(&compass_config)?);
    Ok(())
}
