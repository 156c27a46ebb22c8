//! Dome Control Example
//!
//! Demonstrates the core driver operations:
//! - Listing and selecting serial ports
//! - Connecting to the drive and reading its identity
//! - Synchronizing the reported azimuth
//! - A goto with the usual completion polling loop
//!
//! Usage:
//!   cargo run --example dome_control                  # Interactive mode
//!   cargo run --example dome_control -- /dev/ttyUSB0  # Specify port
//!   cargo run --example dome_control -- COM3
//!
//! Set RUST_LOG environment variable to control logging:
//!   RUST_LOG=debug cargo run --example dome_control
//!   RUST_LOG=trace cargo run --example dome_control   # Wire-level frames

use std::time::Duration;

use inquire::Select;
use log::info;

use amc_dome::{AmcDome, DriveConfig, Result, SerialTransport};

/// Prompt for a serial port when none was given on the command line
fn select_port() -> Result<String> {
    let ports = SerialTransport::list_ports()?;

    if ports.is_empty() {
        eprintln!("No serial ports available");
        std::process::exit(1);
    }

    let choices: Vec<String> = ports
        .iter()
        .map(|p| format!("{} - {:?}", p.port_name, p.port_type))
        .collect();

    let choice = Select::new("Serial port for the dome drive:", choices)
        .prompt()
        .map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::Other, format!("No port chosen: {}", e))
        })?;

    // keep the port name, drop the " - <type>" description
    let port = choice.split(" - ").next().unwrap().to_string();
    Ok(port)
}

fn main() -> Result<()> {
    // Initialize logger with default info level if RUST_LOG is not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Get port name from command line argument or interactive selection
    let port = std::env::args()
        .nth(1)
        .map(Ok)
        .unwrap_or_else(select_port)?;

    let config = DriveConfig {
        port,
        ..DriveConfig::default()
    };

    info!("Connecting to dome drive on {}...", config.port);
    let mut dome = AmcDome::open(config)?;

    info!("Controller: {}", dome.product_info());
    info!("Firmware:   {}", dome.firmware_version());
    let azimuth = dome.current_azimuth()?;
    info!("Azimuth:    {:.2}", azimuth);

    // Tell the drive where the dome actually points before moving it
    dome.sync_dome(azimuth)?;

    info!("=== Goto 180 degrees ===");
    dome.goto_azimuth(180.0)?;
    while !dome.is_goto_complete()? {
        info!("  ...at {:.2}", dome.current_azimuth()?);
        std::thread::sleep(Duration::from_millis(500));
    }
    info!("Goto complete, azimuth {:.2}", dome.current_azimuth()?);

    dome.disconnect();
    Ok(())
}
