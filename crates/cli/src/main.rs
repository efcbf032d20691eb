//! mcdaq
//!
//! Lists Measurement Computing USB DAQ devices, shows their attributes and
//! blinks their LEDs to identify them on the bench. USB-TEMP units can also
//! be queried for status and temperatures.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cli::config::{self, DaqConfig};
use cli::output::{self, ListEntry, StatusReport, TemperatureReading};
use common::{format_usb_id, parse_usb_id, setup_logging};
use daq::usb_temp::{self, CalibrationPoll, Units};
use daq::{Locator, RusbBus, UsbTemp};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "mcdaq")]
#[command(author, version, about = "Locate and identify Measurement Computing USB DAQ devices")]
#[command(long_about = "
Locate Measurement Computing USB data-acquisition devices by serial number,
read their descriptor strings and blink their LEDs.

EXAMPLES:
    # List attached DAQ devices
    mcdaq list

    # Show every attribute of one device as JSON
    mcdaq info 01A2B3C4 --json

    # Blink the LED of a device three times
    mcdaq blink 01A2B3C4 --count 3

    # Read every thermocouple of a USB-TEMP
    mcdaq temp 01A2B3C4

    # Read channel 2 only, in raw converter counts
    mcdaq temp 01A2B3C4 --channel 2 --raw

    # Check for burnt-out thermocouples
    mcdaq status 01A2B3C4

    # Scan for a different vendor ID
    mcdaq --vendor-id 0x1234 list

CONFIGURATION:
    mcdaq looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/mcdaq/mcdaq.toml
    3. /etc/mcdaq/mcdaq.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Vendor ID to scan for, in hex
    #[arg(long, value_name = "VID", value_parser = parse_usb_id)]
    vendor_id: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List attached devices (default)
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show the attributes of one device
    Info {
        /// Serial number of the device
        serial: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Blink the LED of one device
    Blink {
        /// Serial number of the device
        serial: String,

        /// Number of blinks, if the model supports it
        #[arg(short = 'n', long, value_name = "N")]
        count: Option<u8>,
    },
    /// Show the status and thermocouple burnout bits of a USB-TEMP
    Status {
        /// Serial number of the device
        serial: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Read USB-TEMP temperature channels
    Temp {
        /// Serial number of the device
        serial: String,

        /// Read one channel instead of all eight
        #[arg(
            short,
            long,
            value_name = "CH",
            value_parser = clap::value_parser!(u8).range(0..=i64::from(usb_temp::MAX_CHANNEL))
        )]
        channel: Option<u8>,

        /// Report raw converter counts instead of degrees Celsius
        #[arg(long)]
        raw: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Calibrate a USB-TEMP and wait for it to finish
    Calibrate {
        /// Serial number of the device
        serial: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = DaqConfig::default();
        let path = DaqConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        config::load_config(path).context("Failed to load configuration")?
    } else {
        DaqConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.general.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("mcdaq v{}", env!("CARGO_PKG_VERSION"));
    debug!("Log level: {}", log_level);

    let bus = RusbBus::new().context("Failed to initialize USB")?;
    let locator = Locator::new(bus).with_timeouts(config.timeouts);

    let vendor_id = args.vendor_id.unwrap_or(config.general.vendor_id);
    let mut stdout = io::stdout().lock();

    match args.command.unwrap_or(Command::List { json: false }) {
        Command::List { json } => list_devices(&mut stdout, &locator, vendor_id, json),
        Command::Info { serial, json } => show_info(&mut stdout, &locator, &serial, json),
        Command::Blink { serial, count } => {
            blink_device(&mut stdout, &locator, &config, &serial, count)
        }
        Command::Status { serial, json } => show_status(&mut stdout, &locator, &serial, json),
        Command::Temp {
            serial,
            channel,
            raw,
            json,
        } => read_temperatures(&mut stdout, &locator, &serial, channel, raw, json),
        Command::Calibrate { serial } => calibrate(&mut stdout, &locator, &serial),
    }
}

fn list_devices<W: Write>(
    out: &mut W,
    locator: &Locator<RusbBus>,
    vendor_id: u16,
    json: bool,
) -> Result<()> {
    let scan = locator
        .scan(vendor_id)
        .with_context(|| format!("Failed to scan for vendor 0x{}", format_usb_id(vendor_id)))?;

    let entries: Vec<ListEntry> = scan
        .handles
        .iter()
        .map(|handle| match handle.info() {
            Ok(info) => ListEntry::Device(info),
            Err(e) => {
                warn!("{} became unavailable: {}", handle, e);
                ListEntry::Unavailable {
                    serial_number: handle.serial().to_string(),
                    error: e.to_string(),
                }
            }
        })
        .collect();

    if json {
        output::write_json(out, &entries)?;
    } else {
        output::write_device_list(out, &entries, &scan.skipped)?;
    }
    Ok(())
}

fn show_info<W: Write>(
    out: &mut W,
    locator: &Locator<RusbBus>,
    serial: &str,
    json: bool,
) -> Result<()> {
    let info = locator
        .handle(serial)
        .info()
        .with_context(|| format!("Failed to read device {}", serial))?;

    if json {
        output::write_json(out, &info)?;
    } else {
        output::write_device_info(out, &info)?;
    }
    Ok(())
}

fn blink_device<W: Write>(
    out: &mut W,
    locator: &Locator<RusbBus>,
    config: &DaqConfig,
    serial: &str,
    count: Option<u8>,
) -> Result<()> {
    let handle = locator.handle(serial);
    let product_id = handle
        .product_id()
        .with_context(|| format!("Failed to resolve device {}", serial))?;

    let (profile, model) = config.profile_for(product_id);
    match model {
        Some(name) => debug!("Using {} blink profile: {:?}", name, profile),
        None => debug!(
            "No profile for product 0x{}, using default: {:?}",
            format_usb_id(product_id),
            profile
        ),
    }

    handle
        .blink(&profile, count)
        .with_context(|| format!("Failed to blink device {}", serial))?;

    writeln!(out, "Blinked LED on {}", serial)?;
    Ok(())
}

fn show_status<W: Write>(
    out: &mut W,
    locator: &Locator<RusbBus>,
    serial: &str,
    json: bool,
) -> Result<()> {
    let temp = UsbTemp::new(locator.handle(serial));
    let status = temp
        .status()
        .with_context(|| format!("Failed to read status of {}", serial))?;
    let burnout_mask = temp
        .burnout_status(0xff)
        .with_context(|| format!("Failed to read burnout status of {}", serial))?;

    let report = StatusReport {
        serial_number: serial.to_string(),
        status,
        busy: status != 0,
        burnout_mask,
    };
    if json {
        output::write_json(out, &report)?;
    } else {
        output::write_status(out, &report)?;
    }
    Ok(())
}

fn read_temperatures<W: Write>(
    out: &mut W,
    locator: &Locator<RusbBus>,
    serial: &str,
    channel: Option<u8>,
    raw: bool,
    json: bool,
) -> Result<()> {
    let temp = UsbTemp::new(locator.handle(serial));
    let units = if raw { Units::Raw } else { Units::Celsius };

    let readings: Vec<TemperatureReading> = match channel {
        Some(channel) => {
            let value = temp
                .read_temperature(channel, units)
                .with_context(|| format!("Failed to read channel {} of {}", channel, serial))?;
            vec![TemperatureReading { channel, value }]
        }
        None => temp
            .scan_temperatures(0, usb_temp::MAX_CHANNEL, units)
            .with_context(|| format!("Failed to scan temperatures of {}", serial))?
            .into_iter()
            .zip(0..)
            .map(|(value, channel)| TemperatureReading { channel, value })
            .collect(),
    };

    if json {
        output::write_json(out, &readings)?;
    } else {
        output::write_temperatures(out, &readings, raw)?;
    }
    Ok(())
}

fn calibrate<W: Write>(out: &mut W, locator: &Locator<RusbBus>, serial: &str) -> Result<()> {
    UsbTemp::new(locator.handle(serial))
        .calibrate(CalibrationPoll::default())
        .with_context(|| format!("Failed to calibrate {}", serial))?;

    writeln!(out, "Calibrated {}", serial)?;
    Ok(())
}
