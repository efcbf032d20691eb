//! Text and JSON rendering of device listings and USB-TEMP readings

use common::format_usb_id;
use daq::{DaqInfo, DeviceSpeed, SkippedDevice};
use serde::Serialize;
use std::io::{self, Write};

/// One row of `mcdaq list`
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ListEntry {
    Device(DaqInfo),
    /// Serial number known but the device vanished or failed before its
    /// attributes could be read
    Unavailable { serial_number: String, error: String },
}

/// One temperature channel of `mcdaq temp`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TemperatureReading {
    pub channel: u8,
    pub value: f32,
}

/// Result of `mcdaq status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub serial_number: String,
    pub status: u8,
    pub busy: bool,
    /// Channels with a burnt-out or missing thermocouple, one bit each
    pub burnout_mask: u8,
}

fn speed_label(speed: DeviceSpeed) -> &'static str {
    match speed {
        DeviceSpeed::Low => "low",
        DeviceSpeed::Full => "full",
        DeviceSpeed::High => "high",
        DeviceSpeed::Super => "super",
        DeviceSpeed::SuperPlus => "super+",
        DeviceSpeed::Unknown => "unknown",
    }
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

/// Write the device table, one line per device
pub fn write_device_list<W: Write>(
    out: &mut W,
    entries: &[ListEntry],
    skipped: &[SkippedDevice],
) -> io::Result<()> {
    if entries.is_empty() && skipped.is_empty() {
        writeln!(out, "No DAQ devices found")?;
        return Ok(());
    }

    writeln!(
        out,
        "{:<16} {:<9} {:<7} {:<24} {}",
        "SERIAL", "ID", "BUS:ADR", "PRODUCT", "MANUFACTURER"
    )?;
    for entry in entries {
        match entry {
            ListEntry::Device(info) => writeln!(
                out,
                "{:<16} {}:{} {:03}:{:03} {:<24} {}",
                info.serial_number,
                format_usb_id(info.vendor_id),
                format_usb_id(info.product_id),
                info.bus_number,
                info.device_address,
                or_dash(&info.product),
                or_dash(&info.manufacturer),
            )?,
            ListEntry::Unavailable {
                serial_number,
                error,
            } => writeln!(out, "{:<16} unavailable: {}", serial_number, error)?,
        }
    }

    for device in skipped {
        writeln!(
            out,
            "(skipped {:03}:{:03} product {}: {})",
            device.bus_number,
            device.address,
            format_usb_id(device.product_id),
            device.error
        )?;
    }
    Ok(())
}

/// Write every attribute of one device
pub fn write_device_info<W: Write>(out: &mut W, info: &DaqInfo) -> io::Result<()> {
    writeln!(out, "Serial number: {}", info.serial_number)?;
    writeln!(out, "Vendor ID:     0x{}", format_usb_id(info.vendor_id))?;
    writeln!(out, "Product ID:    0x{}", format_usb_id(info.product_id))?;
    writeln!(out, "Manufacturer:  {}", or_dash(&info.manufacturer))?;
    writeln!(out, "Product:       {}", or_dash(&info.product))?;
    writeln!(
        out,
        "Location:      bus {:03} address {:03}",
        info.bus_number, info.device_address
    )?;
    writeln!(out, "Speed:         {}", speed_label(info.speed))?;
    Ok(())
}

/// Write one line per channel
pub fn write_temperatures<W: Write>(
    out: &mut W,
    readings: &[TemperatureReading],
    raw: bool,
) -> io::Result<()> {
    let unit = if raw { "" } else { " C" };
    for reading in readings {
        writeln!(out, "CH{}: {:.3}{}", reading.channel, reading.value, unit)?;
    }
    Ok(())
}

/// Write the status block
pub fn write_status<W: Write>(out: &mut W, report: &StatusReport) -> io::Result<()> {
    writeln!(out, "Serial number: {}", report.serial_number)?;
    writeln!(
        out,
        "Status:        {} (0x{:02x})",
        if report.busy { "busy" } else { "idle" },
        report.status
    )?;

    let burnt: Vec<String> = (0..8)
        .filter(|ch| report.burnout_mask & (1 << ch) != 0)
        .map(|ch| format!("CH{}", ch))
        .collect();
    if burnt.is_empty() {
        writeln!(out, "Burnout:       none")?;
    } else {
        writeln!(out, "Burnout:       {}", burnt.join(" "))?;
    }
    Ok(())
}

/// Write `value` as pretty-printed JSON followed by a newline
pub fn write_json<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)
}
